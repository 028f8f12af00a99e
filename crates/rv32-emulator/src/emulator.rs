//! The core: fetch, decode, dispatch, retire.

extern crate alloc;

use alloc::{boxed::Box, format, string::String, vec::Vec};

use log::{debug, trace};
use rv32_encoder::{disassemble_instruction, Gpr};

use crate::decoder::{Decoder, Instruction};
use crate::endian::Endianness;
use crate::error::{AccessKind, EmulatorError, ExecError, Exception, StepError, Trap};
use crate::exec::{ExecOutcome, ExecUnit, Rv32iUnit};
use crate::logging::{InstLog, LogLevel};
use crate::memory::Memory;
use crate::regfile::{IntRegFile, RegWidth};

/// Trace ring capacity; the oldest entry is dropped beyond this.
const LOG_CAPACITY: usize = 100;

/// Default instruction limit for a run.
const DEFAULT_MAX_INSTRUCTIONS: u64 = 100_000;

/// Result of a single successful step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The instruction retired; the PC points at the next one.
    Retired,
    /// The instruction trapped; the PC still points at it.
    Trap(Trap),
}

/// Syscall arguments captured at an ECALL, following the RISC-V calling
/// convention (number in a7, arguments in a0-a6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallInfo {
    pub number: u32,
    pub args: [u32; 7],
}

/// A single hart: memory, registers, decoder and an ordered list of
/// execution units.
pub struct Core {
    memory: Memory,
    regs: IntRegFile,
    decoder: Decoder,
    units: Vec<Box<dyn ExecUnit>>,
    retired: u64,
    max_instructions: u64,
    log_level: LogLevel,
    log_buffer: Vec<InstLog>,
}

impl Core {
    /// Assemble a core from parts. Execution units are attached with
    /// [`Core::with_unit`] in dispatch order.
    pub fn new(memory: Memory, regs: IntRegFile, decoder: Decoder) -> Self {
        Self {
            memory,
            regs,
            decoder,
            units: Vec::new(),
            retired: 0,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            log_level: LogLevel::None,
            log_buffer: Vec::new(),
        }
    }

    /// A little-endian RV32I hart over `memory`: 32 integer registers
    /// plus a PC slot, and the base-ISA execution unit.
    pub fn rv32i(memory: Memory) -> Self {
        Self::new(
            memory,
            IntRegFile::new(RegWidth::W32, 33, Endianness::Little),
            Decoder::new(Endianness::Little),
        )
        .with_unit(Box::new(Rv32iUnit::new(Endianness::Little)))
    }

    /// Append an execution unit to the dispatch order.
    pub fn with_unit(mut self, unit: Box<dyn ExecUnit>) -> Self {
        self.units.push(unit);
        self
    }

    /// Set the maximum number of instructions a run may retire.
    pub fn with_max_instructions(mut self, limit: u64) -> Self {
        self.max_instructions = limit;
        self
    }

    /// Set the trace-recording level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Fetch, decode and execute one instruction.
    ///
    /// Exactly one unit must claim the instruction: none is an illegal
    /// instruction, more than one is a configuration fault. Traps are a
    /// successful outcome and leave the PC on the trapping instruction.
    pub fn step(&mut self) -> Result<StepResult, StepError> {
        let pc = self.regs.pc_value()?;
        if self.retired >= self.max_instructions {
            return Err(EmulatorError::InstructionLimitExceeded {
                limit: self.max_instructions,
                executed: self.retired,
                pc,
            }
            .into());
        }
        if pc % 4 != 0 {
            return Err(Exception::MemMisaligned {
                pc,
                addr: pc,
                size: 4,
                kind: AccessKind::Fetch,
            }
            .into());
        }

        let bytes = self.memory.read(pc, 4)?;
        let inst = self.decoder.decode(pc, &bytes)?;

        // Offer the instruction to every unit, even after an acceptance,
        // so a double claim is caught instead of masked.
        let mut accepted = 0u32;
        let mut outcome = ExecOutcome::NotClaimed;
        for unit in &mut self.units {
            match unit.execute(&inst, &mut self.regs, &mut self.memory)? {
                ExecOutcome::NotClaimed => {}
                claimed => {
                    accepted += 1;
                    outcome = claimed;
                }
            }
        }
        if accepted > 1 {
            return Err(EmulatorError::Exec(ExecError::DuplicatedUnit { pc }).into());
        }

        match outcome {
            ExecOutcome::NotClaimed => Err(Exception::IllegalInst {
                pc,
                raw: inst.raw,
                reason: String::from("no execution unit claims this opcode"),
            }
            .into()),
            ExecOutcome::Retired => {
                self.retired += 1;
                if self.log_level >= LogLevel::Instructions {
                    let next_pc = self.regs.pc_value()?;
                    self.record(&inst, next_pc);
                }
                Ok(StepResult::Retired)
            }
            ExecOutcome::Trap(trap) => {
                self.retired += 1;
                debug!("trap: {}", trap);
                if self.log_level >= LogLevel::Traps {
                    self.record(&inst, pc);
                }
                Ok(StepResult::Trap(trap))
            }
        }
    }

    /// Step until a trap escapes.
    pub fn run(&mut self) -> Result<Trap, StepError> {
        loop {
            if let StepResult::Trap(trap) = self.step()? {
                return Ok(trap);
            }
        }
    }

    /// Run until EBREAK, returning the value in a0. Hitting an ECALL
    /// instead is a driver error.
    pub fn run_until_ebreak(&mut self) -> Result<u32, StepError> {
        match self.run()? {
            Trap::Ebreak(_) => Ok(self.register_value(Gpr::A0)?),
            trap => Err(EmulatorError::UnexpectedTrap {
                expected: "ebreak",
                trap,
            }
            .into()),
        }
    }

    /// Run until ECALL, returning the captured syscall registers.
    /// Hitting an EBREAK instead is a driver error.
    pub fn run_until_ecall(&mut self) -> Result<SyscallInfo, StepError> {
        match self.run()? {
            Trap::Ecall(_) => {
                let mut args = [0u32; 7];
                for (i, arg) in args.iter_mut().enumerate() {
                    *arg = self.register_value(Gpr::new(Gpr::A0.num() + i as u8))?;
                }
                Ok(SyscallInfo {
                    number: self.register_value(Gpr::A7)?,
                    args,
                })
            }
            trap => Err(EmulatorError::UnexpectedTrap {
                expected: "ecall",
                trap,
            }
            .into()),
        }
    }

    /// Read a general-purpose register; x0 always reads as zero.
    pub fn register_value(&self, reg: Gpr) -> Result<u32, EmulatorError> {
        if reg.num() == 0 {
            return Ok(0);
        }
        Ok(self.regs.read_value(reg.num() as usize, false)? as u32)
    }

    /// Write a general-purpose register. Writing x0 is a no-op.
    pub fn set_register_value(&mut self, reg: Gpr, value: u32) -> Result<(), EmulatorError> {
        if reg.num() != 0 {
            self.regs.write_value(reg.num() as usize, value as u64, false)?;
        }
        Ok(())
    }

    pub fn pc_value(&self) -> Result<u64, EmulatorError> {
        self.regs.pc_value()
    }

    pub fn set_pc_value(&mut self, pc: u64) -> Result<(), EmulatorError> {
        self.regs.set_pc_value(pc)
    }

    /// Number of instructions retired so far (traps included).
    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn regs(&self) -> &IntRegFile {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut IntRegFile {
        &mut self.regs
    }

    /// Captured trace entries, oldest first.
    pub fn logs(&self) -> &[InstLog] {
        &self.log_buffer
    }

    /// Render the trace buffer, one entry per line.
    pub fn format_logs(&self) -> String {
        let mut result = String::new();
        for entry in &self.log_buffer {
            result.push_str(&format!("{}\n", entry));
        }
        result
    }

    pub fn clear_logs(&mut self) {
        self.log_buffer.clear();
    }

    /// Human-readable register dump for debugging.
    pub fn dump_state(&self) -> String {
        let mut result = String::new();
        result.push_str(&format!(
            "pc: 0x{:08x}  retired: {}\n",
            self.regs.pc_value().unwrap_or(0),
            self.retired
        ));
        for i in 0..32u8 {
            let reg = Gpr::new(i);
            let value = self.register_value(reg).unwrap_or(0);
            if value != 0 || i == 0 {
                result.push_str(&format!(
                    "  {:>4} (x{:<2}) = 0x{:08x} ({})\n",
                    reg.abi_name(),
                    i,
                    value,
                    value as i32
                ));
            }
        }
        result
    }

    fn record(&mut self, inst: &Instruction, next_pc: u64) {
        let entry = InstLog {
            cycle: self.retired,
            pc: inst.addr,
            raw: inst.raw,
            disasm: disassemble_instruction(inst.raw),
            next_pc,
        };
        trace!("{}", entry);
        // Rolling buffer: drop the oldest entry once full.
        if self.log_buffer.len() >= LOG_CAPACITY {
            self.log_buffer.remove(0);
        }
        self.log_buffer.push(entry);
    }
}
