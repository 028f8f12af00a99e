//! Execution units.
//!
//! A unit inspects an instruction's major opcode and either rejects it
//! (leaving all state untouched) or executes it: mutate registers and
//! memory, compute the next PC, write the PC back once, and report the
//! instruction retired. ECALL and EBREAK escape before the PC write, so
//! a trapped instruction leaves the PC pointing at itself.
//!
//! Keeping dispatch behind [`ExecUnit`] lets extensions (M, A, Zicsr,
//! ...) slot in as further units without touching the core loop.

extern crate alloc;

use alloc::string::String;

use crate::decoder::Instruction;
use crate::endian::Endianness;
use crate::error::{AccessKind, Exception, StepError, Trap};
use crate::memory::Memory;
use crate::regfile::IntRegFile;

/// Major opcodes (encoding bits [6:2]) of the base ISA.
mod opcode {
    pub const LOAD: u8 = 0b00000;
    pub const MISC_MEM: u8 = 0b00011;
    pub const OP_IMM: u8 = 0b00100;
    pub const AUIPC: u8 = 0b00101;
    pub const STORE: u8 = 0b01000;
    pub const OP: u8 = 0b01100;
    pub const LUI: u8 = 0b01101;
    pub const BRANCH: u8 = 0b11000;
    pub const JALR: u8 = 0b11001;
    pub const JAL: u8 = 0b11011;
    pub const SYSTEM: u8 = 0b11100;
}

/// Outcome of offering an instruction to an execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The unit does not handle this opcode; state is untouched.
    NotClaimed,
    /// The instruction executed and the PC was advanced.
    Retired,
    /// The instruction requested a trap; the PC was left unchanged.
    Trap(Trap),
}

/// One member of the core's ordered execution-unit list.
pub trait ExecUnit {
    fn execute(
        &mut self,
        inst: &Instruction,
        regs: &mut IntRegFile,
        memory: &mut Memory,
    ) -> Result<ExecOutcome, StepError>;
}

/// Read a source register; x0 always reads as zero.
fn read_reg(regs: &IntRegFile, index: u8) -> Result<u32, StepError> {
    if index == 0 {
        return Ok(0);
    }
    Ok(regs.read_value(index as usize, false)? as u32)
}

/// Write a destination register; x0 writes are architecturally discarded.
fn write_reg(regs: &mut IntRegFile, index: u8, value: u32) -> Result<(), StepError> {
    if index != 0 {
        regs.write_value(index as usize, value as u64, false)?;
    }
    Ok(())
}

fn illegal(inst: &Instruction, reason: &str) -> StepError {
    Exception::IllegalInst {
        pc: inst.addr,
        raw: inst.raw,
        reason: String::from(reason),
    }
    .into()
}

/// The RV32I base integer instruction set.
#[derive(Debug, Clone, Copy)]
pub struct Rv32iUnit {
    endianness: Endianness,
}

impl Rv32iUnit {
    /// `endianness` is the data byte order used for loads and stores.
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    fn op_imm(&self, inst: &Instruction, regs: &mut IntRegFile) -> Result<(), StepError> {
        let rs1 = read_reg(regs, inst.rs1)?;
        let imm = inst.imm_i;
        let shamt = inst.rs2 as u32;
        let value = match inst.funct3 {
            0b000 => rs1.wrapping_add(imm as u32),
            0b010 => ((rs1 as i32) < imm) as u32,
            0b011 => (rs1 < imm as u32) as u32,
            0b100 => rs1 ^ imm as u32,
            0b110 => rs1 | imm as u32,
            0b111 => rs1 & imm as u32,
            0b001 => {
                if inst.funct7 != 0 {
                    return Err(illegal(inst, "slli with nonzero upper immediate bits"));
                }
                rs1 << shamt
            }
            0b101 => match inst.funct7 {
                0b0000000 => rs1 >> shamt,
                0b0100000 => ((rs1 as i32) >> shamt) as u32,
                _ => return Err(illegal(inst, "invalid shift funct7")),
            },
            _ => unreachable!(),
        };
        write_reg(regs, inst.rd, value)
    }

    fn op(&self, inst: &Instruction, regs: &mut IntRegFile) -> Result<(), StepError> {
        let rs1 = read_reg(regs, inst.rs1)?;
        let rs2 = read_reg(regs, inst.rs2)?;
        let value = match (inst.funct3, inst.funct7) {
            (0b000, 0b0000000) => rs1.wrapping_add(rs2),
            (0b000, 0b0100000) => rs1.wrapping_sub(rs2),
            (0b001, 0b0000000) => rs1 << (rs2 & 0x1f),
            (0b010, 0b0000000) => ((rs1 as i32) < rs2 as i32) as u32,
            (0b011, 0b0000000) => (rs1 < rs2) as u32,
            (0b100, 0b0000000) => rs1 ^ rs2,
            (0b101, 0b0000000) => rs1 >> (rs2 & 0x1f),
            (0b101, 0b0100000) => ((rs1 as i32) >> (rs2 & 0x1f)) as u32,
            (0b110, 0b0000000) => rs1 | rs2,
            (0b111, 0b0000000) => rs1 & rs2,
            _ => return Err(illegal(inst, "invalid OP funct3/funct7 combination")),
        };
        write_reg(regs, inst.rd, value)
    }

    fn branch_taken(&self, inst: &Instruction, regs: &IntRegFile) -> Result<bool, StepError> {
        let rs1 = read_reg(regs, inst.rs1)?;
        let rs2 = read_reg(regs, inst.rs2)?;
        match inst.funct3 {
            0b000 => Ok(rs1 == rs2),
            0b001 => Ok(rs1 != rs2),
            0b100 => Ok((rs1 as i32) < rs2 as i32),
            0b101 => Ok((rs1 as i32) >= rs2 as i32),
            0b110 => Ok(rs1 < rs2),
            0b111 => Ok(rs1 >= rs2),
            _ => Err(illegal(inst, "invalid branch condition")),
        }
    }

    fn load(
        &self,
        inst: &Instruction,
        regs: &mut IntRegFile,
        memory: &mut Memory,
    ) -> Result<(), StepError> {
        let base = read_reg(regs, inst.rs1)?;
        let addr = base.wrapping_add(inst.imm_i as u32) as u64;
        // funct3 encodes log2(width) in its low bits and the sign flag in
        // bit 2; widths above 4 bytes do not exist in RV32I.
        let (size, signed) = match inst.funct3 {
            0b000 => (1, true),
            0b001 => (2, true),
            0b010 => (4, true),
            0b100 => (1, false),
            0b101 => (2, false),
            _ => return Err(illegal(inst, "invalid load width")),
        };
        if addr % size != 0 {
            return Err(Exception::MemMisaligned {
                pc: inst.addr,
                addr,
                size,
                kind: AccessKind::Read,
            }
            .into());
        }
        let bytes = memory.read(addr, size)?;
        let value = if signed {
            self.endianness.decode_i64(&bytes) as u32
        } else {
            self.endianness.decode_u64(&bytes) as u32
        };
        write_reg(regs, inst.rd, value)
    }

    fn store(
        &self,
        inst: &Instruction,
        regs: &mut IntRegFile,
        memory: &mut Memory,
    ) -> Result<(), StepError> {
        let base = read_reg(regs, inst.rs1)?;
        let value = read_reg(regs, inst.rs2)?;
        let addr = base.wrapping_add(inst.imm_s as u32) as u64;
        let size = match inst.funct3 {
            0b000 => 1,
            0b001 => 2,
            0b010 => 4,
            _ => return Err(illegal(inst, "invalid store width")),
        };
        if addr % size != 0 {
            return Err(Exception::MemMisaligned {
                pc: inst.addr,
                addr,
                size,
                kind: AccessKind::Write,
            }
            .into());
        }
        let mut buf = [0u8; 4];
        self.endianness
            .encode_u64(value as u64, &mut buf[..size as usize]);
        memory.write(addr, size, &buf[..size as usize])?;
        Ok(())
    }
}

impl ExecUnit for Rv32iUnit {
    fn execute(
        &mut self,
        inst: &Instruction,
        regs: &mut IntRegFile,
        memory: &mut Memory,
    ) -> Result<ExecOutcome, StepError> {
        let pc = regs.pc_value()? as u32;
        let mut next_pc: Option<u32> = None;

        match inst.base_opcode {
            opcode::LUI => write_reg(regs, inst.rd, inst.imm_u as u32)?,
            opcode::AUIPC => write_reg(regs, inst.rd, pc.wrapping_add(inst.imm_u as u32))?,
            opcode::OP_IMM => self.op_imm(inst, regs)?,
            opcode::OP => self.op(inst, regs)?,
            opcode::JAL => {
                write_reg(regs, inst.rd, pc.wrapping_add(4))?;
                next_pc = Some(pc.wrapping_add(inst.imm_j as u32));
            }
            opcode::JALR => {
                if inst.funct3 != 0 {
                    return Err(illegal(inst, "invalid jalr funct3"));
                }
                let base = read_reg(regs, inst.rs1)?;
                let target = base.wrapping_add(inst.imm_i as u32) & !1;
                write_reg(regs, inst.rd, pc.wrapping_add(4))?;
                next_pc = Some(target);
            }
            opcode::BRANCH => {
                if self.branch_taken(inst, regs)? {
                    next_pc = Some(pc.wrapping_add(inst.imm_b as u32));
                }
            }
            opcode::LOAD => self.load(inst, regs, memory)?,
            opcode::STORE => self.store(inst, regs, memory)?,
            opcode::MISC_MEM => {
                // FENCE orders nothing on a single sequential hart.
                if inst.funct3 != 0 {
                    return Err(illegal(inst, "invalid misc-mem funct3"));
                }
            }
            opcode::SYSTEM => {
                if inst.funct3 != 0 {
                    return Err(illegal(inst, "only ecall and ebreak are implemented"));
                }
                // The trap escapes before the PC write: the PC still
                // points at the trapping instruction.
                return match inst.imm_i {
                    0 => Ok(ExecOutcome::Trap(Trap::Ecall(*inst))),
                    1 => Ok(ExecOutcome::Trap(Trap::Ebreak(*inst))),
                    _ => Err(illegal(inst, "invalid system immediate")),
                };
            }
            _ => return Ok(ExecOutcome::NotClaimed),
        }

        regs.set_pc_value(next_pc.unwrap_or(pc.wrapping_add(4)) as u64)?;
        Ok(ExecOutcome::Retired)
    }
}
