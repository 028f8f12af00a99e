//! Error types for the RV32 emulator.
//!
//! Failures fall into two disjoint taxonomies that are never translated
//! into each other:
//!
//! - [`EmulatorError`] - faults in the simulator itself (bad geometry,
//!   out-of-range register indices, misconfigured execution units).
//!   Recoverable only by aborting the run.
//! - Architectural events produced by the executed program: [`Exception`]
//!   for faults the program caused ([`Exception::IllegalInst`],
//!   [`Exception::MemMisaligned`]), and [`Trap`] for transitions the
//!   program requested (ECALL, EBREAK). Traps are not errors at all; they
//!   surface as a [`StepResult`](crate::StepResult) variant.

extern crate alloc;

use alloc::string::String;

use thiserror::Error;

use crate::decoder::Instruction;
use crate::memory::Address;

/// Kind of memory access that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Fetch,
}

impl core::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
            AccessKind::Fetch => "fetch",
        };
        f.write_str(s)
    }
}

/// Region-level failures: bad geometry on insert, accesses outside a
/// region, unsupported resize/relocate/merge requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// Access not fully contained in the region.
    #[error("{size} byte access at 0x{addr:012x} outside region [0x{start:012x}, 0x{end:012x})")]
    OutOfRange {
        addr: Address,
        size: u64,
        start: Address,
        end: Address,
    },
    /// No region covers the requested range.
    #[error("no region covers {size} bytes at 0x{addr:012x}")]
    NotFound { addr: Address, size: u64 },
    /// Candidate region overlaps a region already in the memory.
    #[error("region [0x{start:012x}, 0x{end:012x}) overlaps existing region at 0x{other:012x}")]
    Overlap {
        start: Address,
        end: Address,
        other: Address,
    },
    /// Region start does not sit on the region-size granule.
    #[error("region start 0x{start:012x} not aligned to the 0x{granule:x} byte granule")]
    Misaligned { start: Address, granule: u64 },
    /// Region lies outside the memory span.
    #[error(
        "region [0x{start:012x}, 0x{end:012x}) outside memory [0x{mem_start:012x}, 0x{mem_end:012x})"
    )]
    OutOfBounds {
        start: Address,
        end: Address,
        mem_start: Address,
        mem_end: Address,
    },
    /// Resize on a fixed-size region, or an attempt to shrink.
    #[error("region at 0x{start:012x} cannot resize from {size} to {new_size} bytes")]
    NotResizable {
        start: Address,
        size: u64,
        new_size: u64,
    },
    /// Neither concrete region kind supports relocation.
    #[error("region at 0x{start:012x} cannot relocate")]
    NotRelocatable { start: Address },
    /// Merge requested on a region that does not support it.
    #[error("region at 0x{start:012x} cannot merge with region at 0x{other:012x}")]
    NotMergeable { start: Address, other: Address },
    /// Merge requested for regions that do not abut.
    #[error("regions at 0x{start:012x} and 0x{other:012x} are not adjacent")]
    NotAdjacent { start: Address, other: Address },
    /// An MMIO device replied with the wrong number of bytes.
    #[error("device '{name}' returned {got} bytes for a {want} byte read")]
    DeviceReply { name: String, got: u64, want: u64 },
}

/// Memory-level failures: invalid access shapes and unsatisfiable
/// write-allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("invalid access size {size} (must be 1, 2, 4 or 8)")]
    InvalidAccessSize { size: u64 },
    #[error("misaligned {size} byte {kind} at 0x{addr:012x}")]
    Misaligned {
        addr: Address,
        size: u64,
        kind: AccessKind,
    },
    #[error("payload of {got} bytes for a {size} byte write")]
    PayloadSize { size: u64, got: u64 },
    #[error("write to 0x{addr:012x} outside memory [0x{start:012x}, 0x{end:012x})")]
    OutOfBounds {
        addr: Address,
        start: Address,
        end: Address,
    },
    /// Write-allocation could not produce a region covering the target.
    #[error("write allocation blocked at 0x{addr:012x}")]
    AllocationBlocked { addr: Address },
    #[error("memory start 0x{start:012x} not a multiple of the region size 0x{granule:x}")]
    UnalignedStart { start: Address, granule: u64 },
    #[error("memory size 0x{size:x} not a positive multiple of the region size 0x{granule:x}")]
    InvalidSize { size: u64, granule: u64 },
    #[error("default region size 0x{granule:x} is not a power of two")]
    InvalidRegionSize { granule: u64 },
}

/// Register-file level failures (bad index).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterFileError {
    #[error("register index {index} out of range (file has {count} registers)")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Single-register failures (payload does not fit the slot).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("{got} byte value does not fit a {width} byte register")]
    ValueTooWide { got: usize, width: usize },
}

/// Decoder-level simulator faults. Architectural decode failures (bad
/// low bits) are [`Exception::IllegalInst`], not this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    #[error("fetch buffer holds {got} bytes, expected 4")]
    WrongBufferLength { got: usize },
}

/// Execution-dispatch faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// More than one unit claimed the same instruction. A configuration
    /// bug in the driver, not a property of the guest program.
    #[error("instruction at 0x{pc:012x} claimed by more than one execution unit")]
    DuplicatedUnit { pc: Address },
}

/// Faults in the simulator itself. Aborting the run is the only recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmulatorError {
    #[error("decoder: {0}")]
    Decoder(#[from] DecoderError),
    #[error("exec: {0}")]
    Exec(#[from] ExecError),
    #[error("memory: {0}")]
    Memory(#[from] MemoryError),
    #[error("region: {0}")]
    Region(#[from] RegionError),
    #[error("register file: {0}")]
    RegisterFile(#[from] RegisterFileError),
    #[error("register: {0}")]
    Register(#[from] RegisterError),
    #[error("instruction limit exceeded: {executed} executed (limit {limit}) at pc 0x{pc:08x}")]
    InstructionLimitExceeded {
        limit: u64,
        executed: u64,
        pc: Address,
    },
    /// A run helper hit the trap it was not waiting for. Driver misuse,
    /// like [`ExecError::DuplicatedUnit`].
    #[error("unexpected {trap} while running to {expected}")]
    UnexpectedTrap { expected: &'static str, trap: Trap },
}

/// Architectural exceptions raised by the executed program. A supervisor
/// could recover from these in principle; this core surfaces them to the
/// driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Exception {
    #[error("illegal instruction 0x{raw:08x} at pc 0x{pc:08x}: {reason}")]
    IllegalInst {
        pc: Address,
        raw: u32,
        reason: String,
    },
    #[error("misaligned {size} byte {kind} at 0x{addr:012x} (pc 0x{pc:08x})")]
    MemMisaligned {
        pc: Address,
        addr: Address,
        size: u64,
        kind: AccessKind,
    },
}

/// Program-requested transitions. Each carries the trapping instruction
/// so the driver can inspect it. The PC still points at that instruction:
/// the trap escapes execution before the PC write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    Ecall(Instruction),
    Ebreak(Instruction),
}

impl Trap {
    /// The instruction that requested the trap.
    pub fn instruction(&self) -> &Instruction {
        match self {
            Trap::Ecall(inst) | Trap::Ebreak(inst) => inst,
        }
    }
}

impl core::fmt::Display for Trap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Trap::Ecall(inst) => write!(f, "ecall at pc 0x{:08x}", inst.addr),
            Trap::Ebreak(inst) => write!(f, "ebreak at pc 0x{:08x}", inst.addr),
        }
    }
}

/// Everything that can abort a [`Core::step`](crate::Core::step): a
/// simulator fault or an architectural exception. Traps are a successful
/// outcome and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error(transparent)]
    Emulator(#[from] EmulatorError),
    #[error(transparent)]
    Exception(#[from] Exception),
}

impl From<MemoryError> for StepError {
    fn from(e: MemoryError) -> Self {
        StepError::Emulator(EmulatorError::Memory(e))
    }
}

impl From<RegionError> for StepError {
    fn from(e: RegionError) -> Self {
        StepError::Emulator(EmulatorError::Region(e))
    }
}

impl From<RegisterFileError> for StepError {
    fn from(e: RegisterFileError) -> Self {
        StepError::Emulator(EmulatorError::RegisterFile(e))
    }
}

impl From<RegisterError> for StepError {
    fn from(e: RegisterError) -> Self {
        StepError::Emulator(EmulatorError::Register(e))
    }
}
