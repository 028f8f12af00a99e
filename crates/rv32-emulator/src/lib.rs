//! Baremetal RISC-V RV32I instruction-set simulator.
//!
//! An ELF image is staged into a sparse, region-based physical address
//! space through the ordinary write path; a single hart executes one
//! instruction at a time; MMIO devices are driven by the same load/store
//! path as RAM. There is no supervisor mode and no paging - the only
//! architectural events are the ECALL/EBREAK traps and the illegal
//! instruction and misalignment exceptions, all surfaced to the driver.

#![no_std]

extern crate alloc;

mod decoder;
mod emulator;
mod endian;
mod error;
mod exec;
mod logging;
mod memory;
mod regfile;

pub use decoder::{Decoder, Instruction};
pub use emulator::{Core, StepResult, SyscallInfo};
pub use endian::Endianness;
pub use error::{
    AccessKind, DecoderError, EmulatorError, ExecError, Exception, MemoryError, RegionError,
    RegisterError, RegisterFileError, StepError, Trap,
};
pub use exec::{ExecOutcome, ExecUnit, Rv32iUnit};
pub use logging::{InstLog, LogLevel};
pub use memory::{Address, Memory, MmioDevice, MmioRegion, NormalRegion, Region};
pub use regfile::{IntRegFile, RegWidth, RegisterFile};
