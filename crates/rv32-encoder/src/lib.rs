//! RISC-V RV32I instruction encoder.
//!
//! This crate provides functions to encode RV32I base-ISA instructions
//! into their 32-bit binary representation, a disassembler for the same
//! set, and the [`Gpr`] register-name type shared with the emulator.

#![no_std]

extern crate alloc;

mod disasm;
mod encode;
mod regs;

pub use disasm::disassemble_instruction;
pub use encode::*;
pub use regs::Gpr;
