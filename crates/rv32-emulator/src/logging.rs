//! Instruction trace logging.
//!
//! The core keeps a bounded ring of per-instruction records so a failing
//! run can be reconstructed after the fact without slowing the common
//! case down. Host-side diagnostics additionally go through the `log`
//! facade at trace/debug level.

extern crate alloc;

use alloc::string::String;

use crate::memory::Address;

/// How much the core records per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Record nothing.
    None,
    /// Record trap events only.
    Traps,
    /// Record every retired instruction.
    Instructions,
}

/// Trace record for one retired (or trapped) instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstLog {
    /// Retired-instruction count at the time of the record, starting at 1.
    pub cycle: u64,
    /// Address the instruction was fetched from.
    pub pc: Address,
    /// Raw encoding.
    pub raw: u32,
    /// Disassembly of the encoding.
    pub disasm: String,
    /// PC after the instruction (equal to `pc` for traps).
    pub next_pc: Address,
}

impl core::fmt::Display for InstLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:>6} 0x{:08x}: {:<24} -> 0x{:08x}",
            self.cycle, self.pc, self.disasm, self.next_pc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Instructions > LogLevel::Traps);
        assert!(LogLevel::Traps > LogLevel::None);
    }

    #[test]
    fn test_inst_log_display() {
        let entry = InstLog {
            cycle: 3,
            pc: 0x8,
            raw: 0x00500093,
            disasm: String::from("addi ra, zero, 5"),
            next_pc: 0xc,
        };
        let text = format!("{}", entry);
        assert!(text.contains("0x00000008"));
        assert!(text.contains("addi ra, zero, 5"));
    }
}
