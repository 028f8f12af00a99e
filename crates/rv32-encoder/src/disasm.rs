//! RV32I instruction disassembly.

use alloc::{format, string::String};

use crate::regs::Gpr;

fn gpr_name(num: u8) -> &'static str {
    Gpr::new(num & 0x1f).abi_name()
}

/// Disassemble a single RV32I instruction.
///
/// Returns a human-readable string like "add a0, a1, a2" or "jal ra, 16".
/// Unknown encodings render as "unknown 0x........".
pub fn disassemble_instruction(inst: u32) -> String {
    let opcode = inst & 0x7f;
    let rd = ((inst >> 7) & 0x1f) as u8;
    let funct3 = ((inst >> 12) & 0x7) as u8;
    let rs1 = ((inst >> 15) & 0x1f) as u8;
    let rs2 = ((inst >> 20) & 0x1f) as u8;
    let funct7 = ((inst >> 25) & 0x7f) as u8;

    let imm_i = {
        let imm_raw = (inst >> 20) & 0xfff;
        if (imm_raw & 0x800) != 0 {
            (imm_raw | 0xfffff000) as i32
        } else {
            imm_raw as i32
        }
    };
    let imm_u = (inst >> 12) & 0xfffff;
    let imm_s = {
        let imm_lo = (inst >> 7) & 0x1f;
        let imm_hi_raw = (inst >> 25) & 0x7f;
        let imm_hi = if (imm_hi_raw & 0x40) != 0 {
            (imm_hi_raw | 0xffffff80) as i32
        } else {
            imm_hi_raw as i32
        };
        (imm_hi << 5) | (imm_lo as i32)
    };
    let imm_b = {
        let imm = ((((inst >> 31) & 0x1) << 12)
            | (((inst >> 7) & 0x1) << 11)
            | (((inst >> 25) & 0x3f) << 5)
            | (((inst >> 8) & 0xf) << 1)) as i32;
        if (imm & 0x1000) != 0 {
            imm | -8192i32
        } else {
            imm
        }
    };
    let imm_j = {
        let imm = ((((inst >> 31) & 0x1) << 20)
            | (((inst >> 12) & 0xff) << 12)
            | (((inst >> 20) & 0x1) << 11)
            | (((inst >> 21) & 0x3ff) << 1)) as i32;
        if (imm & 0x100000) != 0 {
            imm | -2097152i32
        } else {
            imm
        }
    };

    match opcode {
        0x33 => {
            let name = match (funct3, funct7) {
                (0x0, 0x00) => "add",
                (0x0, 0x20) => "sub",
                (0x1, 0x00) => "sll",
                (0x2, 0x00) => "slt",
                (0x3, 0x00) => "sltu",
                (0x4, 0x00) => "xor",
                (0x5, 0x00) => "srl",
                (0x5, 0x20) => "sra",
                (0x6, 0x00) => "or",
                (0x7, 0x00) => "and",
                _ => return format!("unknown 0x{:08x}", inst),
            };
            format!("{} {}, {}, {}", name, gpr_name(rd), gpr_name(rs1), gpr_name(rs2))
        }
        0x13 => match funct3 {
            0x0 => format!("addi {}, {}, {}", gpr_name(rd), gpr_name(rs1), imm_i),
            0x2 => format!("slti {}, {}, {}", gpr_name(rd), gpr_name(rs1), imm_i),
            0x3 => format!("sltiu {}, {}, {}", gpr_name(rd), gpr_name(rs1), imm_i),
            0x4 => format!("xori {}, {}, {}", gpr_name(rd), gpr_name(rs1), imm_i),
            0x6 => format!("ori {}, {}, {}", gpr_name(rd), gpr_name(rs1), imm_i),
            0x7 => format!("andi {}, {}, {}", gpr_name(rd), gpr_name(rs1), imm_i),
            0x1 if funct7 == 0x00 => {
                format!("slli {}, {}, {}", gpr_name(rd), gpr_name(rs1), rs2)
            }
            0x5 if funct7 == 0x00 => {
                format!("srli {}, {}, {}", gpr_name(rd), gpr_name(rs1), rs2)
            }
            0x5 if funct7 == 0x20 => {
                format!("srai {}, {}, {}", gpr_name(rd), gpr_name(rs1), rs2)
            }
            _ => format!("unknown 0x{:08x}", inst),
        },
        0x03 => {
            let name = match funct3 {
                0x0 => "lb",
                0x1 => "lh",
                0x2 => "lw",
                0x4 => "lbu",
                0x5 => "lhu",
                _ => return format!("unknown 0x{:08x}", inst),
            };
            format!("{} {}, {}({})", name, gpr_name(rd), imm_i, gpr_name(rs1))
        }
        0x23 => {
            let name = match funct3 {
                0x0 => "sb",
                0x1 => "sh",
                0x2 => "sw",
                _ => return format!("unknown 0x{:08x}", inst),
            };
            format!("{} {}, {}({})", name, gpr_name(rs2), imm_s, gpr_name(rs1))
        }
        0x37 => format!("lui {}, 0x{:05x}", gpr_name(rd), imm_u),
        0x17 => format!("auipc {}, 0x{:05x}", gpr_name(rd), imm_u),
        0x6f => format!("jal {}, {}", gpr_name(rd), imm_j),
        0x67 => match funct3 {
            0x0 => format!("jalr {}, {}({})", gpr_name(rd), imm_i, gpr_name(rs1)),
            _ => format!("unknown 0x{:08x}", inst),
        },
        0x63 => {
            let name = match funct3 {
                0x0 => "beq",
                0x1 => "bne",
                0x4 => "blt",
                0x5 => "bge",
                0x6 => "bltu",
                0x7 => "bgeu",
                _ => return format!("unknown 0x{:08x}", inst),
            };
            format!("{} {}, {}, {}", name, gpr_name(rs1), gpr_name(rs2), imm_b)
        }
        0x0f => match funct3 {
            0x0 => String::from("fence"),
            _ => format!("unknown 0x{:08x}", inst),
        },
        0x73 => match inst {
            0x00000073 => String::from("ecall"),
            0x00100073 => String::from("ebreak"),
            _ => format!("unknown 0x{:08x}", inst),
        },
        _ => format!("unknown 0x{:08x}", inst),
    }
}
