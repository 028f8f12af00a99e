//! RV32I instruction decoder.
//!
//! Decoding is a pure function from a fetch address and four bytes to an
//! [`Instruction`] record: the same bytes always yield the same record.
//! Field and immediate layouts follow the standard I/S/B/U/J formats,
//! with every immediate sign-extended from bit 31 of the encoding.

extern crate alloc;

use alloc::string::String;

use crate::endian::Endianness;
use crate::error::{DecoderError, EmulatorError, Exception, StepError};
use crate::memory::Address;

/// A decoded instruction: the raw word plus every field any RV32I
/// execution unit needs. Which fields are meaningful depends on the
/// opcode; extraction is unconditional and cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Address the instruction was fetched from.
    pub addr: Address,
    /// Raw 32-bit encoding.
    pub raw: u32,
    /// Major opcode, bits [6:2] of the encoding.
    pub base_opcode: u8,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub funct3: u8,
    pub funct7: u8,
    /// I-type immediate, bits [31:20].
    pub imm_i: i32,
    /// S-type immediate, bits [31:25] and [11:7].
    pub imm_s: i32,
    /// B-type immediate, even byte offset for branches.
    pub imm_b: i32,
    /// U-type immediate, upper 20 bits with the low 12 clear.
    pub imm_u: i32,
    /// J-type immediate, even byte offset for JAL.
    pub imm_j: i32,
}

/// Stateless decoder configured with the instruction-stream byte order.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    endianness: Endianness,
}

impl Decoder {
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    /// Decode the 4 bytes fetched from `addr`.
    ///
    /// Only 32-bit encodings (low two bits `11`) are supported; anything
    /// else is an illegal instruction. A buffer that is not 4 bytes long
    /// is a simulator fault, not a guest fault.
    pub fn decode(&self, addr: Address, bytes: &[u8]) -> Result<Instruction, StepError> {
        let word: [u8; 4] = match bytes.try_into() {
            Ok(word) => word,
            Err(_) => {
                return Err(
                    EmulatorError::from(DecoderError::WrongBufferLength { got: bytes.len() })
                        .into(),
                )
            }
        };
        let raw = self.endianness.decode_u32(&word);

        if raw & 0x3 != 0x3 {
            return Err(Exception::IllegalInst {
                pc: addr,
                raw,
                reason: String::from("not a 32-bit encoding (low bits are not 0b11)"),
            }
            .into());
        }

        let imm_i = (raw as i32) >> 20;
        let imm_s = (((raw as i32) >> 25) << 5) | ((raw >> 7) & 0x1f) as i32;
        let imm_b = (((raw as i32) >> 31) << 12)
            | ((((raw >> 7) & 0x1) << 11) as i32)
            | ((((raw >> 25) & 0x3f) << 5) as i32)
            | ((((raw >> 8) & 0xf) << 1) as i32);
        let imm_u = (raw & 0xffff_f000) as i32;
        let imm_j = (((raw as i32) >> 31) << 20)
            | ((((raw >> 12) & 0xff) << 12) as i32)
            | ((((raw >> 20) & 0x1) << 11) as i32)
            | ((((raw >> 21) & 0x3ff) << 1) as i32);

        Ok(Instruction {
            addr,
            raw,
            base_opcode: ((raw >> 2) & 0x1f) as u8,
            rd: ((raw >> 7) & 0x1f) as u8,
            rs1: ((raw >> 15) & 0x1f) as u8,
            rs2: ((raw >> 20) & 0x1f) as u8,
            funct3: ((raw >> 12) & 0x7) as u8,
            funct7: ((raw >> 25) & 0x7f) as u8,
            imm_i,
            imm_s,
            imm_b,
            imm_u,
            imm_j,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv32_encoder::{addi, beq, jal, lui, sw, Gpr};

    fn decode(word: u32) -> Instruction {
        Decoder::new(Endianness::Little)
            .decode(0, &word.to_le_bytes())
            .unwrap()
    }

    #[test]
    fn test_rejects_non_32_bit_encoding() {
        let decoder = Decoder::new(Endianness::Little);
        // Low bits 00: a compressed or invalid encoding, not RV32I.
        let err = decoder.decode(0, &[0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            StepError::Exception(Exception::IllegalInst { pc: 0, raw: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_short_buffer() {
        let decoder = Decoder::new(Endianness::Little);
        let err = decoder.decode(0, &[0x13, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            StepError::Emulator(crate::error::EmulatorError::Decoder(
                DecoderError::WrongBufferLength { got: 2 }
            ))
        ));
    }

    #[test]
    fn test_field_extraction() {
        // addi x1, x0, 5 == 0x00500093
        let inst = decode(0x00500093);
        assert_eq!(inst.raw, 0x00500093);
        assert_eq!(inst.base_opcode, 0b00100);
        assert_eq!(inst.rd, 1);
        assert_eq!(inst.rs1, 0);
        assert_eq!(inst.funct3, 0);
        assert_eq!(inst.imm_i, 5);
    }

    #[test]
    fn test_i_immediate_sign_extension() {
        let inst = decode(addi(Gpr::A0, Gpr::A0, -1));
        assert_eq!(inst.imm_i, -1);
        let inst = decode(addi(Gpr::A0, Gpr::A0, -2048));
        assert_eq!(inst.imm_i, -2048);
        let inst = decode(addi(Gpr::A0, Gpr::A0, 2047));
        assert_eq!(inst.imm_i, 2047);
    }

    #[test]
    fn test_s_immediate() {
        let inst = decode(sw(Gpr::SP, Gpr::A0, 12));
        assert_eq!(inst.imm_s, 12);
        let inst = decode(sw(Gpr::SP, Gpr::A0, -12));
        assert_eq!(inst.imm_s, -12);
    }

    #[test]
    fn test_b_immediate() {
        let inst = decode(beq(Gpr::A0, Gpr::A1, 8));
        assert_eq!(inst.imm_b, 8);
        let inst = decode(beq(Gpr::A0, Gpr::A1, -16));
        assert_eq!(inst.imm_b, -16);
        // Maximum positive branch displacement.
        let inst = decode(beq(Gpr::A0, Gpr::A1, 4094));
        assert_eq!(inst.imm_b, 4094);
    }

    #[test]
    fn test_u_immediate() {
        let inst = decode(lui(Gpr::A0, 0x12345));
        assert_eq!(inst.imm_u, 0x12345000);
        // Bit 31 set: the U immediate is negative as an i32.
        let inst = decode(lui(Gpr::A0, 0x80000));
        assert_eq!(inst.imm_u, i32::MIN);
    }

    #[test]
    fn test_j_immediate() {
        // jal x1, +8 == 0x008000ef
        let inst = decode(0x008000ef);
        assert_eq!(inst.imm_j, 8);
        let inst = decode(jal(Gpr::ZERO, -4));
        assert_eq!(inst.imm_j, -4);
        let inst = decode(jal(Gpr::RA, 0x1000));
        assert_eq!(inst.imm_j, 0x1000);
    }

    #[test]
    fn test_big_endian_stream() {
        let decoder = Decoder::new(Endianness::Big);
        let inst = decoder.decode(0, &0x00500093u32.to_be_bytes()).unwrap();
        assert_eq!(inst.imm_i, 5);
        assert_eq!(inst.rd, 1);
    }

    #[test]
    fn test_decoding_is_pure() {
        let decoder = Decoder::new(Endianness::Little);
        let bytes = 0x00500093u32.to_le_bytes();
        let a = decoder.decode(0x40, &bytes).unwrap();
        let b = decoder.decode(0x40, &bytes).unwrap();
        assert_eq!(a, b);
    }
}
