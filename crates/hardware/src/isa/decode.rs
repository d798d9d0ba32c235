//! Class-ordered instruction decoder.
//!
//! A pure function from a 32-bit fetch word (16-bit compressed forms occupy
//! the low half) to a tagged instruction record. Classes are probed in a
//! fixed order (base integer, compressed, multiply/divide, atomic) and the
//! first match wins; anything left over is `Unknown` and executes as a NOP.
//!
//! Immediates follow the I/S/B/U/J formats with sign extension; the SYSTEM
//! immediate is the zero-extended funct12 (it doubles as the CSR address).
//! The destination register is forced to 0 for store and branch formats
//! regardless of the field bits.

use crate::common::Xlen;
use crate::isa::instruction::{Instr, InstrClass};
use crate::isa::opcodes::{funct7, op};
use crate::isa::rvc;

/// Decodes one fetch word at `pc` into an instruction record.
pub fn decode<X: Xlen>(raw: u32, pc: u64) -> Instr {
    if raw & 0x3 == 0x3 {
        match classify(raw) {
            // Unknown encodings carry no fields so they flow through the
            // pipelines as pure NOPs.
            InstrClass::Unknown => Instr {
                raw,
                word: raw,
                pc,
                class: InstrClass::Unknown,
                size: 4,
                ..Instr::default()
            },
            class => build(raw, raw, pc, class, 4),
        }
    } else {
        match rvc::expand(raw as u16, X::BITS) {
            Some(word) => build(raw, word, pc, InstrClass::Compressed, 2),
            None => Instr {
                raw,
                word: raw,
                pc,
                class: InstrClass::Unknown,
                size: 2,
                ..Instr::default()
            },
        }
    }
}

/// Assigns the decoding class for a full-width encoding.
fn classify(word: u32) -> InstrClass {
    let opcode = word & 0x7F;
    let f7 = (word >> 25) & 0x7F;

    match opcode {
        op::LOAD | op::STORE | op::BRANCH | op::JAL | op::JALR | op::LUI | op::AUIPC
        | op::OP_IMM | op::OP_IMM_32 | op::MISC_MEM => InstrClass::BaseI,
        op::OP | op::OP_32 if f7 != funct7::MULDIV => InstrClass::BaseI,
        op::OP | op::OP_32 => InstrClass::Muldiv,
        op::AMO => InstrClass::Atomic,
        op::SYSTEM => InstrClass::System,
        _ => InstrClass::Unknown,
    }
}

/// Extracts fields and the format immediate from the 32-bit encoding.
fn build(raw: u32, word: u32, pc: u64, class: InstrClass, size: u64) -> Instr {
    let opcode = word & 0x7F;
    let funct3 = (word >> 12) & 0x7;
    let funct7 = (word >> 25) & 0x7F;
    let rs1 = ((word >> 15) & 0x1F) as usize;
    let rs2 = ((word >> 20) & 0x1F) as usize;

    // Stores and branches have no destination register.
    let rd = if opcode == op::STORE || opcode == op::BRANCH {
        0
    } else {
        ((word >> 7) & 0x1F) as usize
    };

    let imm: i64 = match opcode {
        // I-type
        op::LOAD | op::OP_IMM | op::OP_IMM_32 | op::JALR => ((word as i32) >> 20) as i64,
        // S-type
        op::STORE => {
            let v = ((word >> 25) << 5) | ((word >> 7) & 0x1F);
            ((v as i32) << 20 >> 20) as i64
        }
        // B-type
        op::BRANCH => {
            let v = ((word >> 31) << 12)
                | (((word >> 7) & 0x1) << 11)
                | (((word >> 25) & 0x3F) << 5)
                | (((word >> 8) & 0xF) << 1);
            ((v as i32) << 19 >> 19) as i64
        }
        // U-type
        op::LUI | op::AUIPC => (word & 0xFFFF_F000) as i32 as i64,
        // J-type
        op::JAL => {
            let v = ((word >> 31) << 20)
                | (((word >> 12) & 0xFF) << 12)
                | (((word >> 20) & 0x1) << 11)
                | (((word >> 21) & 0x3FF) << 1);
            ((v as i32) << 11 >> 11) as i64
        }
        // funct12, zero-extended (doubles as the CSR address)
        op::SYSTEM => ((word >> 20) & 0xFFF) as i64,
        _ => 0,
    };

    Instr {
        raw,
        word,
        pc,
        class,
        opcode,
        rd,
        rs1,
        rs2,
        funct3,
        funct7,
        imm,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_addi() {
        // addi x1, x0, 7
        let i = decode::<u32>((7 << 20) | (1 << 7) | op::OP_IMM, 0x100);
        assert_eq!(i.class, InstrClass::BaseI);
        assert_eq!(i.opcode, op::OP_IMM);
        assert_eq!(i.rd, 1);
        assert_eq!(i.rs1, 0);
        assert_eq!(i.imm, 7);
        assert_eq!(i.size, 4);
        assert_eq!(i.pc, 0x100);
    }

    #[test]
    fn test_decode_negative_imm() {
        // addi x1, x0, -1
        let i = decode::<u32>((0xFFF << 20) | (1 << 7) | op::OP_IMM, 0);
        assert_eq!(i.imm, -1);
    }

    #[test]
    fn test_store_has_no_rd() {
        // sw x5, 8(x2): S-type with rd bits carrying imm[4:0]
        let word = (8u32 >> 5) << 25 | (5 << 20) | (2 << 15) | (0b010 << 12) | (8 << 7) | op::STORE;
        let i = decode::<u32>(word, 0);
        assert_eq!(i.rd, 0);
        assert_eq!(i.imm, 8);
        assert_eq!(i.rs1, 2);
        assert_eq!(i.rs2, 5);
    }

    #[test]
    fn test_branch_has_no_rd() {
        // beq x0, x0, 8
        let word = (8u32 >> 1 & 0xF) << 8 | op::BRANCH;
        let i = decode::<u32>(word, 0);
        assert_eq!(i.rd, 0);
        assert_eq!(i.imm, 8);
    }

    #[test]
    fn test_muldiv_class() {
        // mul x3, x1, x2
        let word = (1 << 25) | (2 << 20) | (1 << 15) | (3 << 7) | op::OP;
        assert_eq!(decode::<u32>(word, 0).class, InstrClass::Muldiv);
        // add x3, x1, x2 stays BaseI
        let word = (2 << 20) | (1 << 15) | (3 << 7) | op::OP;
        assert_eq!(decode::<u32>(word, 0).class, InstrClass::BaseI);
    }

    #[test]
    fn test_atomic_class() {
        // amoswap.w x3, x2, (x1)
        let word = (0x01 << 27) | (2 << 20) | (1 << 15) | (0b010 << 12) | (3 << 7) | op::AMO;
        assert_eq!(decode::<u32>(word, 0).class, InstrClass::Atomic);
    }

    #[test]
    fn test_system_class_and_funct12() {
        // ecall
        assert_eq!(decode::<u32>(0x0000_0073, 0).class, InstrClass::System);
        assert_eq!(decode::<u32>(0x0000_0073, 0).imm, 0);
        // mret carries funct12 = 0x302
        assert_eq!(decode::<u32>(0x3020_0073, 0).imm, 0x302);
    }

    #[test]
    fn test_compressed_class_and_size() {
        // c.li x8, 1
        let i = decode::<u32>(0x4405, 0x200);
        assert_eq!(i.class, InstrClass::Compressed);
        assert_eq!(i.size, 2);
        assert_eq!(i.rd, 8);
        assert_eq!(i.imm, 1);
        assert_eq!(i.opcode, op::OP_IMM);
    }

    #[test]
    fn test_unknown_class() {
        let i = decode::<u32>(0xFFFF_FFFF, 0);
        assert_eq!(i.class, InstrClass::Unknown);
    }

    #[test]
    fn test_jal_imm() {
        // jal x1, 2048
        let imm: u32 = 2048;
        let word = ((imm >> 20) & 1) << 31
            | ((imm >> 1) & 0x3FF) << 21
            | ((imm >> 11) & 1) << 20
            | ((imm >> 12) & 0xFF) << 12
            | (1 << 7)
            | op::JAL;
        let i = decode::<u32>(word, 0);
        assert_eq!(i.imm, 2048);
        assert_eq!(i.rd, 1);
    }
}
