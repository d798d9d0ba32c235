//! Compressed instruction expansion.
//!
//! Converts a 16-bit "C" extension instruction into its 32-bit equivalent so
//! the rest of the decoder and the executor only ever see full-width
//! encodings. Covers the integer subset (RV32C/RV64C without the FP forms).
//! Returns `None` for reserved or unsupported encodings.

use crate::isa::opcodes::{funct3, funct7, op};

const QUADRANT_0: u16 = 0b00;
const QUADRANT_1: u16 = 0b01;
const QUADRANT_2: u16 = 0b10;

/// Expands a 16-bit compressed instruction into its 32-bit equivalent.
///
/// `xlen_bits` selects between the width-dependent encodings that share a
/// slot (C.JAL on RV32 vs. C.ADDIW on RV64, C.FSW vs. C.SD, and so on).
pub fn expand(inst: u16, xlen_bits: u32) -> Option<u32> {
    let f3 = (inst >> 13) & 0x7;
    let rv64 = xlen_bits == 64;

    match inst & 0x3 {
        QUADRANT_0 => expand_q0(inst, f3, rv64),
        QUADRANT_1 => expand_q1(inst, f3, rv64),
        QUADRANT_2 => expand_q2(inst, f3, rv64),
        _ => None,
    }
}

fn expand_q0(inst: u16, f3: u16, rv64: bool) -> Option<u32> {
    let rs1c = 8 + ((inst >> 7) & 0x7) as u32;
    let rdc = 8 + ((inst >> 2) & 0x7) as u32;

    match f3 {
        0b000 => {
            // C.ADDI4SPN: addi rd', x2, nzuimm
            let imm = (((inst >> 11) & 0x3) as u32) << 4
                | (((inst >> 7) & 0xF) as u32) << 6
                | (((inst >> 6) & 0x1) as u32) << 2
                | (((inst >> 5) & 0x1) as u32) << 3;
            if imm == 0 {
                return None;
            }
            Some(i_type(imm as i32, 2, funct3::ADD_SUB, rdc, op::OP_IMM))
        }
        0b010 => {
            // C.LW: lw rd', uimm(rs1')
            let imm = (((inst >> 10) & 0x7) as u32) << 3
                | (((inst >> 6) & 0x1) as u32) << 2
                | (((inst >> 5) & 0x1) as u32) << 6;
            Some(i_type(imm as i32, rs1c, funct3::LW, rdc, op::LOAD))
        }
        0b011 if rv64 => {
            // C.LD: ld rd', uimm(rs1')
            let imm =
                (((inst >> 10) & 0x7) as u32) << 3 | (((inst >> 5) & 0x3) as u32) << 6;
            Some(i_type(imm as i32, rs1c, funct3::LD, rdc, op::LOAD))
        }
        0b110 => {
            // C.SW: sw rs2', uimm(rs1')
            let imm = (((inst >> 10) & 0x7) as u32) << 3
                | (((inst >> 6) & 0x1) as u32) << 2
                | (((inst >> 5) & 0x1) as u32) << 6;
            Some(s_type(imm as i32, rs1c, rdc, funct3::SW))
        }
        0b111 if rv64 => {
            // C.SD: sd rs2', uimm(rs1')
            let imm =
                (((inst >> 10) & 0x7) as u32) << 3 | (((inst >> 5) & 0x3) as u32) << 6;
            Some(s_type(imm as i32, rs1c, rdc, funct3::SD))
        }
        _ => None,
    }
}

fn expand_q1(inst: u16, f3: u16, rv64: bool) -> Option<u32> {
    let rd = ((inst >> 7) & 0x1F) as u32;

    match f3 {
        0b000 => {
            // C.ADDI (C.NOP when rd = 0, imm = 0)
            let imm = ci_imm6(inst);
            Some(i_type(imm, rd, funct3::ADD_SUB, rd, op::OP_IMM))
        }
        0b001 => {
            if rv64 {
                // C.ADDIW
                if rd == 0 {
                    return None;
                }
                let imm = ci_imm6(inst);
                Some(i_type(imm, rd, funct3::ADD_SUB, rd, op::OP_IMM_32))
            } else {
                // C.JAL: jal x1, offset
                Some(j_type(cj_offset(inst), 1))
            }
        }
        0b010 => {
            // C.LI: addi rd, x0, imm
            let imm = ci_imm6(inst);
            Some(i_type(imm, 0, funct3::ADD_SUB, rd, op::OP_IMM))
        }
        0b011 => {
            if rd == 2 {
                // C.ADDI16SP: addi x2, x2, nzimm
                let imm = sign_extend(
                    (((inst >> 12) & 0x1) as u32) << 9
                        | (((inst >> 6) & 0x1) as u32) << 4
                        | (((inst >> 5) & 0x1) as u32) << 6
                        | (((inst >> 3) & 0x3) as u32) << 7
                        | (((inst >> 2) & 0x1) as u32) << 5,
                    10,
                );
                if imm == 0 {
                    return None;
                }
                Some(i_type(imm, 2, funct3::ADD_SUB, 2, op::OP_IMM))
            } else {
                // C.LUI: lui rd, nzimm
                let imm = sign_extend(
                    (((inst >> 12) & 0x1) as u32) << 17 | (((inst >> 2) & 0x1F) as u32) << 12,
                    18,
                );
                if imm == 0 {
                    return None;
                }
                Some(((imm as u32) & 0xFFFF_F000) | (rd << 7) | op::LUI)
            }
        }
        0b100 => expand_q1_alu(inst, rv64),
        0b101 => {
            // C.J: jal x0, offset
            Some(j_type(cj_offset(inst), 0))
        }
        0b110 => {
            // C.BEQZ: beq rs1', x0, offset
            let rs1c = 8 + ((inst >> 7) & 0x7) as u32;
            Some(b_type(cb_offset(inst), rs1c, 0, funct3::BEQ))
        }
        0b111 => {
            // C.BNEZ: bne rs1', x0, offset
            let rs1c = 8 + ((inst >> 7) & 0x7) as u32;
            Some(b_type(cb_offset(inst), rs1c, 0, funct3::BNE))
        }
        _ => None,
    }
}

fn expand_q1_alu(inst: u16, rv64: bool) -> Option<u32> {
    let rdc = 8 + ((inst >> 7) & 0x7) as u32;
    let rs2c = 8 + ((inst >> 2) & 0x7) as u32;
    let shamt =
        (((inst >> 12) & 0x1) as u32) << 5 | ((inst >> 2) & 0x1F) as u32;

    match (inst >> 10) & 0x3 {
        0b00 => {
            // C.SRLI
            if !rv64 && shamt >= 32 {
                return None;
            }
            Some(i_type(shamt as i32, rdc, funct3::SRL_SRA, rdc, op::OP_IMM))
        }
        0b01 => {
            // C.SRAI
            if !rv64 && shamt >= 32 {
                return None;
            }
            Some(i_type(
                (shamt | (funct7::ALT << 5)) as i32,
                rdc,
                funct3::SRL_SRA,
                rdc,
                op::OP_IMM,
            ))
        }
        0b10 => {
            // C.ANDI
            Some(i_type(ci_imm6(inst), rdc, funct3::AND, rdc, op::OP_IMM))
        }
        0b11 => {
            let word = (inst >> 12) & 0x1 != 0;
            match ((inst >> 5) & 0x3, word) {
                (0b00, false) => Some(r_type(funct7::ALT, rs2c, rdc, funct3::ADD_SUB, rdc, op::OP)),
                (0b01, false) => Some(r_type(0, rs2c, rdc, funct3::XOR, rdc, op::OP)),
                (0b10, false) => Some(r_type(0, rs2c, rdc, funct3::OR, rdc, op::OP)),
                (0b11, false) => Some(r_type(0, rs2c, rdc, funct3::AND, rdc, op::OP)),
                (0b00, true) if rv64 => {
                    Some(r_type(funct7::ALT, rs2c, rdc, funct3::ADD_SUB, rdc, op::OP_32))
                }
                (0b01, true) if rv64 => {
                    Some(r_type(0, rs2c, rdc, funct3::ADD_SUB, rdc, op::OP_32))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn expand_q2(inst: u16, f3: u16, rv64: bool) -> Option<u32> {
    let rd = ((inst >> 7) & 0x1F) as u32;
    let rs2 = ((inst >> 2) & 0x1F) as u32;

    match f3 {
        0b000 => {
            // C.SLLI
            let shamt =
                (((inst >> 12) & 0x1) as u32) << 5 | ((inst >> 2) & 0x1F) as u32;
            if !rv64 && shamt >= 32 {
                return None;
            }
            Some(i_type(shamt as i32, rd, funct3::SLL, rd, op::OP_IMM))
        }
        0b010 => {
            // C.LWSP
            if rd == 0 {
                return None;
            }
            let imm = (((inst >> 12) & 0x1) as u32) << 5
                | (((inst >> 4) & 0x7) as u32) << 2
                | (((inst >> 2) & 0x3) as u32) << 6;
            Some(i_type(imm as i32, 2, funct3::LW, rd, op::LOAD))
        }
        0b011 if rv64 => {
            // C.LDSP
            if rd == 0 {
                return None;
            }
            let imm = (((inst >> 12) & 0x1) as u32) << 5
                | (((inst >> 5) & 0x3) as u32) << 3
                | (((inst >> 2) & 0x7) as u32) << 6;
            Some(i_type(imm as i32, 2, funct3::LD, rd, op::LOAD))
        }
        0b100 => {
            let hi = (inst >> 12) & 0x1;
            match (hi, rd, rs2) {
                (0, 0, _) => None,
                // C.JR: jalr x0, 0(rs1)
                (0, _, 0) => Some(i_type(0, rd, 0, 0, op::JALR)),
                // C.MV: add rd, x0, rs2
                (0, _, _) => Some(r_type(0, rs2, 0, funct3::ADD_SUB, rd, op::OP)),
                // C.EBREAK
                (1, 0, 0) => Some(0x0010_0073),
                // C.JALR: jalr x1, 0(rs1)
                (1, _, 0) => Some(i_type(0, rd, 0, 1, op::JALR)),
                // C.ADD: add rd, rd, rs2
                (1, _, _) => Some(r_type(0, rs2, rd, funct3::ADD_SUB, rd, op::OP)),
                _ => None,
            }
        }
        0b110 => {
            // C.SWSP
            let imm = (((inst >> 9) & 0xF) as u32) << 2 | (((inst >> 7) & 0x3) as u32) << 6;
            Some(s_type(imm as i32, 2, rs2, funct3::SW))
        }
        0b111 if rv64 => {
            // C.SDSP
            let imm = (((inst >> 10) & 0x7) as u32) << 3 | (((inst >> 7) & 0x7) as u32) << 6;
            Some(s_type(imm as i32, 2, rs2, funct3::SD))
        }
        _ => None,
    }
}

/// CI-format 6-bit signed immediate (bit 12 plus bits 6:2).
fn ci_imm6(inst: u16) -> i32 {
    sign_extend(
        (((inst >> 12) & 0x1) as u32) << 5 | ((inst >> 2) & 0x1F) as u32,
        6,
    )
}

/// CJ-format 12-bit jump offset.
fn cj_offset(inst: u16) -> i32 {
    sign_extend(
        (((inst >> 12) & 0x1) as u32) << 11
            | (((inst >> 11) & 0x1) as u32) << 4
            | (((inst >> 9) & 0x3) as u32) << 8
            | (((inst >> 8) & 0x1) as u32) << 10
            | (((inst >> 7) & 0x1) as u32) << 6
            | (((inst >> 6) & 0x1) as u32) << 7
            | (((inst >> 3) & 0x7) as u32) << 1
            | (((inst >> 2) & 0x1) as u32) << 5,
        12,
    )
}

/// CB-format 9-bit branch offset.
fn cb_offset(inst: u16) -> i32 {
    sign_extend(
        (((inst >> 12) & 0x1) as u32) << 8
            | (((inst >> 10) & 0x3) as u32) << 3
            | (((inst >> 5) & 0x3) as u32) << 6
            | (((inst >> 3) & 0x3) as u32) << 1
            | (((inst >> 2) & 0x1) as u32) << 5,
        9,
    )
}

fn sign_extend(val: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((val << shift) as i32) >> shift
}

fn i_type(imm: i32, rs1: u32, f3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm as u32 & 0xFFF) << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | opcode
}

fn s_type(imm: i32, rs1: u32, rs2: u32, f3: u32) -> u32 {
    let imm = imm as u32;
    ((imm >> 5) & 0x7F) << 25
        | (rs2 << 20)
        | (rs1 << 15)
        | (f3 << 12)
        | ((imm & 0x1F) << 7)
        | op::STORE
}

fn b_type(imm: i32, rs1: u32, rs2: u32, f3: u32) -> u32 {
    let imm = imm as u32;
    ((imm >> 12) & 0x1) << 31
        | ((imm >> 5) & 0x3F) << 25
        | (rs2 << 20)
        | (rs1 << 15)
        | (f3 << 12)
        | ((imm >> 1) & 0xF) << 8
        | ((imm >> 11) & 0x1) << 7
        | op::BRANCH
}

fn j_type(imm: i32, rd: u32) -> u32 {
    let imm = imm as u32;
    ((imm >> 20) & 0x1) << 31
        | ((imm >> 1) & 0x3FF) << 21
        | ((imm >> 11) & 0x1) << 20
        | ((imm >> 12) & 0xFF) << 12
        | (rd << 7)
        | op::JAL
}

fn r_type(f7: u32, rs2: u32, rs1: u32, f3: u32, rd: u32, opcode: u32) -> u32 {
    (f7 << 25) | (rs2 << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | opcode
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_addi() {
        // c.addi x10, 3  => 0x050D
        let word = expand(0x050D, 32).unwrap();
        // addi x10, x10, 3
        assert_eq!(word, (3 << 20) | (10 << 15) | (10 << 7) | op::OP_IMM);
    }

    #[test]
    fn test_c_li() {
        // c.li x8, 1 => 0x4405
        let word = expand(0x4405, 32).unwrap();
        assert_eq!(word, (1 << 20) | (8 << 7) | op::OP_IMM);
    }

    #[test]
    fn test_c_mv() {
        // c.mv x10, x11 => 0x852E
        let word = expand(0x852E, 32).unwrap();
        assert_eq!(word, (11 << 20) | (10 << 7) | op::OP);
    }

    #[test]
    fn test_c_jr() {
        // c.jr x1 => 0x8082 (ret)
        let word = expand(0x8082, 32).unwrap();
        assert_eq!(word, (1 << 15) | op::JALR);
    }

    #[test]
    fn test_c_addi4spn_zero_reserved() {
        assert!(expand(0x0000, 32).is_none());
    }

    #[test]
    fn test_c_jal_rv32_vs_addiw_rv64() {
        // funct3 = 001, quadrant 1 with rd = 10
        let inst = 0x2505; // c.jal on RV32, c.addiw x10, 1 on RV64
        let rv32 = expand(inst, 32).unwrap();
        assert_eq!(rv32 & 0x7F, op::JAL);
        let rv64 = expand(inst, 64).unwrap();
        assert_eq!(rv64 & 0x7F, op::OP_IMM_32);
    }

    #[test]
    fn test_c_ebreak() {
        assert_eq!(expand(0x9002, 32).unwrap(), 0x0010_0073);
    }
}
