//! Instruction decoding for RV32I plus the multiply/divide subset of the M extension.
//!
//! Decoding is the single source of truth for field and immediate extraction: the
//! execution engine and the textual disassembler both consume [`Instruction::decode`],
//! so their view of any instruction word is bit-identical by construction.

use crate::registers::Specifier;
use thiserror::Error;

/// Data structure that can hold any supported instruction in its decoded form.
///
/// One variant per instruction form; each variant carries exactly the fields and the
/// one immediate its form uses. A value of this type is ephemeral: it is recomputed
/// from the raw word on every fetch and never cached.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    },
    OpShiftImm {
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    },
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    Ecall,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegShiftImmOp {
    Slli,
    Srli,
    Srai,
}

/// Register-register operations, both the base set and the supported M-extension
/// subset (`funct7 == 0b0000001`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegRegOp {
    Add,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sub,
    Sra,
    Mul,
    Mulh,
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
}

impl Instruction {
    /// Decodes `raw_instruction` into its tagged form.
    ///
    /// Returns a [`DecodeError`] for any word outside the supported table. Callers
    /// decide what that means: the execution engine retires such a word as a no-op,
    /// the disassembler renders it as `"unknown"`. Decoding itself never panics and
    /// has no side effects.
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        match opcode(raw_instruction).ok_or(DecodeError::UnsupportedOpcode)? {
            Opcode::OpImm => match i_funct(raw_instruction) {
                Some(op) => Ok(Self::OpImm {
                    op,
                    dest: rd(raw_instruction),
                    src: rs1(raw_instruction),
                    immediate: i_imm(raw_instruction),
                }),
                None => match i_shfunct(raw_instruction) {
                    Some(op) => Ok(Self::OpShiftImm {
                        op,
                        dest: rd(raw_instruction),
                        src: rs1(raw_instruction),
                        shift_amount_u5: shamt(raw_instruction),
                    }),
                    None => Err(DecodeError::UnsupportedFunct),
                },
            },
            Opcode::Auipc => Ok(Self::Auipc {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Lui => Ok(Self::Lui {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Op => match r_funct(raw_instruction) {
                Some(op) => Ok(Self::Op {
                    op,
                    dest: rd(raw_instruction),
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                }),
                None => Err(DecodeError::UnsupportedFunct),
            },
            Opcode::Jal => Ok(Self::Jal {
                dest: rd(raw_instruction),
                offset: j_imm(raw_instruction),
            }),
            Opcode::Jalr => match funct3(raw_instruction) {
                0b000 => Ok(Self::Jalr {
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                _ => Err(DecodeError::UnsupportedFunct),
            },
            Opcode::Branch => match b_funct(raw_instruction) {
                Some(condition) => Ok(Self::Branch {
                    condition,
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                    offset: b_imm(raw_instruction),
                }),
                None => Err(DecodeError::UnsupportedFunct),
            },
            Opcode::Load => match i_width(raw_instruction) {
                Some(width) => Ok(Self::Load {
                    width,
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                None => Err(DecodeError::UnsupportedFunct),
            },
            Opcode::Store => match s_width(raw_instruction) {
                Some(width) => Ok(Self::Store {
                    width,
                    src: rs2(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: s_imm(raw_instruction),
                }),
                None => Err(DecodeError::UnsupportedFunct),
            },
            // Only the canonical ECALL word is recognized under the SYSTEM opcode.
            // EBREAK and the CSR encodings are outside the supported table.
            Opcode::System => match (
                funct3(raw_instruction),
                i_imm(raw_instruction),
                u8::from(rd(raw_instruction)),
                u8::from(rs1(raw_instruction)),
            ) {
                (0, 0, 0, 0) => Ok(Self::Ecall),
                _ => Err(DecodeError::UnsupportedFunct),
            },
        }
    }
}

/// A word that does not decode to any supported instruction.
///
/// The reserved, unimplemented, and other-extension encodings are not told apart;
/// every one of them retires as a silent no-op.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("instruction has unsupported opcode")]
    UnsupportedOpcode,
    #[error("instruction has unsupported funct fields")]
    UnsupportedFunct,
}

/// Returns the 7-bit *opcode* value of the instruction, or `None` if it isn't supported.
fn opcode(raw_instruction: u32) -> Option<Opcode> {
    #[allow(clippy::unusual_byte_groupings)]
    match raw_instruction & 0x7F {
        0b00_000_11 => Some(Opcode::Load),
        // LoadFp = 0b00_001_11,
        // custom-0
        // MiscMem = 0b00_011_11,
        0b00_100_11 => Some(Opcode::OpImm),
        0b00_101_11 => Some(Opcode::Auipc),
        // OP-IMM-32
        // 48b
        0b01_000_11 => Some(Opcode::Store),
        // StoreFp = 0b01_001_11,
        // custom-1
        // Amo = 0b01_011_11,
        0b01_100_11 => Some(Opcode::Op),
        0b01_101_11 => Some(Opcode::Lui),
        // OP-32
        // 64b
        0b11_000_11 => Some(Opcode::Branch),
        0b11_001_11 => Some(Opcode::Jalr),
        // reserved
        0b11_011_11 => Some(Opcode::Jal),
        0b11_100_11 => Some(Opcode::System),
        // reserved
        // custom-3/rv128
        // >= 80b
        _ => None,
    }
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 20) & 0x1F) as u8)
}

fn i_funct(raw_instruction: u32) -> Option<RegImmOp> {
    match funct3(raw_instruction) {
        0b000 => Some(RegImmOp::Addi),
        0b010 => Some(RegImmOp::Slti),
        0b011 => Some(RegImmOp::Sltiu),
        0b100 => Some(RegImmOp::Xori),
        0b110 => Some(RegImmOp::Ori),
        0b111 => Some(RegImmOp::Andi),
        _ => None,
    }
}

// Immediate shifts use the funct7 position as a flag field, but only bit 30
// distinguishes the two right shifts; the remaining bits are not inspected.
fn i_shfunct(raw_instruction: u32) -> Option<RegShiftImmOp> {
    let bit30 = (raw_instruction >> 30) & 1;
    match (bit30, funct3(raw_instruction)) {
        (0, 0b001) => Some(RegShiftImmOp::Slli),
        (0, 0b101) => Some(RegShiftImmOp::Srli),
        (1, 0b101) => Some(RegShiftImmOp::Srai),
        _ => None,
    }
}

fn i_width(raw_instruction: u32) -> Option<LoadWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(LoadWidth::Lb),
        0b001 => Some(LoadWidth::Lh),
        0b010 => Some(LoadWidth::Lw),
        0b100 => Some(LoadWidth::Lbu),
        0b101 => Some(LoadWidth::Lhu),
        _ => None,
    }
}

fn s_width(raw_instruction: u32) -> Option<StoreWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(StoreWidth::Sb),
        0b001 => Some(StoreWidth::Sh),
        0b010 => Some(StoreWidth::Sw),
        _ => None,
    }
}

fn r_funct(raw_instruction: u32) -> Option<RegRegOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b000) => Some(RegRegOp::Add),
        (0b0000000, 0b001) => Some(RegRegOp::Sll),
        (0b0000000, 0b010) => Some(RegRegOp::Slt),
        (0b0000000, 0b011) => Some(RegRegOp::Sltu),
        (0b0000000, 0b100) => Some(RegRegOp::Xor),
        (0b0000000, 0b101) => Some(RegRegOp::Srl),
        (0b0000000, 0b110) => Some(RegRegOp::Or),
        (0b0000000, 0b111) => Some(RegRegOp::And),
        (0b0100000, 0b000) => Some(RegRegOp::Sub),
        (0b0100000, 0b101) => Some(RegRegOp::Sra),
        (0b0000001, 0b000) => Some(RegRegOp::Mul),
        (0b0000001, 0b001) => Some(RegRegOp::Mulh),
        // Mulhsu = (0b0000001, 0b010),
        // Mulhu = (0b0000001, 0b011),
        (0b0000001, 0b100) => Some(RegRegOp::Div),
        (0b0000001, 0b101) => Some(RegRegOp::Divu),
        (0b0000001, 0b110) => Some(RegRegOp::Rem),
        (0b0000001, 0b111) => Some(RegRegOp::Remu),
        _ => None,
    }
}

fn b_funct(raw_instruction: u32) -> Option<BranchCondition> {
    match funct3(raw_instruction) {
        0b000 => Some(BranchCondition::Beq),
        0b001 => Some(BranchCondition::Bne),
        0b100 => Some(BranchCondition::Blt),
        0b101 => Some(BranchCondition::Bge),
        0b110 => Some(BranchCondition::Bltu),
        0b111 => Some(BranchCondition::Bgeu),
        _ => None,
    }
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw_instruction: u32) -> u8 {
    (raw_instruction >> 25) as u8
}

/// Returns the 5-bit *shamt* value for immediate shift instructions.
fn shamt(raw_instruction: u32) -> u32 {
    (raw_instruction >> 20) & 0x1F
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(raw_instruction: u32) -> i32 {
    raw_instruction as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(raw_instruction: u32) -> i32 {
    let imm_11_5 = raw_instruction & 0xFE00_0000;
    let imm_4_0 = raw_instruction & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits. Bit 0 is always zero.
fn b_imm(raw_instruction: u32) -> i32 {
    let imm_12 = raw_instruction & 0x8000_0000;
    let imm_10_5 = raw_instruction & 0x7E00_0000;
    let imm_4_1 = raw_instruction & 0x0000_0F00;
    let imm_11 = raw_instruction & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the signed 32-bit U-immediate. The low 12 bits are always zero.
fn u_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits. Bit 0 is always zero.
fn j_imm(raw_instruction: u32) -> i32 {
    let imm_20 = raw_instruction & 0x8000_0000;
    let imm_10_1 = raw_instruction & 0x7FE0_0000;
    let imm_11 = raw_instruction & 0x0010_0000;
    let imm_19_12 = raw_instruction & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Opcode {
    OpImm,
    Auipc,
    Lui,
    Op,
    Jal,
    Jalr,
    Branch,
    Load,
    Store,
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i_imm() {
        assert_eq!(0, i_imm(0x0000_0000));
        assert_eq!(-1, i_imm(0xFFF0_0000));
        assert_eq!(2047, i_imm(2047 << 20));
        assert_eq!(-2048, i_imm(0x8000_0000));
        assert_eq!(-42, i_imm((-42_i32 << 20) as u32));
        // Check other bits are ignored
        assert_eq!(0, i_imm(0x000F_FFFF));
        assert_eq!(-1, i_imm(0xFFF1_2345));
        assert_eq!(1209, i_imm((1209 << 20) | 0x000C_D10A));
    }

    #[test]
    fn test_s_imm() {
        assert_eq!(0, s_imm(0x0000_0000));
        // sw x5, -4(x2)
        assert_eq!(-4, s_imm(0xFE51_2E23));
        // sb x5, 3(x2)
        assert_eq!(3, s_imm(0x0051_01A3));
        assert_eq!(2047, s_imm(0x7E00_0F80));
        assert_eq!(-2048, s_imm(0x8000_0000));
        // Check other bits are ignored
        assert_eq!(0, s_imm(0x01FF_F07F));
    }

    #[test]
    fn test_b_imm() {
        assert_eq!(0, b_imm(0x0000_0000));
        // beq x0, x0, 8
        assert_eq!(8, b_imm(0x0000_0463));
        // beq x1, x2, -4
        assert_eq!(-4, b_imm(0xFE20_8EE3));
        // Maximum forward offset: imm[12] = 0, all other immediate bits set
        assert_eq!(4094, b_imm(0x7E00_0F80));
        // Maximum backward offset: only imm[12] set
        assert_eq!(-4096, b_imm(0x8000_0000));
        // Check other bits are ignored
        assert_eq!(0, b_imm(0x01FF_F07F));
    }

    #[test]
    fn test_u_imm() {
        assert_eq!(0, u_imm(0x0000_0000));
        assert_eq!(0x1234_5000, u_imm(0x1234_52B7));
        assert_eq!(-2048 << 12, u_imm(0xFF80_0000));
        assert_eq!(u32::MAX as i32 & !0xFFF, u_imm(0xFFFF_FFFF));
        // Check the low 12 bits are ignored
        assert_eq!(0, u_imm(0x0000_0FFF));
    }

    #[test]
    fn test_j_imm() {
        assert_eq!(0, j_imm(0x0000_0000));
        // jal x3, 2048
        assert_eq!(2048, j_imm(0x0010_01EF));
        // All immediate bits except imm[20] set
        assert_eq!(0x000F_FFFE, j_imm(0x7FFF_F000));
        // Only imm[20] set
        assert_eq!(-(1 << 20), j_imm(0x8000_0000));
        // Check other bits are ignored
        assert_eq!(0, j_imm(0x0000_0FFF));
    }

    #[test]
    fn decode_op_imm() {
        assert_eq!(
            Ok(Instruction::OpImm {
                op: RegImmOp::Addi,
                dest: Specifier::from_u5(1),
                src: Specifier::X0,
                immediate: -1,
            }),
            Instruction::decode(0xFFF0_0093)
        );
        assert_eq!(
            Ok(Instruction::OpImm {
                op: RegImmOp::Andi,
                dest: Specifier::from_u5(10),
                src: Specifier::from_u5(10),
                immediate: 0xFF,
            }),
            Instruction::decode(0x0FF5_7513)
        );
    }

    #[test]
    fn decode_op_shift_imm() {
        assert_eq!(
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Slli,
                dest: Specifier::from_u5(2),
                src: Specifier::from_u5(3),
                shift_amount_u5: 5,
            }),
            Instruction::decode(0x0051_9113)
        );
        assert_eq!(
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Srli,
                dest: Specifier::from_u5(2),
                src: Specifier::from_u5(3),
                shift_amount_u5: 5,
            }),
            Instruction::decode(0x0051_D113)
        );
        assert_eq!(
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Srai,
                dest: Specifier::from_u5(2),
                src: Specifier::from_u5(3),
                shift_amount_u5: 5,
            }),
            Instruction::decode(0x4051_D113)
        );
    }

    #[test]
    fn decode_op() {
        assert_eq!(
            Ok(Instruction::Op {
                op: RegRegOp::Add,
                dest: Specifier::from_u5(1),
                src1: Specifier::from_u5(2),
                src2: Specifier::from_u5(3),
            }),
            Instruction::decode(0x0031_00B3)
        );
        assert_eq!(
            Ok(Instruction::Op {
                op: RegRegOp::Sub,
                dest: Specifier::from_u5(1),
                src1: Specifier::from_u5(2),
                src2: Specifier::from_u5(3),
            }),
            Instruction::decode(0x4031_00B3)
        );
    }

    #[test]
    fn decode_op_muldiv() {
        let muldiv = |raw| match Instruction::decode(raw) {
            Ok(Instruction::Op { op, .. }) => op,
            other => panic!("unexpected decode result: {other:?}"),
        };
        assert_eq!(RegRegOp::Mul, muldiv(0x0231_00B3));
        assert_eq!(RegRegOp::Mulh, muldiv(0x0231_10B3));
        assert_eq!(RegRegOp::Div, muldiv(0x0231_40B3));
        assert_eq!(RegRegOp::Divu, muldiv(0x0231_50B3));
        assert_eq!(RegRegOp::Rem, muldiv(0x0231_60B3));
        assert_eq!(RegRegOp::Remu, muldiv(0x0231_70B3));
    }

    #[test]
    fn decode_rejects_mulhsu_mulhu() {
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0231_20B3)
        );
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0231_30B3)
        );
    }

    #[test]
    fn decode_rejects_stray_funct7() {
        // add with an extra funct7 bit set
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x1031_00B3)
        );
        // sra pattern with funct3 = 0b100
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x4031_40B3)
        );
    }

    #[test]
    fn decode_load_store() {
        assert_eq!(
            Ok(Instruction::Load {
                width: LoadWidth::Lw,
                dest: Specifier::from_u5(5),
                base: Specifier::from_u5(2),
                offset: 8,
            }),
            Instruction::decode(0x0081_2283)
        );
        assert_eq!(
            Ok(Instruction::Load {
                width: LoadWidth::Lbu,
                dest: Specifier::from_u5(6),
                base: Specifier::from_u5(7),
                offset: 3,
            }),
            Instruction::decode(0x0033_C303)
        );
        assert_eq!(
            Ok(Instruction::Store {
                width: StoreWidth::Sw,
                src: Specifier::from_u5(5),
                base: Specifier::from_u5(2),
                offset: -4,
            }),
            Instruction::decode(0xFE51_2E23)
        );
        // ld (funct3 = 0b011) is an RV64 encoding
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0081_3283)
        );
    }

    #[test]
    fn decode_branch() {
        assert_eq!(
            Ok(Instruction::Branch {
                condition: BranchCondition::Beq,
                src1: Specifier::X0,
                src2: Specifier::X0,
                offset: 8,
            }),
            Instruction::decode(0x0000_0463)
        );
        // funct3 = 0b010 and 0b011 are not branch conditions
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0000_2463)
        );
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0000_3463)
        );
    }

    #[test]
    fn decode_jumps() {
        assert_eq!(
            Ok(Instruction::Jal {
                dest: Specifier::from_u5(1),
                offset: 0,
            }),
            Instruction::decode(0x0000_00EF)
        );
        assert_eq!(
            Ok(Instruction::Jalr {
                dest: Specifier::X0,
                base: Specifier::from_u5(1),
                offset: 0,
            }),
            Instruction::decode(0x0000_8067)
        );
        // jalr with nonzero funct3
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0000_9067)
        );
    }

    #[test]
    fn decode_upper_immediates() {
        assert_eq!(
            Ok(Instruction::Lui {
                dest: Specifier::from_u5(5),
                immediate: 0x1234_5000,
            }),
            Instruction::decode(0x1234_52B7)
        );
        assert_eq!(
            Ok(Instruction::Auipc {
                dest: Specifier::from_u5(5),
                immediate: 0x0100_0000,
            }),
            Instruction::decode(0x0100_0297)
        );
    }

    #[test]
    fn decode_system() {
        assert_eq!(Ok(Instruction::Ecall), Instruction::decode(0x0000_0073));
        // ebreak
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0010_0073)
        );
        // ecall with a nonzero rd is not the canonical word
        assert_eq!(
            Err(DecodeError::UnsupportedFunct),
            Instruction::decode(0x0000_00F3)
        );
    }

    #[test]
    fn decode_unsupported_opcode() {
        assert_eq!(
            Err(DecodeError::UnsupportedOpcode),
            Instruction::decode(0x0000_0000)
        );
        assert_eq!(
            Err(DecodeError::UnsupportedOpcode),
            Instruction::decode(0xFFFF_FFFF)
        );
        // fence lives under MISC-MEM, which is outside the table
        assert_eq!(
            Err(DecodeError::UnsupportedOpcode),
            Instruction::decode(0x0FF0_000F)
        );
    }

    // The encoders below are written from the instruction format tables, not from
    // the decoder, so the sweep tests check decoding against an independent
    // reassembly of each form.

    fn encode_i(immediate: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        ((immediate as u32) << 20) | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    fn encode_s(offset: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = offset as u32;
        (imm >> 5 & 0x7F) << 25
            | rs2 << 20
            | rs1 << 15
            | funct3 << 12
            | (imm & 0x1F) << 7
            | 0b0100011
    }

    fn encode_b(offset: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = offset as u32;
        (imm >> 12 & 1) << 31
            | (imm >> 5 & 0x3F) << 25
            | rs2 << 20
            | rs1 << 15
            | funct3 << 12
            | (imm >> 1 & 0xF) << 8
            | (imm >> 11 & 1) << 7
            | 0b1100011
    }

    fn encode_j(offset: i32, rd: u32) -> u32 {
        let imm = offset as u32;
        (imm >> 20 & 1) << 31
            | (imm >> 1 & 0x3FF) << 21
            | (imm >> 11 & 1) << 20
            | (imm >> 12 & 0xFF) << 12
            | rd << 7
            | 0b1101111
    }

    #[test]
    fn decode_recovers_encoded_i_type_fields() {
        for rd in [0, 1, 15, 31] {
            for rs1 in [0, 2, 31] {
                for immediate in [-2048, -1, 0, 1, 42, 2047] {
                    assert_eq!(
                        Ok(Instruction::OpImm {
                            op: RegImmOp::Addi,
                            dest: Specifier::from_u5(rd as u8),
                            src: Specifier::from_u5(rs1 as u8),
                            immediate,
                        }),
                        Instruction::decode(encode_i(immediate, rs1, 0b000, rd, 0b0010011))
                    );
                }
            }
        }
    }

    #[test]
    fn decode_recovers_encoded_s_type_offsets() {
        for rs2 in [0, 5, 31] {
            for rs1 in [2, 31] {
                for offset in [-2048, -4, 0, 3, 31, 32, 2047] {
                    assert_eq!(
                        Ok(Instruction::Store {
                            width: StoreWidth::Sw,
                            src: Specifier::from_u5(rs2 as u8),
                            base: Specifier::from_u5(rs1 as u8),
                            offset,
                        }),
                        Instruction::decode(encode_s(offset, rs2, rs1, 0b010))
                    );
                }
            }
        }
    }

    #[test]
    fn decode_recovers_encoded_b_type_offsets() {
        let conditions = [
            (0b000, BranchCondition::Beq),
            (0b001, BranchCondition::Bne),
            (0b100, BranchCondition::Blt),
            (0b101, BranchCondition::Bge),
            (0b110, BranchCondition::Bltu),
            (0b111, BranchCondition::Bgeu),
        ];
        for (funct3, condition) in conditions {
            for offset in [-4096, -2048, -4, 0, 2, 8, 62, 64, 2046, 4094] {
                assert_eq!(
                    Ok(Instruction::Branch {
                        condition,
                        src1: Specifier::from_u5(1),
                        src2: Specifier::from_u5(2),
                        offset,
                    }),
                    Instruction::decode(encode_b(offset, 2, 1, funct3))
                );
            }
        }
    }

    #[test]
    fn decode_recovers_encoded_j_type_offsets() {
        for offset in [-1048576, -4096, -24, -2, 0, 2, 2048, 4094, 4096, 1048574] {
            assert_eq!(
                Ok(Instruction::Jal {
                    dest: Specifier::from_u5(1),
                    offset,
                }),
                Instruction::decode(encode_j(offset, 1))
            );
        }
    }
}
