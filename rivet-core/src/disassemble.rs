//! Textual disassembly.
//!
//! Rendering sits on top of [`Instruction::decode`], the same decode the execution
//! engine runs: there is no second set of field or immediate formulas to drift out
//! of sync. A word the decoder rejects renders as `"unknown"`.

use crate::instruction::{
    BranchCondition, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp, StoreWidth,
};
use std::fmt;

/// An instruction word paired with the address it was fetched from, displayable as
/// assembler-style text.
///
/// The rendered text is position-independent (branch and jump offsets are shown
/// relative, as the assembler writes them); `address` is carried for consumers
/// that annotate by location. Formatting never fails. Callers that must bound the
/// rendered length can apply a format precision: `{:.20}` truncates silently,
/// like any string.
#[derive(Debug, Copy, Clone)]
pub struct Disasm {
    pub address: u32,
    pub word: u32,
}

impl Disasm {
    pub fn new(address: u32, word: u32) -> Self {
        Self { address, word }
    }
}

impl fmt::Display for Disasm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Route through `pad` so the caller's width and precision apply.
        f.pad(&render(self.word))
    }
}

/// Renders one instruction word as assembler-style text.
pub fn disassemble(address: u32, word: u32) -> String {
    Disasm::new(address, word).to_string()
}

fn render(word: u32) -> String {
    let instruction = match Instruction::decode(word) {
        Ok(instruction) => instruction,
        Err(_) => return "unknown".to_owned(),
    };
    match instruction {
        Instruction::OpImm {
            op,
            dest,
            src,
            immediate,
        } => format!("{} {dest}, {src}, {immediate}", op_imm_mnemonic(op)),
        Instruction::OpShiftImm {
            op,
            dest,
            src,
            shift_amount_u5,
        } => format!(
            "{} {dest}, {src}, {shift_amount_u5}",
            shift_imm_mnemonic(op)
        ),
        Instruction::Lui { dest, immediate } => format!("lui {dest}, {immediate}"),
        Instruction::Auipc { dest, immediate } => format!("auipc {dest}, {immediate}"),
        Instruction::Op {
            op,
            dest,
            src1,
            src2,
        } => format!("{} {dest}, {src1}, {src2}", op_mnemonic(op)),
        Instruction::Jal { dest, offset } => format!("jal {dest}, {offset}"),
        Instruction::Jalr { dest, base, offset } => format!("jalr {dest}, {offset}({base})"),
        Instruction::Branch {
            condition,
            src1,
            src2,
            offset,
        } => format!("{} {src1}, {src2}, {offset}", branch_mnemonic(condition)),
        Instruction::Load {
            width,
            dest,
            base,
            offset,
        } => format!("{} {dest}, {offset}({base})", load_mnemonic(width)),
        Instruction::Store {
            width,
            src,
            base,
            offset,
        } => format!("{} {src}, {offset}({base})", store_mnemonic(width)),
        Instruction::Ecall => "ecall".to_owned(),
    }
}

fn op_imm_mnemonic(op: RegImmOp) -> &'static str {
    match op {
        RegImmOp::Addi => "addi",
        RegImmOp::Slti => "slti",
        RegImmOp::Sltiu => "sltiu",
        RegImmOp::Xori => "xori",
        RegImmOp::Ori => "ori",
        RegImmOp::Andi => "andi",
    }
}

fn shift_imm_mnemonic(op: RegShiftImmOp) -> &'static str {
    match op {
        RegShiftImmOp::Slli => "slli",
        RegShiftImmOp::Srli => "srli",
        RegShiftImmOp::Srai => "srai",
    }
}

fn op_mnemonic(op: RegRegOp) -> &'static str {
    match op {
        RegRegOp::Add => "add",
        RegRegOp::Slt => "slt",
        RegRegOp::Sltu => "sltu",
        RegRegOp::And => "and",
        RegRegOp::Or => "or",
        RegRegOp::Xor => "xor",
        RegRegOp::Sll => "sll",
        RegRegOp::Srl => "srl",
        RegRegOp::Sub => "sub",
        RegRegOp::Sra => "sra",
        RegRegOp::Mul => "mul",
        RegRegOp::Mulh => "mulh",
        RegRegOp::Div => "div",
        RegRegOp::Divu => "divu",
        RegRegOp::Rem => "rem",
        RegRegOp::Remu => "remu",
    }
}

fn branch_mnemonic(condition: BranchCondition) -> &'static str {
    match condition {
        BranchCondition::Beq => "beq",
        BranchCondition::Bne => "bne",
        BranchCondition::Blt => "blt",
        BranchCondition::Bltu => "bltu",
        BranchCondition::Bge => "bge",
        BranchCondition::Bgeu => "bgeu",
    }
}

fn load_mnemonic(width: LoadWidth) -> &'static str {
    match width {
        LoadWidth::Lb => "lb",
        LoadWidth::Lh => "lh",
        LoadWidth::Lw => "lw",
        LoadWidth::Lbu => "lbu",
        LoadWidth::Lhu => "lhu",
    }
}

fn store_mnemonic(width: StoreWidth) -> &'static str {
    match width {
        StoreWidth::Sb => "sb",
        StoreWidth::Sh => "sh",
        StoreWidth::Sw => "sw",
    }
}
