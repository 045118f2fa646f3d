//! The execution engine: fetch, decode, execute, retire.
//!
//! [`Simulator`] owns the register file, the program counter, and the memory it was
//! given, and advances one instruction at a time. Each step fetches the word at the
//! current PC, decodes it with [`Instruction::decode`], applies the instruction's
//! architectural effect, and retires it. Words outside the supported table retire as
//! silent no-ops. The only way a run ends is the exit environment call; everything
//! else loops forever, so drivers wanting a safety bound count retired instructions
//! themselves.

use crate::disassemble::disassemble;
use crate::instruction::{
    BranchCondition, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp, StoreWidth,
};
use crate::memory::Memory;
use crate::registers::{Registers, Specifier};
use crate::trace::{Effect, TraceRecord, TraceSink};
use log::{debug, trace, warn};
use std::io::{self, Read, Write};

/// Environment call selectors, dispatched on register `a7`.
pub mod syscall {
    /// Read one character from the input stream into `a0` (`-1` at end of input).
    pub const GETCHAR: u32 = 1;
    /// Write the low byte of `a0` to the output stream and flush.
    pub const PUTCHAR: u32 = 2;
    /// Stop the machine.
    pub const EXIT: u32 = 3;
    /// Stop the machine; the selector Linux uses for `exit`.
    pub const EXIT_LINUX: u32 = 93;
}

/// Whether the machine will execute more instructions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Running,
    Halted,
}

/// Aggregate statistics of a run, handed out when the machine halts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RunStats {
    /// Total number of retired instructions, no-op retirements included.
    pub retired: u64,
}

/// A single-hart RV32 machine: register file, program counter, and memory.
///
/// The machine starts in [`State::Running`] with all registers zero and the PC at
/// the entry address. It performs no alignment or bounds checking of its own; the
/// entry address is the caller's responsibility and every memory access is
/// delegated as-is to `M`.
///
/// The two character environment calls operate on the input and output streams the
/// machine was constructed with ([`Simulator::new`] wires them to stdin and
/// stdout). A getchar blocks exactly as a blocking read on the input stream would.
pub struct Simulator<M> {
    registers: Registers,
    memory: M,
    retired: u64,
    state: State,
    input: Box<dyn Read>,
    output: Box<dyn Write>,
}

impl<M: Memory> Simulator<M> {
    /// Creates a machine with the PC at `entry_address`, reading from stdin and
    /// writing to stdout.
    pub fn new(memory: M, entry_address: u32) -> Self {
        Self::with_io(memory, entry_address, io::stdin(), io::stdout())
    }

    /// Creates a machine with caller-supplied environment call streams.
    pub fn with_io(
        memory: M,
        entry_address: u32,
        input: impl Read + 'static,
        output: impl Write + 'static,
    ) -> Self {
        Self {
            registers: Registers::new(entry_address),
            memory,
            retired: 0,
            state: State::Running,
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of instructions retired so far.
    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Fetches, executes, and retires one instruction, reporting it to `tracer`.
    ///
    /// Stepping a halted machine does nothing and reports nothing. The record
    /// passed to the tracer carries the count of instructions retired *before*
    /// this one, so a trace starts at zero.
    pub fn step(&mut self, tracer: &mut impl TraceSink) -> State {
        if self.state == State::Halted {
            return State::Halted;
        }
        let pc = self.registers.pc();
        let word = self.memory.read_word(pc);
        let effect = match Instruction::decode(word) {
            Ok(instruction) => self.execute_instruction(instruction),
            Err(_) => {
                trace!("retiring unsupported word {word:#010x} at {pc:#010x} as a no-op");
                increment_pc(&mut self.registers);
                Effect::None
            }
        };
        if tracer.enabled() {
            let text = disassemble(pc, word);
            tracer.record(&TraceRecord {
                retired: self.retired,
                pc,
                word,
                text: &text,
                effect,
            });
        }
        self.retired += 1;
        self.state
    }

    /// Runs until the program exits, then returns the accumulated statistics.
    ///
    /// A program that never issues the exit environment call keeps this loop
    /// spinning indefinitely.
    pub fn run(&mut self, tracer: &mut impl TraceSink) -> RunStats {
        while self.step(tracer) == State::Running {}
        RunStats {
            retired: self.retired,
        }
    }

    fn execute_instruction(&mut self, instruction: Instruction) -> Effect {
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let op = match op {
                    RegImmOp::Addi => Self::addi,
                    RegImmOp::Slti => Self::slti,
                    RegImmOp::Sltiu => Self::sltiu,
                    RegImmOp::Xori => Self::xori,
                    RegImmOp::Ori => Self::ori,
                    RegImmOp::Andi => Self::andi,
                };
                op(self, dest, src, immediate)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let op = match op {
                    RegShiftImmOp::Slli => Self::slli,
                    RegShiftImmOp::Srli => Self::srli,
                    RegShiftImmOp::Srai => Self::srai,
                };
                op(self, dest, src, shift_amount_u5)
            }
            Instruction::Auipc { dest, immediate } => self.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => self.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let op = match op {
                    RegRegOp::Add => Self::add,
                    RegRegOp::Slt => Self::slt,
                    RegRegOp::Sltu => Self::sltu,
                    RegRegOp::And => Self::and,
                    RegRegOp::Or => Self::or,
                    RegRegOp::Xor => Self::xor,
                    RegRegOp::Sll => Self::sll,
                    RegRegOp::Srl => Self::srl,
                    RegRegOp::Sub => Self::sub,
                    RegRegOp::Sra => Self::sra,
                    RegRegOp::Mul => Self::mul,
                    RegRegOp::Mulh => Self::mulh,
                    RegRegOp::Div => Self::div,
                    RegRegOp::Divu => Self::divu,
                    RegRegOp::Rem => Self::rem,
                    RegRegOp::Remu => Self::remu,
                };
                op(self, dest, src1, src2)
            }
            Instruction::Jal { dest, offset } => self.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => self.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let op = match condition {
                    BranchCondition::Beq => Self::beq,
                    BranchCondition::Bne => Self::bne,
                    BranchCondition::Blt => Self::blt,
                    BranchCondition::Bltu => Self::bltu,
                    BranchCondition::Bge => Self::bge,
                    BranchCondition::Bgeu => Self::bgeu,
                };
                op(self, src1, src2, offset)
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let op = match width {
                    LoadWidth::Lb => Self::lb,
                    LoadWidth::Lh => Self::lh,
                    LoadWidth::Lw => Self::lw,
                    LoadWidth::Lbu => Self::lbu,
                    LoadWidth::Lhu => Self::lhu,
                };
                op(self, dest, base, offset)
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let op = match width {
                    StoreWidth::Sb => Self::sb,
                    StoreWidth::Sh => Self::sh,
                    StoreWidth::Sw => Self::sw,
                };
                op(self, src, base, offset)
            }
            Instruction::Ecall => self.ecall(),
        }
    }

    fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> Effect {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add_signed(imm))
    }

    /// > SLTI (set less than immediate) places the value 1 in register rd if
    /// > register rs1 is less than the sign-extended immediate when both are
    /// > treated as signed numbers, else 0 is written to rd.
    fn slti(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> Effect {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i32) < imm) as u32)
    }

    /// > SLTIU is similar but compares the values as unsigned numbers (i.e., the
    /// > immediate is first sign-extended to XLEN bits then treated as an
    /// > unsigned number).
    fn sltiu(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> Effect {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < imm as u32) as u32)
    }

    fn xori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> Effect {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ imm as u32)
    }

    fn ori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> Effect {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | imm as u32)
    }

    fn andi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> Effect {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & imm as u32)
    }

    fn slli(&mut self, dest: Specifier, src: Specifier, shift_amount_u5: u32) -> Effect {
        self.shift_imm_op(dest, src, shift_amount_u5, |s, sh| s << sh)
    }

    fn srli(&mut self, dest: Specifier, src: Specifier, shift_amount_u5: u32) -> Effect {
        self.shift_imm_op(dest, src, shift_amount_u5, |s, sh| s >> sh)
    }

    fn srai(&mut self, dest: Specifier, src: Specifier, shift_amount_u5: u32) -> Effect {
        self.shift_imm_op(dest, src, shift_amount_u5, |s, sh| ((s as i32) >> sh) as u32)
    }

    /// > LUI (load upper immediate) is used to build 32-bit constants. LUI
    /// > places the 32-bit U-immediate value into the destination register rd,
    /// > filling in the lowest 12 bits with zeros.
    fn lui(&mut self, dest: Specifier, immediate: i32) -> Effect {
        self.write_back(dest, immediate as u32)
    }

    /// > AUIPC (add upper immediate to pc) forms a 32-bit offset from the
    /// > U-immediate, adds this offset to the address of the AUIPC instruction,
    /// > then places the result in register rd.
    fn auipc(&mut self, dest: Specifier, immediate: i32) -> Effect {
        let value = self.registers.pc().wrapping_add(immediate as u32);
        self.write_back(dest, value)
    }

    fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a.wrapping_add(b))
    }

    fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a.wrapping_sub(b))
    }

    fn slt(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| ((a as i32) < (b as i32)) as u32)
    }

    fn sltu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| (a < b) as u32)
    }

    fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a & b)
    }

    fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a | b)
    }

    fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a ^ b)
    }

    /// > SLL, SRL, and SRA perform logical left, logical right, and arithmetic
    /// > right shifts on the value in register rs1 by the shift amount held in
    /// > the lower 5 bits of register rs2.
    fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a << (b & 0x1F))
    }

    fn srl(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a >> (b & 0x1F))
    }

    fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| ((a as i32) >> (b & 0x1F)) as u32)
    }

    /// > MUL performs an XLEN-bit × XLEN-bit multiplication of rs1 by rs2 and
    /// > places the lower XLEN bits in the destination register.
    fn mul(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| a.wrapping_mul(b))
    }

    /// MULH returns the upper 32 bits of the signed 64-bit product.
    fn mulh(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| {
            (((a as i32 as i64) * (b as i32 as i64)) >> 32) as u32
        })
    }

    /// > The quotient of division by zero has all bits set.
    ///
    /// Signed overflow (`i32::MIN / -1`) wraps to `i32::MIN`, the architectural
    /// result.
    fn div(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| match b {
            0 => u32::MAX,
            _ => (a as i32).wrapping_div(b as i32) as u32,
        })
    }

    fn divu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| match b {
            0 => u32::MAX,
            _ => a / b,
        })
    }

    /// > The remainder of division by zero equals the dividend.
    fn rem(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| match b {
            0 => a,
            _ => (a as i32).wrapping_rem(b as i32) as u32,
        })
    }

    fn remu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> Effect {
        self.reg_reg_op(dest, src1, src2, |a, b| match b {
            0 => a,
            _ => a % b,
        })
    }

    /// > JAL stores the address of the instruction following the jump (pc+4)
    /// > into register rd. ... The offset is sign-extended and added to the
    /// > address of the jump instruction to form the jump target address.
    fn jal(&mut self, dest: Specifier, offset: i32) -> Effect {
        let pc = self.registers.pc();
        *self.registers.pc_mut() = pc.wrapping_add_signed(offset);
        self.write_dest(dest, pc.wrapping_add(4))
    }

    /// > The target address is obtained by adding the sign-extended 12-bit
    /// > I-immediate to the register rs1, then setting the least-significant bit
    /// > of the result to zero.
    fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> Effect {
        let link = self.registers.pc().wrapping_add(4);
        let target = self.registers.x(base).wrapping_add_signed(offset) & !1;
        *self.registers.pc_mut() = target;
        self.write_dest(dest, link)
    }

    fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> Effect {
        self.cond_branch(src1, src2, offset, |a, b| a == b)
    }

    fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> Effect {
        self.cond_branch(src1, src2, offset, |a, b| a != b)
    }

    fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> Effect {
        self.cond_branch(src1, src2, offset, |a, b| (a as i32) < (b as i32))
    }

    fn bltu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> Effect {
        self.cond_branch(src1, src2, offset, |a, b| a < b)
    }

    fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> Effect {
        self.cond_branch(src1, src2, offset, |a, b| (a as i32) >= (b as i32))
    }

    fn bgeu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> Effect {
        self.cond_branch(src1, src2, offset, |a, b| a >= b)
    }

    /// > The LW instruction loads a 32-bit value from memory into rd. LH loads
    /// > a 16-bit value from memory, then sign-extends to 32-bits before
    /// > storing in rd. LHU loads a 16-bit value from memory but then zero
    /// > extends to 32-bits before storing in rd. LB and LBU are defined
    /// > analogously for 8-bit values.
    fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> Effect {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_byte(address) as i8 as u32
        })
    }

    fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> Effect {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_halfword(address) as i16 as u32
        })
    }

    fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> Effect {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_word(address)
        })
    }

    fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> Effect {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_byte(address) as u32
        })
    }

    fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> Effect {
        self.load_op(dest, base, offset, |memory, address| {
            memory.read_halfword(address) as u32
        })
    }

    fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> Effect {
        self.store_op(src, base, offset, |memory, address, value| {
            memory.write_byte(address, value as u8)
        })
    }

    fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> Effect {
        self.store_op(src, base, offset, |memory, address, value| {
            memory.write_halfword(address, value as u16)
        })
    }

    fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> Effect {
        self.store_op(src, base, offset, |memory, address, value| {
            memory.write_word(address, value)
        })
    }

    /// Dispatches an environment call on the selector in `a7`.
    ///
    /// Unknown selectors are ignored. The exit selectors halt the machine after
    /// this instruction retires; `a0` is reported as the exit code.
    fn ecall(&mut self) -> Effect {
        let effect = match self.registers.x(Specifier::A7) {
            syscall::GETCHAR => {
                let value = self.read_char();
                self.registers.set_x(Specifier::A0, value);
                Effect::Getchar { value }
            }
            syscall::PUTCHAR => {
                let byte = self.registers.x(Specifier::A0) as u8;
                self.write_char(byte);
                Effect::Putchar { value: byte }
            }
            syscall::EXIT | syscall::EXIT_LINUX => {
                let code = self.registers.x(Specifier::A0);
                debug!("exit requested with code {code}");
                self.state = State::Halted;
                Effect::Exit { code }
            }
            other => {
                trace!("ignoring environment call with unknown selector {other}");
                Effect::None
            }
        };
        increment_pc(&mut self.registers);
        effect
    }

    /// Reads one byte from the input stream; end of input (or a failed read)
    /// becomes the all-ones pattern, like a C `getchar` returning `EOF`.
    fn read_char(&mut self) -> u32 {
        let mut buf = [0; 1];
        match self.input.read_exact(&mut buf) {
            Ok(()) => buf[0] as u32,
            Err(err) => {
                if err.kind() != io::ErrorKind::UnexpectedEof {
                    warn!("treating failed input read as end of input: {err}");
                }
                u32::MAX
            }
        }
    }

    fn write_char(&mut self, byte: u8) {
        let result = self
            .output
            .write_all(&[byte])
            .and_then(|()| self.output.flush());
        if let Err(err) = result {
            warn!("dropping output byte after write error: {err}");
        }
    }

    fn reg_imm_op(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: impl FnOnce(u32, i32) -> u32,
    ) -> Effect {
        let result = op(self.registers.x(src), immediate);
        self.write_back(dest, result)
    }

    fn shift_imm_op(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
        op: impl FnOnce(u32, u32) -> u32,
    ) -> Effect {
        let result = op(self.registers.x(src), shift_amount_u5);
        self.write_back(dest, result)
    }

    fn reg_reg_op(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: impl FnOnce(u32, u32) -> u32,
    ) -> Effect {
        let result = op(self.registers.x(src1), self.registers.x(src2));
        self.write_back(dest, result)
    }

    fn cond_branch(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        condition: impl FnOnce(u32, u32) -> bool,
    ) -> Effect {
        if condition(self.registers.x(src1), self.registers.x(src2)) {
            let pc = self.registers.pc_mut();
            *pc = pc.wrapping_add_signed(offset);
            Effect::Taken
        } else {
            increment_pc(&mut self.registers);
            Effect::None
        }
    }

    fn load_op(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
        read: impl FnOnce(&M, u32) -> u32,
    ) -> Effect {
        let address = self.registers.x(base).wrapping_add_signed(offset);
        let value = read(&self.memory, address);
        self.write_back(dest, value)
    }

    fn store_op(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
        write: impl FnOnce(&mut M, u32, u32),
    ) -> Effect {
        let address = self.registers.x(base).wrapping_add_signed(offset);
        let value = self.registers.x(src);
        write(&mut self.memory, address, value);
        increment_pc(&mut self.registers);
        Effect::Mem { address, value }
    }

    /// Writes `value` to `dest` without touching the PC. The register file
    /// suppresses writes to `x0`; those are reported as having no effect.
    fn write_dest(&mut self, dest: Specifier, value: u32) -> Effect {
        self.registers.set_x(dest, value);
        if dest == Specifier::X0 {
            Effect::None
        } else {
            Effect::Reg { dest, value }
        }
    }

    /// Writes `value` to `dest` and advances the PC past this instruction.
    fn write_back(&mut self, dest: Specifier, value: u32) -> Effect {
        let effect = self.write_dest(dest, value);
        increment_pc(&mut self.registers);
        effect
    }
}

fn increment_pc(registers: &mut Registers) {
    let pc = registers.pc_mut();
    *pc = pc.wrapping_add(4);
}
