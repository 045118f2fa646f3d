//! General purpose registers and the program counter.

use core::fmt;
use std::fmt::Formatter;

/// The number of `x` registers available (indices start at `0` for `x0`).
pub const LEN: u8 = 32;

/// A RISC-V core's general purpose registers.
///
/// There are 32 `x` word-size (32 bit) registers, named `x0` up to `x31`, and the
/// `pc` register holding the Program Counter (also 32 bits).
///
/// > Register x0 is hardwired with all bits equal to 0. General purpose registers
/// > x1–x31 hold values that various instructions interpret as a collection of
/// > Boolean values, or as two's complement signed binary integers or unsigned
/// > binary integers.
///
/// It is not possible to get a mutable reference to an `x` register, since that
/// would allow unchecked writes to register `x0`. All writes go through
/// [`set_x`](Registers::set_x), the single place where the `x0` invariant is
/// enforced.
#[derive(Debug, Clone)]
pub struct Registers {
    x_registers: [u32; LEN as usize],
    pc: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Registers {
    /// Returns a fresh set of all-zero registers with `pc` set to `initial_pc`.
    pub fn new(initial_pc: u32) -> Self {
        Self {
            x_registers: [0; LEN as usize],
            pc: initial_pc,
        }
    }

    /// Returns the value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> u32 {
        self.x_registers[usize::from(specifier)]
    }

    /// Sets the value of an `x` register.
    ///
    /// Writes to register `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: u32) {
        if specifier.0 != 0 {
            self.x_registers[specifier.0 as usize] = value;
        }
    }

    /// Returns the value of the `pc` register.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Returns a mutable reference to the `pc` register value.
    pub fn pc_mut(&mut self) -> &mut u32 {
        &mut self.pc
    }
}

/// An `x` register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. register `zero`, always returns `0` on read, and ignores any writes.
    pub const X0: Self = Specifier(0);

    /// Register `x10`, a.k.a. register `a0`: first argument and return value of an
    /// environment call.
    pub const A0: Self = Specifier(10);

    /// Register `x17`, a.k.a. register `a7`: environment call selector.
    pub const A7: Self = Specifier(17);

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit in 5 bits (`0..=31`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
