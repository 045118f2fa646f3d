//! Execution tracing.
//!
//! The engine reports every retired instruction to a [`TraceSink`], in retirement
//! order. Tracing is purely advisory: a sink observes the architectural effects but
//! can never alter them, and with the sink disabled the engine skips record assembly
//! (including disassembly) entirely.

use crate::registers::Specifier;
use log::warn;
use std::io::{self, Write};

/// The architecturally visible side effect of one retired instruction, beyond the
/// program counter update.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Nothing was written and no branch was taken.
    None,
    /// A register write: `dest <- value`. Suppressed writes to `x0` are reported
    /// as [`Effect::None`].
    Reg { dest: Specifier, value: u32 },
    /// A memory write. `value` is the full source register value, before
    /// truncation to the store width.
    Mem { address: u32, value: u32 },
    /// A branch whose condition held.
    Taken,
    /// A getchar environment call; `value` is what landed in `a0`
    /// (`0xffff_ffff` at end of input).
    Getchar { value: u32 },
    /// A putchar environment call; `value` is the byte written.
    Putchar { value: u8 },
    /// An exit environment call; `code` is the value of `a0` at the call.
    Exit { code: u32 },
}

/// One retired instruction, as delivered to a [`TraceSink`].
#[derive(Debug, Copy, Clone)]
pub struct TraceRecord<'a> {
    /// Number of instructions retired before this one.
    pub retired: u64,
    /// Address the instruction was fetched from.
    pub pc: u32,
    /// The raw instruction word.
    pub word: u32,
    /// Disassembled text, `"unknown"` for unsupported words.
    pub text: &'a str,
    /// What the instruction changed.
    pub effect: Effect,
}

/// Observer for retired instructions.
pub trait TraceSink {
    /// Returns whether records should be assembled and delivered at all.
    ///
    /// When this returns `false` the engine does not disassemble and does not call
    /// [`record`](Self::record); execution behaves identically either way.
    fn enabled(&self) -> bool {
        true
    }

    /// Called once per retired instruction, in retirement order.
    fn record(&mut self, record: &TraceRecord<'_>);
}

/// The disabled sink: reports nothing, costs nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoTrace;

impl TraceSink for NoTrace {
    fn enabled(&self) -> bool {
        false
    }

    fn record(&mut self, _record: &TraceRecord<'_>) {}
}

/// Renders each record as one fixed-column text line:
///
/// ```text
///      3     10074 : fe512e23  sw x5, -4(x2)           M[10070] <- 2a
/// ```
///
/// The columns are the retired count, the PC, the raw word, the disassembly, and
/// the side-effect annotation (`M[addr] <- val`, `{T}`, `R[rd] <- val`,
/// `{getchar val}`, `{putchar val}`, `{exit code}`).
///
/// A write error disables the writer for the rest of the run (reported once via
/// `warn!`): [`enabled`](TraceSink::enabled) turns false, so the engine also
/// stops assembling records. Execution itself is never disturbed by trace
/// output failing.
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    out: W,
    failed: bool,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, failed: false }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_record(&mut self, record: &TraceRecord<'_>) -> io::Result<()> {
        write!(
            self.out,
            "{:6}     {:05x} : {:08x}  {:<20}",
            record.retired, record.pc, record.word, record.text
        )?;
        match record.effect {
            Effect::None => {}
            Effect::Reg { dest, value } => {
                write!(self.out, "R[{:2}] <- {:x}", u8::from(dest), value)?
            }
            Effect::Mem { address, value } => {
                write!(self.out, "    M[{:x}] <- {:x}", address, value)?
            }
            Effect::Taken => write!(self.out, "    {{T}}")?,
            Effect::Getchar { value } => write!(self.out, "    {{getchar {:x}}}", value)?,
            Effect::Putchar { value } => write!(self.out, "    {{putchar {:x}}}", value)?,
            Effect::Exit { code } => write!(self.out, "    {{exit {}}}", code)?,
        }
        writeln!(self.out)
    }
}

impl<W: Write> TraceSink for TraceWriter<W> {
    fn enabled(&self) -> bool {
        !self.failed
    }

    fn record(&mut self, record: &TraceRecord<'_>) {
        if self.failed {
            return;
        }
        if let Err(err) = self.write_record(record) {
            warn!("stopping trace output after write error: {err}");
            self.failed = true;
        }
    }
}
