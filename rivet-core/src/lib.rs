#[macro_use]
extern crate static_assertions;

pub mod disassemble;
pub mod instruction;
pub mod memory;
pub mod registers;
pub mod simulator;
pub mod trace;

/// Re-export of [`disassemble`](disassemble::disassemble) for convenience.
pub use disassemble::disassemble;

/// Re-export of [`Instruction`](instruction::Instruction) for convenience.
pub use instruction::Instruction;

/// Re-export of the memory interface and its paged implementation for convenience.
pub use memory::{Memory, PagedMemory};

/// Re-export of the register file types for convenience.
pub use registers::{Registers, Specifier};

/// Re-export of the execution engine types for convenience.
pub use simulator::{RunStats, Simulator, State};

/// Re-export of the trace observer types for convenience.
pub use trace::{NoTrace, TraceSink, TraceWriter};
