//! # linevm
//!
//! A minimal virtual machine that executes line-oriented pseudo-assembly
//! against a flat 64Ki-cell memory, ten registers, and a value stack.
//!
//! The core is [`Machine`]: load a program with [`Machine::load_program`],
//! drive it with [`Machine::step`] or [`Machine::run`], and wipe it with
//! [`Machine::reset`]. Text produced by PRN and CMP goes to an
//! [`OutputSink`]; everything else observable is final machine state.

pub mod machine;
pub mod source;

// Re-export commonly used types
pub use machine::{
    decode, Cell, DecodeError, ExecError, Instruction, Machine, MachineState, Memory, MemoryError,
    OutputSink, Reg, Registers, Snapshot, StdoutSink, MEMORY_SIZE, NUM_REGISTERS,
};
pub use source::{load_source, parse_source, SourceError};
