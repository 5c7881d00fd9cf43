//! The virtual machine core.
//!
//! A line-oriented machine: 65536 memory cells holding raw instruction
//! text or integers, 10 signed registers, a value stack, and a
//! fetch-decode-execute loop over one instruction line at a time.

pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;

pub use decode::{decode, DecodeError, Instruction};
pub use execute::{ExecError, Machine, MachineState, OutputSink, Snapshot, StdoutSink};
pub use memory::{Cell, Memory, MemoryError, MEMORY_SIZE};
pub use registers::{Reg, Registers, NUM_REGISTERS};
