//! Machine registers.
//!
//! The machine has 10 general-purpose signed registers R0..R9 and a
//! program counter. The program counter is wider than a memory address so
//! it can sit one past the last cell after a fall-through run.

use crate::machine::memory::MEMORY_SIZE;
use serde::{Deserialize, Serialize};

/// The number of general-purpose registers.
pub const NUM_REGISTERS: usize = 10;

/// A validated register index (R0..R9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    /// Create a register index. Returns `None` outside 0..=9.
    pub fn new(index: u8) -> Option<Self> {
        if (index as usize) < NUM_REGISTERS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The index as a usize, always in 0..10.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// The register file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Registers {
    /// R0..R9, all zero at reset.
    r: [i64; NUM_REGISTERS],

    /// Program counter: address of the next cell to fetch.
    pub pc: u32,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self {
            r: [0; NUM_REGISTERS],
            pc: 0,
        }
    }

    /// Reset all registers and the program counter to zero.
    pub fn reset(&mut self) {
        self.r = [0; NUM_REGISTERS];
        self.pc = 0;
    }

    /// Read a register.
    pub fn get(&self, reg: Reg) -> i64 {
        self.r[reg.index()]
    }

    /// Write a register.
    pub fn set(&mut self, reg: Reg, value: i64) {
        self.r[reg.index()] = value;
    }

    /// All register values, R0 first.
    pub fn values(&self) -> [i64; NUM_REGISTERS] {
        self.r
    }

    /// Increment the program counter by 1. Returns the old value.
    pub fn advance_pc(&mut self) -> u32 {
        let old = self.pc;
        self.pc += 1;
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr as u32;
    }

    /// True while the program counter still addresses a memory cell.
    pub fn pc_in_bounds(&self) -> bool {
        (self.pc as usize) < MEMORY_SIZE
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
