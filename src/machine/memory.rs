//! Machine memory.
//!
//! A flat space of 65536 cells addressed by a 16-bit address. A cell is
//! either empty (the reset value), a raw instruction line loaded from
//! source, or a plain integer written by an executing instruction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The number of memory cells (0x0000 - 0xFFFF).
pub const MEMORY_SIZE: usize = 65536;

/// One memory cell.
///
/// The run loop treats `Empty` and `Value(0)` as the zero sentinel: nothing
/// to execute. Only `Instruction` cells can be executed; only `Empty` and
/// `Value` cells can be read as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    /// Never written since the last reset.
    Empty,
    /// A raw instruction line stored by `load_program`.
    Instruction(String),
    /// An integer written by STR, MOV, or NULL.
    Value(i64),
}

impl Cell {
    /// True for the zero sentinel the run loop skips over.
    pub fn is_blank(&self) -> bool {
        matches!(self, Cell::Empty | Cell::Value(0))
    }

    /// Short tag name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Empty => "empty",
            Cell::Instruction(_) => "instruction",
            Cell::Value(_) => "value",
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => write!(f, "0"),
            Cell::Instruction(line) => write!(f, "{}", line),
            Cell::Value(v) => write!(f, "{}", v),
        }
    }
}

/// Machine memory: 65536 tagged cells.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Cell>,
}

impl Memory {
    /// Create a new memory with all cells empty.
    pub fn new() -> Self {
        Self {
            cells: vec![Cell::Empty; MEMORY_SIZE],
        }
    }

    /// Read the cell at `addr`.
    #[inline]
    pub fn read(&self, addr: u16) -> &Cell {
        &self.cells[addr as usize]
    }

    /// Write the cell at `addr`.
    #[inline]
    pub fn write(&mut self, addr: u16, cell: Cell) {
        self.cells[addr as usize] = cell;
    }

    /// Reset every cell to empty.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::Empty;
        }
    }

    /// Load a program: line *i* goes into cell *i*.
    ///
    /// Cells past the end of the program keep their prior contents.
    pub fn load_program(&mut self, lines: &[String]) -> Result<(), MemoryError> {
        if lines.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                size: lines.len(),
                capacity: MEMORY_SIZE,
            });
        }

        for (i, line) in lines.iter().enumerate() {
            self.cells[i] = Cell::Instruction(line.trim().to_string());
        }

        Ok(())
    }

    /// Count of cells that are not empty.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| **c != Cell::Empty).count()
    }

    /// Dump a range of cells (for the shell's memory view).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, &Cell)> {
        let end = (start as usize + count).min(MEMORY_SIZE);
        (start as usize..end)
            .map(|i| (i as u16, &self.cells[i]))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("occupied_cells", &self.occupied())
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("program size {size} exceeds memory capacity {capacity}")]
    ProgramTooLarge { size: usize, capacity: usize },
}
