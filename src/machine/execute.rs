//! Machine execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::machine::decode::{self, DecodeError, Instruction};
use crate::machine::memory::{Cell, Memory, MemoryError};
use crate::machine::registers::{Registers, NUM_REGISTERS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// The run flag is set.
    Running,
    /// A HLT instruction cleared the run flag.
    Halted,
}

/// Sink for the text lines produced by PRN and CMP.
///
/// The only externally visible result of execution besides final machine
/// state goes through this trait.
pub trait OutputSink {
    fn emit(&mut self, line: &str);
}

/// Collects emitted lines, mainly for tests.
impl OutputSink for Vec<String> {
    fn emit(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Writes each emitted line to stdout.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// The virtual machine.
///
/// Owns all mutable state: memory, registers, the stack, and the run flag.
#[derive(Clone)]
pub struct Machine {
    /// Register file (R0..R9 and the program counter).
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Value stack. Grows without bound; only PUSH appends and
    /// `NULL %STCK%` clears. No pop opcode exists.
    pub stack: Vec<i64>,
    /// Current execution state.
    pub state: MachineState,
    /// Count of instructions executed (sentinel skips excluded).
    pub cycles: u64,
    /// Last executed instruction (for tracing).
    last_instr: Option<Instruction>,
}

/// A serializable summary of machine state, for `--json` output and the
/// shell's `state` command.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: MachineState,
    pub cycles: u64,
    pub pc: u32,
    pub registers: [i64; NUM_REGISTERS],
    pub stack: Vec<i64>,
    pub occupied_cells: usize,
    pub last_instruction: Option<String>,
}

impl Machine {
    /// Create a new machine with zeroed state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            stack: Vec::new(),
            state: MachineState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Reset the machine to initial state: pc 0, registers and memory
    /// zeroed, stack empty, run flag set. Discards any loaded program.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.stack.clear();
        self.state = MachineState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Load a program: line *i* lands in memory cell *i*.
    pub fn load_program(&mut self, lines: &[String]) -> Result<(), MemoryError> {
        self.mem.load_program(lines)
    }

    /// Fetch the cell at the current pc, then increment the pc.
    ///
    /// Cells past the loaded region come back as `Cell::Empty`. A pc past
    /// the end of memory is an error.
    pub fn fetch(&mut self) -> Result<Cell, ExecError> {
        let addr: u16 = self
            .regs
            .pc
            .try_into()
            .map_err(|_| ExecError::PcOutOfRange(self.regs.pc))?;
        let cell = self.mem.read(addr).clone();
        self.regs.advance_pc();
        Ok(cell)
    }

    /// Fetch and execute one cell.
    ///
    /// Returns the executed instruction, or `None` when the cell was the
    /// zero sentinel and was skipped.
    pub fn step(&mut self, out: &mut dyn OutputSink) -> Result<Option<Instruction>, ExecError> {
        if self.state != MachineState::Running {
            return Err(ExecError::NotRunning(self.state));
        }

        let fetch_addr = self.regs.pc;
        let cell = self.fetch()?;
        match cell {
            // The zero sentinel: an empty or zeroed cell is nothing to
            // execute, not an error.
            Cell::Empty | Cell::Value(0) => Ok(None),

            Cell::Value(_) => Err(ExecError::UnexpectedCell {
                addr: fetch_addr as u16,
                expected: "instruction",
                found: cell.kind(),
            }),

            Cell::Instruction(line) => {
                let instr = decode::decode(&line)?;
                self.execute(&instr, out)?;
                self.cycles += 1;
                self.last_instr = Some(instr.clone());
                Ok(Some(instr))
            }
        }
    }

    /// Decode and execute one raw instruction line.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn OutputSink) -> Result<(), ExecError> {
        let instr = decode::decode(line)?;
        self.execute(&instr, out)
    }

    /// Apply one decoded instruction.
    pub fn execute(&mut self, instr: &Instruction, out: &mut dyn OutputSink) -> Result<(), ExecError> {
        match instr {
            Instruction::Jmp { addr } => {
                self.regs.jump(*addr);
            }

            // Stores the current pc at its own cell. The pc has already
            // been advanced past the STR cell by fetch, matching the
            // marker semantics.
            Instruction::Str => {
                let addr = self.pc_as_addr()?;
                self.mem.write(addr, Cell::Value(addr as i64));
            }

            // Pushes the current pc, not a data value.
            Instruction::Push => {
                self.stack.push(self.regs.pc as i64);
            }

            Instruction::MovReg { reg, addr } => {
                let value = self.read_value(*addr)?;
                self.regs.set(*reg, value);
            }

            Instruction::MovPc { addr } => {
                self.mem.write(*addr, Cell::Value(self.regs.pc as i64));
            }

            // Reports a match, mutates nothing, never branches.
            Instruction::Cmp { addr } => {
                let top = *self.stack.last().ok_or(ExecError::EmptyStackAccess)?;
                if self.cell_matches(*addr, top) {
                    out.emit(&format!("Memory {:04X} matches stack.", addr));
                }
            }

            Instruction::Add { reg, addr } => {
                let value = self.read_value(*addr)?;
                self.regs.set(*reg, self.regs.get(*reg) + value);
            }

            Instruction::NullReg { reg } => {
                self.regs.set(*reg, 0);
            }

            Instruction::NullStack => {
                self.stack.clear();
            }

            Instruction::NullAddr { addr } => {
                self.mem.write(*addr, Cell::Value(0));
            }

            Instruction::Hlt => {
                self.state = MachineState::Halted;
            }

            Instruction::PrnText { text } => {
                out.emit(text);
            }

            Instruction::PrnReg { reg } => {
                out.emit(&format!("{}: {}", reg, self.regs.get(*reg)));
            }

            Instruction::PrnAddr { addr } => {
                out.emit(&format!("Memory[{:04X}]: {}", addr, self.mem.read(*addr)));
            }
        }

        Ok(())
    }

    /// Run until halt, error, or the pc walks off the end of memory.
    ///
    /// Zero-sentinel cells are skipped, so a program without HLT coasts to
    /// the end of unused memory and stops there. Returns the number of
    /// instructions executed.
    pub fn run(&mut self, out: &mut dyn OutputSink) -> Result<u64, ExecError> {
        let start_cycles = self.cycles;

        while self.state == MachineState::Running && self.regs.pc_in_bounds() {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` executed instructions.
    pub fn run_limited(&mut self, max_cycles: u64, out: &mut dyn OutputSink) -> Result<u64, ExecError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == MachineState::Running && self.regs.pc_in_bounds() && self.cycles < limit
        {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Read a memory cell as a number. Empty cells read as 0; instruction
    /// cells are not numbers and fail.
    fn read_value(&self, addr: u16) -> Result<i64, ExecError> {
        match self.mem.read(addr) {
            Cell::Empty => Ok(0),
            Cell::Value(v) => Ok(*v),
            cell @ Cell::Instruction(_) => Err(ExecError::UnexpectedCell {
                addr,
                expected: "value",
                found: cell.kind(),
            }),
        }
    }

    /// Whether the cell at `addr` compares equal to a stack value.
    /// Instruction cells never match a number.
    fn cell_matches(&self, addr: u16, value: i64) -> bool {
        match self.mem.read(addr) {
            Cell::Empty => value == 0,
            Cell::Value(v) => *v == value,
            Cell::Instruction(_) => false,
        }
    }

    /// The current pc as a memory address, for opcodes that write at pc.
    fn pc_as_addr(&self) -> Result<u16, ExecError> {
        self.regs
            .pc
            .try_into()
            .map_err(|_| ExecError::PcOutOfRange(self.regs.pc))
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.last_instr.as_ref()
    }

    /// Check if the machine has halted.
    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    /// Check if the run flag is still set.
    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    /// A serializable summary of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            cycles: self.cycles,
            pc: self.regs.pc,
            registers: self.regs.values(),
            stack: self.stack.clone(),
            occupied_cells: self.mem.occupied(),
            last_instruction: self.last_instr.as_ref().map(|i| i.to_string()),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("pc", &self.regs.pc)
            .field("stack_depth", &self.stack.len())
            .finish()
    }
}

/// Errors that can occur during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("stack is empty")]
    EmptyStackAccess,

    #[error("unexpected {found} cell at {addr:04X}, expected {expected}")]
    UnexpectedCell {
        addr: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("program counter {0:#06X} outside memory")]
    PcOutOfRange(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::memory::MEMORY_SIZE;
    use crate::machine::registers::Reg;

    fn lines(program: &[&str]) -> Vec<String> {
        program.iter().map(|s| s.to_string()).collect()
    }

    fn loaded(program: &[&str]) -> Machine {
        let mut m = Machine::new();
        m.load_program(&lines(program)).unwrap();
        m
    }

    #[test]
    fn test_halt() {
        let mut m = loaded(&["HLT"]);
        let mut out = Vec::new();

        let executed = m.run(&mut out).unwrap();

        assert_eq!(executed, 1);
        assert!(m.is_halted());
        assert_eq!(m.regs.pc, 1);
    }

    #[test]
    fn test_jmp_sets_pc_exactly() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.regs.pc = 0x0500;

        m.execute_line("JMP %0010", &mut out).unwrap();

        assert_eq!(m.regs.pc, 0x10);
    }

    #[test]
    fn test_str_marks_own_cell() {
        let mut m = loaded(&["STR", "HLT"]);
        let mut out = Vec::new();

        let err = m.run(&mut out).unwrap_err();

        // STR writes the post-fetch pc (1) at cell 1, clobbering HLT with
        // a nonzero value cell, which the run loop then refuses to execute.
        assert_eq!(*m.mem.read(1), Cell::Value(1));
        assert_eq!(
            err,
            ExecError::UnexpectedCell {
                addr: 1,
                expected: "instruction",
                found: "value",
            }
        );
        assert_eq!(m.cycles, 1);
    }

    #[test]
    fn test_push_stores_pc() {
        let mut m = loaded(&["PUSH", "PUSH", "HLT"]);
        let mut out = Vec::new();

        m.run(&mut out).unwrap();

        assert_eq!(m.stack, vec![1, 2]);
    }

    #[test]
    fn test_mov_reg_reads_memory() {
        let mut m = loaded(&["MOV R3 0020", "HLT"]);
        m.mem.write(0x20, Cell::Value(7));
        let mut out = Vec::new();

        m.run(&mut out).unwrap();

        assert_eq!(m.regs.get(Reg::new(3).unwrap()), 7);
    }

    #[test]
    fn test_mov_reg_from_empty_cell_reads_zero() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.regs.set(Reg::new(1).unwrap(), 99);

        m.execute_line("MOV R1 0040", &mut out).unwrap();

        assert_eq!(m.regs.get(Reg::new(1).unwrap()), 0);
    }

    #[test]
    fn test_mov_reg_from_instruction_cell_fails() {
        let mut m = loaded(&["MOV R1 0000"]);
        let mut out = Vec::new();

        let err = m.run(&mut out).unwrap_err();

        assert_eq!(
            err,
            ExecError::UnexpectedCell {
                addr: 0,
                expected: "value",
                found: "instruction",
            }
        );
    }

    #[test]
    fn test_mov_pc_stores_pc_at_addr() {
        let mut m = loaded(&["MOV %0030", "HLT"]);
        let mut out = Vec::new();

        m.run(&mut out).unwrap();

        // pc was 1 when the MOV at cell 0 executed.
        assert_eq!(*m.mem.read(0x30), Cell::Value(1));
    }

    #[test]
    fn test_add_accumulates() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.mem.write(5, Cell::Value(3));
        let r2 = Reg::new(2).unwrap();

        m.execute_line("ADD R2,0005", &mut out).unwrap();
        assert_eq!(m.regs.get(r2), 3);

        m.execute_line("ADD R2,0005", &mut out).unwrap();
        assert_eq!(m.regs.get(r2), 6);
    }

    #[test]
    fn test_null_forms() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        let r4 = Reg::new(4).unwrap();
        m.regs.set(r4, 9);
        m.mem.write(0xA0, Cell::Value(5));
        m.stack.extend([1, 2, 3]);

        m.execute_line("NULL R4", &mut out).unwrap();
        assert_eq!(m.regs.get(r4), 0);

        m.execute_line("NULL 00A0", &mut out).unwrap();
        assert_eq!(*m.mem.read(0xA0), Cell::Value(0));

        m.execute_line("NULL %STCK%", &mut out).unwrap();
        assert!(m.stack.is_empty());
    }

    #[test]
    fn test_null_stack_after_pushes() {
        let mut m = loaded(&["PUSH", "PUSH", "PUSH", "NULL %STCK%", "HLT"]);
        let mut out = Vec::new();

        m.run(&mut out).unwrap();

        assert!(m.stack.is_empty());
    }

    #[test]
    fn test_cmp_empty_stack_fails() {
        let mut m = Machine::new();
        let mut out = Vec::new();

        let err = m.execute_line("CMP 0005", &mut out).unwrap_err();

        assert_eq!(err, ExecError::EmptyStackAccess);
    }

    #[test]
    fn test_cmp_reports_match() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.mem.write(0x05, Cell::Value(2));
        m.stack.push(2);

        m.execute_line("CMP 0005", &mut out).unwrap();

        assert_eq!(out, vec!["Memory 0005 matches stack."]);
    }

    #[test]
    fn test_cmp_no_match_is_silent() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.mem.write(0x05, Cell::Value(2));
        m.stack.push(3);

        m.execute_line("CMP 0005", &mut out).unwrap();

        assert!(out.is_empty());
        // CMP never branches or mutates.
        assert_eq!(m.stack, vec![3]);
    }

    #[test]
    fn test_prn_forms() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.regs.set(Reg::new(1).unwrap(), -5);
        m.mem.write(0x42, Cell::Value(12));

        m.execute_line("PRN {hello}", &mut out).unwrap();
        m.execute_line("PRN R1", &mut out).unwrap();
        m.execute_line("PRN 0042", &mut out).unwrap();
        m.execute_line("PRN 0043", &mut out).unwrap();

        assert_eq!(
            out,
            vec!["hello", "R1: -5", "Memory[0042]: 12", "Memory[0043]: 0"]
        );
    }

    #[test]
    fn test_fall_through_termination() {
        let mut m = loaded(&["PUSH", "PUSH", "PUSH"]);
        let mut out = Vec::new();

        let executed = m.run(&mut out).unwrap();

        assert_eq!(executed, 3);
        assert!(m.is_running());
        assert_eq!(m.regs.pc as usize, MEMORY_SIZE);
    }

    #[test]
    fn test_run_skips_zeroed_cells() {
        let mut m = loaded(&["NULL 0001", "PUSH", "HLT"]);
        let mut out = Vec::new();

        let executed = m.run(&mut out).unwrap();

        // NULL zeroes cell 1, so the PUSH there becomes a sentinel skip.
        assert_eq!(executed, 2);
        assert!(m.stack.is_empty());
        assert!(m.is_halted());
    }

    #[test]
    fn test_run_rejects_nonzero_value_cell() {
        let mut m = Machine::new();
        let mut out = Vec::new();
        m.mem.write(0, Cell::Value(7));

        let err = m.run(&mut out).unwrap_err();

        assert_eq!(
            err,
            ExecError::UnexpectedCell {
                addr: 0,
                expected: "instruction",
                found: "value",
            }
        );
    }

    #[test]
    fn test_run_surfaces_unknown_opcode() {
        let mut m = loaded(&["FROB 1"]);
        let mut out = Vec::new();

        let err = m.run(&mut out).unwrap_err();

        assert_eq!(err, ExecError::Decode(DecodeError::UnknownOpcode("FROB".into())));
    }

    #[test]
    fn test_step_after_halt_fails() {
        let mut m = loaded(&["HLT"]);
        let mut out = Vec::new();
        m.run(&mut out).unwrap();

        let err = m.step(&mut out).unwrap_err();

        assert_eq!(err, ExecError::NotRunning(MachineState::Halted));
    }

    #[test]
    fn test_run_limited_stops_at_budget() {
        let mut m = loaded(&["JMP %0000"]);
        let mut out = Vec::new();

        let executed = m.run_limited(10, &mut out).unwrap();

        assert_eq!(executed, 10);
        assert!(m.is_running());
    }

    #[test]
    fn test_reset_restores_pristine_state() {
        let mut m = loaded(&["PUSH", "MOV R2 0050", "HLT"]);
        let mut out = Vec::new();
        m.run(&mut out).unwrap();

        m.reset();

        assert_eq!(m.regs.values(), [0; NUM_REGISTERS]);
        assert_eq!(m.regs.pc, 0);
        assert!(m.stack.is_empty());
        assert!(m.is_running());
        assert_eq!(m.cycles, 0);
        assert_eq!(m.mem.occupied(), 0);
    }

    #[test]
    fn test_add_accumulates_via_run() {
        // Linear accumulation: three ADDs from the same cell.
        let mut m = loaded(&["ADD R0,0010", "ADD R0,0010", "ADD R0,0010", "HLT"]);
        m.mem.write(0x10, Cell::Value(1));
        let mut out = Vec::new();

        m.run(&mut out).unwrap();

        assert_eq!(m.regs.get(Reg::new(0).unwrap()), 3);
        assert!(m.is_halted());
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut m = loaded(&["PUSH", "HLT"]);
        let mut out = Vec::new();
        m.run(&mut out).unwrap();

        let snap = m.snapshot();

        assert_eq!(snap.state, MachineState::Halted);
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.stack, vec![1]);
        assert_eq!(snap.last_instruction.as_deref(), Some("HLT"));
    }
}
