//! Instruction decoder.
//!
//! An instruction line splits on the first whitespace run into an opcode
//! token and an operand string; the operand string is re-split per opcode
//! (by whitespace, or by comma for ADD). Addresses are hexadecimal with an
//! optional `%` prefix. Register tokens are `R` followed by a single digit.

use crate::machine::registers::Reg;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// `JMP %addr` — pc := addr
    Jmp { addr: u16 },

    /// `STR` — memory[pc] := pc (marker opcode, writes at its own cell)
    Str,

    /// `PUSH` — push the current pc onto the stack
    Push,

    /// `MOV Rn addr` — registers[n] := memory[addr]
    MovReg { reg: Reg, addr: u16 },

    /// `MOV %addr` — memory[addr] := pc
    MovPc { addr: u16 },

    /// `CMP addr` — report whether memory[addr] matches the stack top
    Cmp { addr: u16 },

    /// `ADD Rn,addr` — registers[n] := registers[n] + memory[addr]
    Add { reg: Reg, addr: u16 },

    /// `NULL Rn` — registers[n] := 0
    NullReg { reg: Reg },

    /// `NULL %STCK%` — clear the stack
    NullStack,

    /// `NULL addr` — memory[addr] := 0
    NullAddr { addr: u16 },

    /// `HLT` — clear the run flag
    Hlt,

    /// `PRN {text}` — emit the literal text
    PrnText { text: String },

    /// `PRN Rn` — emit the register's value
    PrnReg { reg: Reg },

    /// `PRN addr` — emit the memory cell's value
    PrnAddr { addr: u16 },
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Jmp { addr } => write!(f, "JMP %{:04X}", addr),
            Instruction::Str => write!(f, "STR"),
            Instruction::Push => write!(f, "PUSH"),
            Instruction::MovReg { reg, addr } => write!(f, "MOV {} {:04X}", reg, addr),
            Instruction::MovPc { addr } => write!(f, "MOV %{:04X}", addr),
            Instruction::Cmp { addr } => write!(f, "CMP {:04X}", addr),
            Instruction::Add { reg, addr } => write!(f, "ADD {},{:04X}", reg, addr),
            Instruction::NullReg { reg } => write!(f, "NULL {}", reg),
            Instruction::NullStack => write!(f, "NULL %STCK%"),
            Instruction::NullAddr { addr } => write!(f, "NULL {:04X}", addr),
            Instruction::Hlt => write!(f, "HLT"),
            Instruction::PrnText { text } => write!(f, "PRN {{{}}}", text),
            Instruction::PrnReg { reg } => write!(f, "PRN {}", reg),
            Instruction::PrnAddr { addr } => write!(f, "PRN {:04X}", addr),
        }
    }
}

/// Decode one instruction line.
pub fn decode(line: &str) -> Result<Instruction, DecodeError> {
    let line = line.trim();
    let (op, rest) = match line.split_once(char::is_whitespace) {
        Some((op, rest)) => (op, rest.trim()),
        None => (line, ""),
    };

    let instr = match op {
        "JMP" => Instruction::Jmp {
            addr: parse_addr(op, first_token(op, rest)?)?,
        },

        // STR, PUSH, and HLT consume no operand.
        "STR" => Instruction::Str,
        "PUSH" => Instruction::Push,
        "HLT" => Instruction::Hlt,

        "MOV" => {
            let mut args = rest.split_whitespace();
            let first = args
                .next()
                .ok_or_else(|| malformed(op, rest))?;
            if first.starts_with('R') {
                let reg = parse_reg(op, first)?;
                let addr = parse_addr(op, args.next().ok_or_else(|| malformed(op, rest))?)?;
                Instruction::MovReg { reg, addr }
            } else {
                Instruction::MovPc {
                    addr: parse_addr(op, first)?,
                }
            }
        }

        "CMP" => Instruction::Cmp {
            addr: parse_addr(op, first_token(op, rest)?)?,
        },

        "ADD" => {
            let (reg_tok, addr_tok) = rest
                .split_once(',')
                .ok_or_else(|| malformed(op, rest))?;
            Instruction::Add {
                reg: parse_reg(op, reg_tok.trim())?,
                addr: parse_addr(op, addr_tok.trim())?,
            }
        }

        "NULL" => {
            if rest == "%STCK%" {
                Instruction::NullStack
            } else if rest.starts_with('R') {
                Instruction::NullReg {
                    reg: parse_reg(op, rest)?,
                }
            } else {
                Instruction::NullAddr {
                    addr: parse_addr(op, rest)?,
                }
            }
        }

        "PRN" => {
            if let Some(text) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
                Instruction::PrnText {
                    text: text.to_string(),
                }
            } else if rest.starts_with('R') {
                Instruction::PrnReg {
                    reg: parse_reg(op, rest)?,
                }
            } else {
                Instruction::PrnAddr {
                    addr: parse_addr(op, rest)?,
                }
            }
        }

        _ => return Err(DecodeError::UnknownOpcode(op.to_string())),
    };

    Ok(instr)
}

/// The first whitespace token of the operand string.
fn first_token<'a>(op: &str, rest: &'a str) -> Result<&'a str, DecodeError> {
    rest.split_whitespace()
        .next()
        .ok_or_else(|| malformed(op, rest))
}

/// Parse a hex address, stripping any `%` markers.
fn parse_addr(op: &str, token: &str) -> Result<u16, DecodeError> {
    let hex = token.replace('%', "");
    if hex.is_empty() {
        return Err(malformed(op, token));
    }
    u16::from_str_radix(&hex, 16).map_err(|_| malformed(op, token))
}

/// Parse a register token: `R` followed by exactly one digit.
fn parse_reg(op: &str, token: &str) -> Result<Reg, DecodeError> {
    let digit = token
        .strip_prefix('R')
        .filter(|rest| rest.len() == 1)
        .and_then(|rest| rest.chars().next())
        .and_then(|c| c.to_digit(10));

    digit
        .and_then(|d| Reg::new(d as u8))
        .ok_or_else(|| malformed(op, token))
}

fn malformed(op: &str, operand: &str) -> DecodeError {
    DecodeError::MalformedOperand {
        opcode: op.to_string(),
        operand: operand.to_string(),
    }
}

/// Errors that can occur while decoding an instruction line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode: {0:?}")]
    UnknownOpcode(String),

    #[error("malformed operand for {opcode}: {operand:?}")]
    MalformedOperand { opcode: String, operand: String },
}
