use std::fmt;

use crate::vm::VmError;

/// One decoded key-check VM instruction.
///
/// Encoding: opcode byte, then register bytes and big-endian 16-bit immediates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Hlt,
    Movi { reg: u8, imm: u16 },
    Mov { dst: u8, src: u8 },
    Add { reg: u8, imm: u16 },
    Sub { reg: u8, imm: u16 },
    And { dst: u8, src: u8 },
    Or { dst: u8, src: u8 },
    Xor { dst: u8, src: u8 },
    Jmp { addr: u8 },
    Invalid(u8),
}

impl Instruction {
    /// Decodes the instruction at `pc`. Unknown opcodes decode to `Invalid`.
    pub fn decode(program: &[u8], pc: usize) -> Result<Instruction, VmError> {
        let Some(&opcode) = program.get(pc) else {
            return Err(VmError::Truncated { pc });
        };
        let operand = |i: usize| program.get(pc + i).copied().ok_or(VmError::Truncated { pc });
        let imm16 = || -> Result<u16, VmError> { Ok(u16::from_be_bytes([operand(2)?, operand(3)?])) };
        Ok(match opcode {
            0 => Instruction::Hlt,
            1 => Instruction::Movi {
                reg: operand(1)?,
                imm: imm16()?,
            },
            2 => Instruction::Mov {
                dst: operand(1)?,
                src: operand(2)?,
            },
            3 => Instruction::Add {
                reg: operand(1)?,
                imm: imm16()?,
            },
            4 => Instruction::Sub {
                reg: operand(1)?,
                imm: imm16()?,
            },
            5 => Instruction::And {
                dst: operand(1)?,
                src: operand(2)?,
            },
            6 => Instruction::Or {
                dst: operand(1)?,
                src: operand(2)?,
            },
            7 => Instruction::Xor {
                dst: operand(1)?,
                src: operand(2)?,
            },
            8 => Instruction::Jmp { addr: operand(1)? },
            other => Instruction::Invalid(other),
        })
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Instruction::Hlt | Instruction::Invalid(_) => 1,
            Instruction::Jmp { .. } => 2,
            Instruction::Mov { .. }
            | Instruction::And { .. }
            | Instruction::Or { .. }
            | Instruction::Xor { .. } => 3,
            Instruction::Movi { .. } | Instruction::Add { .. } | Instruction::Sub { .. } => 4,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Instruction::Hlt => out.push(0),
            Instruction::Movi { reg, imm } => {
                out.push(1);
                out.push(reg);
                out.extend_from_slice(&imm.to_be_bytes());
            }
            Instruction::Mov { dst, src } => out.extend_from_slice(&[2, dst, src]),
            Instruction::Add { reg, imm } => {
                out.push(3);
                out.push(reg);
                out.extend_from_slice(&imm.to_be_bytes());
            }
            Instruction::Sub { reg, imm } => {
                out.push(4);
                out.push(reg);
                out.extend_from_slice(&imm.to_be_bytes());
            }
            Instruction::And { dst, src } => out.extend_from_slice(&[5, dst, src]),
            Instruction::Or { dst, src } => out.extend_from_slice(&[6, dst, src]),
            Instruction::Xor { dst, src } => out.extend_from_slice(&[7, dst, src]),
            Instruction::Jmp { addr } => out.extend_from_slice(&[8, addr]),
            Instruction::Invalid(byte) => out.push(byte),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Hlt => write!(f, "hlt"),
            Instruction::Movi { reg, imm } => write!(f, "movi r{}, {:#06x}", reg, imm),
            Instruction::Mov { dst, src } => write!(f, "mov r{}, r{}", dst, src),
            Instruction::Add { reg, imm } => write!(f, "add r{}, {:#06x}", reg, imm),
            Instruction::Sub { reg, imm } => write!(f, "sub r{}, {:#06x}", reg, imm),
            Instruction::And { dst, src } => write!(f, "and r{}, r{}", dst, src),
            Instruction::Or { dst, src } => write!(f, "or r{}, r{}", dst, src),
            Instruction::Xor { dst, src } => write!(f, "xor r{}, r{}", dst, src),
            Instruction::Jmp { addr } => write!(f, "jmp {:#04x}", addr),
            Instruction::Invalid(byte) => write!(f, ".byte {:#04x}", byte),
        }
    }
}

pub fn assemble(instructions: &[Instruction]) -> Vec<u8> {
    let mut out = Vec::with_capacity(instructions.iter().map(Instruction::encoded_len).sum());
    for ins in instructions {
        ins.encode(&mut out);
    }
    out
}

/// Linear sweep over the whole program, returning `(offset, instruction)` pairs.
pub fn disassemble(program: &[u8]) -> Result<Vec<(usize, Instruction)>, VmError> {
    let mut pc = 0;
    let mut ret = vec![];
    while pc < program.len() {
        let ins = Instruction::decode(program, pc)?;
        ret.push((pc, ins));
        pc += ins.encoded_len();
    }
    Ok(ret)
}
