// Key-check virtual machine.
//
// The interpreter is generic over the register word so the same loop runs on
// concrete `u32`s (checking a key) and on bit-vector `Term`s (deriving the
// constraints a key has to satisfy).

use crate::bitvec::Term;
use crate::instruction::Instruction;

pub const NUM_REGISTERS: usize = 32;
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("truncated instruction at pc={pc:#04x}")]
    Truncated { pc: usize },
    #[error("register r{reg} out of range at pc={pc:#04x}")]
    InvalidRegister { pc: usize, reg: u8 },
    #[error("step limit of {0} exceeded")]
    StepLimit(usize),
}

/// Why execution stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Exit {
    Halted,
    InvalidInstruction(u8),
    EndOfProgram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(Exit),
}

/// Register contents the machine can compute with.
pub trait Word: Clone {
    fn imm(value: u16) -> Self;
    fn add_imm(&self, imm: u16) -> Self;
    fn sub_imm(&self, imm: u16) -> Self;
    fn and(&self, other: &Self) -> Self;
    fn or(&self, other: &Self) -> Self;
    fn xor(&self, other: &Self) -> Self;
}

impl Word for u32 {
    fn imm(value: u16) -> Self {
        value as u32
    }
    fn add_imm(&self, imm: u16) -> Self {
        self.wrapping_add(imm as u32)
    }
    fn sub_imm(&self, imm: u16) -> Self {
        self.wrapping_sub(imm as u32)
    }
    fn and(&self, other: &Self) -> Self {
        self & other
    }
    fn or(&self, other: &Self) -> Self {
        self | other
    }
    fn xor(&self, other: &Self) -> Self {
        self ^ other
    }
}

impl Word for Term {
    fn imm(value: u16) -> Self {
        Term::constant(value as u32)
    }
    fn add_imm(&self, imm: u16) -> Self {
        self + imm as u32
    }
    fn sub_imm(&self, imm: u16) -> Self {
        self - imm as u32
    }
    fn and(&self, other: &Self) -> Self {
        self & other
    }
    fn or(&self, other: &Self) -> Self {
        self | other
    }
    fn xor(&self, other: &Self) -> Self {
        self ^ other
    }
}

#[derive(Clone, Debug)]
pub struct Machine<W: Word> {
    pc: usize,
    registers: [W; NUM_REGISTERS],
    program: Vec<u8>,
    steps: usize,
    max_steps: usize,
}

/// The concrete machine.
pub type Vm = Machine<u32>;

impl<W: Word> Machine<W> {
    pub fn new(program: Vec<u8>) -> Self {
        Self {
            pc: 0,
            registers: std::array::from_fn(|_| W::imm(0)),
            program,
            steps: 0,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn registers(&self) -> &[W; NUM_REGISTERS] {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut [W; NUM_REGISTERS] {
        &mut self.registers
    }

    fn reg(&self, pc: usize, reg: u8) -> Result<usize, VmError> {
        let r = reg as usize;
        if r < NUM_REGISTERS {
            Ok(r)
        } else {
            Err(VmError::InvalidRegister { pc, reg })
        }
    }

    /// Executes one instruction.
    pub fn step(&mut self) -> Result<Step, VmError> {
        let pc = self.pc;
        if pc >= self.program.len() {
            return Ok(Step::Stop(Exit::EndOfProgram));
        }
        if self.steps >= self.max_steps {
            return Err(VmError::StepLimit(self.max_steps));
        }
        self.steps += 1;
        let ins = Instruction::decode(&self.program, pc)?;
        self.pc += ins.encoded_len();
        match ins {
            Instruction::Hlt => return Ok(Step::Stop(Exit::Halted)),
            Instruction::Invalid(byte) => return Ok(Step::Stop(Exit::InvalidInstruction(byte))),
            Instruction::Movi { reg, imm } => {
                let r = self.reg(pc, reg)?;
                self.registers[r] = W::imm(imm);
            }
            Instruction::Mov { dst, src } => {
                let (d, s) = (self.reg(pc, dst)?, self.reg(pc, src)?);
                self.registers[d] = self.registers[s].clone();
            }
            Instruction::Add { reg, imm } => {
                let r = self.reg(pc, reg)?;
                self.registers[r] = self.registers[r].add_imm(imm);
            }
            Instruction::Sub { reg, imm } => {
                let r = self.reg(pc, reg)?;
                self.registers[r] = self.registers[r].sub_imm(imm);
            }
            Instruction::And { dst, src } => {
                let (d, s) = (self.reg(pc, dst)?, self.reg(pc, src)?);
                self.registers[d] = self.registers[d].and(&self.registers[s]);
            }
            Instruction::Or { dst, src } => {
                let (d, s) = (self.reg(pc, dst)?, self.reg(pc, src)?);
                self.registers[d] = self.registers[d].or(&self.registers[s]);
            }
            Instruction::Xor { dst, src } => {
                let (d, s) = (self.reg(pc, dst)?, self.reg(pc, src)?);
                self.registers[d] = self.registers[d].xor(&self.registers[s]);
            }
            Instruction::Jmp { addr } => self.pc = addr as usize,
        }
        Ok(Step::Continue)
    }

    pub fn run(&mut self) -> Result<Exit, VmError> {
        loop {
            if let Step::Stop(exit) = self.step()? {
                return Ok(exit);
            }
        }
    }
}
