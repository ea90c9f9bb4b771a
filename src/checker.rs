use once_cell::sync::Lazy;

use crate::instruction::{Instruction, assemble};
use crate::key::{KEY_WORDS, Key};
use crate::vm::{DEFAULT_MAX_STEPS, Exit, Vm, VmError};

/// Built-in check program. It leaves
/// `r0 = (k0 ^ k3 ^ 0x3713) | (k0 & 0x1414) | ((k1 | k2) ^ 0x7f7f)`,
/// which is zero exactly for the keys the generator produces.
static CHECK_PROGRAM: Lazy<Vec<u8>> = Lazy::new(|| {
    use Instruction::*;
    assemble(&[
        Mov { dst: 4, src: 0 },
        Xor { dst: 4, src: 3 },
        Movi { reg: 5, imm: 0x3713 },
        Xor { dst: 4, src: 5 },
        Movi { reg: 6, imm: 0x1414 },
        And { dst: 6, src: 0 },
        Mov { dst: 7, src: 1 },
        Or { dst: 7, src: 2 },
        Movi { reg: 8, imm: 0x7f7f },
        Xor { dst: 7, src: 8 },
        Or { dst: 4, src: 6 },
        Or { dst: 4, src: 7 },
        Mov { dst: 0, src: 4 },
        Hlt,
    ])
});

pub fn check_program() -> &'static [u8] {
    &CHECK_PROGRAM
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Verdict {
    pub correct: bool,
    pub exit: Exit,
    pub r0: u32,
    pub steps: usize,
}

/// Runs keys through a check program: the key words are loaded into
/// `r0..r3` and the key is correct iff `r0 == 0` when the program stops.
#[derive(Clone, Debug)]
pub struct KeyChecker {
    program: Vec<u8>,
    max_steps: usize,
}

impl KeyChecker {
    pub fn new(program: Vec<u8>) -> Self {
        Self {
            program,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn builtin() -> Self {
        Self::new(check_program().to_vec())
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    pub fn check(&self, key: &Key) -> Result<Verdict, VmError> {
        let mut vm = Vm::new(self.program.clone()).with_max_steps(self.max_steps);
        vm.registers_mut()[..KEY_WORDS].copy_from_slice(key.words());
        let exit = vm.run()?;
        let r0 = vm.registers()[0];
        Ok(Verdict {
            correct: r0 == 0,
            exit,
            r0,
            steps: vm.steps(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::disassemble;
    use rand::prelude::*;
    use rand_chacha::ChaCha12Rng;

    fn satisfies(k: &[u32; 4]) -> bool {
        k[0] ^ k[3] == 0x3713 && k[0] & 0x1414 == 0 && k[1] | k[2] == 0x7f7f
    }

    #[test]
    fn builtin_program_layout() {
        assert_eq!(check_program().len(), 43);
        let listing = disassemble(check_program()).unwrap();
        assert_eq!(listing.len(), 14);
        assert_eq!(listing.last().unwrap().1, Instruction::Hlt);
    }

    #[test]
    fn accepts_the_reference_key() {
        let key: Key = "0000000000007f7f0000000000003713".parse().unwrap();
        let v = KeyChecker::builtin().check(&key).unwrap();
        assert!(v.correct);
        assert_eq!(v.exit, Exit::Halted);
        assert_eq!(v.steps, 14);
    }

    #[test]
    fn rejects_the_zero_key() {
        let v = KeyChecker::builtin().check(&Key::default()).unwrap();
        assert!(!v.correct);
        assert_eq!(v.r0, 0x3713 | 0x7f7f);
    }

    #[test]
    fn agrees_with_the_constraints_on_random_keys() {
        let mut rng = ChaCha12Rng::seed_from_u64(0xC0FF_EE42);
        let checker = KeyChecker::builtin();
        for _ in 0..1000 {
            // Valid keys, half of them with one bit flipped.
            let k0 = rng.random::<u32>() & !0x1414;
            let k1 = rng.random::<u32>() & 0x7f7f;
            let k2 = 0x7f7f & !k1 | (rng.random::<u32>() & k1);
            let mut k = [k0, k1, k2, k0 ^ 0x3713];
            if rng.random_bool(0.5) {
                let i = rng.random_range(0..4);
                k[i] ^= 1u32 << rng.random_range(0..32u32);
            }
            let v = checker.check(&Key::new(k)).unwrap();
            assert_eq!(v.correct, satisfies(&k), "{:08x?}", k);
        }
    }

    #[test]
    fn custom_program_with_loop_hits_step_limit() {
        let checker = KeyChecker::new(vec![0x8, 0x0]).with_max_steps(10);
        assert_eq!(
            checker.check(&Key::default()),
            Err(VmError::StepLimit(10))
        );
    }
}
