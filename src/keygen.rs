use std::io::Write;

use crate::bitvec::{Constraint, Term};
use crate::key::{KEY_WORDS, Key};
use crate::sat::{Backend, Error};
use crate::solver::{Model, SatStatus, Solver};
use crate::symbolic;
use crate::vm::VmError;

/// The three equations every key satisfies.
pub fn key_constraints(k: &[Term; KEY_WORDS]) -> Vec<Constraint> {
    vec![
        Constraint::eq(&k[0] ^ &k[3], 0x3713u32),
        Constraint::eq(&k[0] & 0x1414u32, 0u32),
        Constraint::eq(&k[1] | &k[2], 0x7f7fu32),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error(transparent)]
    Solver(#[from] Error),
    #[error("symbolic execution failed: {0}")]
    Program(#[from] VmError),
}

/// Declares `k[0]..k[3]`, asserts the key constraints and reads keys back.
pub struct KeyGenerator {
    solver: Solver,
    last: Option<Model>,
}

impl KeyGenerator {
    /// Generator for the built-in key equations.
    pub fn new(backend: Backend) -> Result<Self, Error> {
        Self::with_constraints(backend, key_constraints)
    }

    /// Generator for the keys accepted by a check program.
    pub fn from_program(
        backend: Backend,
        program: &[u8],
        max_steps: usize,
    ) -> Result<Self, KeygenError> {
        let constraints = symbolic::constraints_for(program, max_steps)?;
        Ok(Self::with_constraints(backend, |_| constraints)?)
    }

    fn with_constraints(
        backend: Backend,
        build: impl FnOnce(&[Term; KEY_WORDS]) -> Vec<Constraint>,
    ) -> Result<Self, Error> {
        let mut solver = Solver::new(backend)?;
        let k: [Term; KEY_WORDS] = std::array::from_fn(|i| solver.declare(format!("k[{}]", i)));
        for c in build(&k) {
            solver.assert(c)?;
        }
        Ok(Self { solver, last: None })
    }

    pub fn check(&mut self) -> Result<SatStatus, Error> {
        self.last = None;
        let status = self.solver.check()?;
        if status.is_sat() {
            self.last = Some(self.solver.model()?);
        }
        Ok(status)
    }

    /// Key from the last satisfiable check.
    pub fn key(&self) -> Result<Key, Error> {
        let model = match &self.last {
            Some(m) => m,
            None => return Err(self.solver.model().err().unwrap_or(Error::NotChecked)),
        };
        let mut words = [0u32; KEY_WORDS];
        words.copy_from_slice(&model.values()[..KEY_WORDS]);
        Ok(Key::new(words))
    }

    /// Excludes the last key so the next check finds a different one.
    pub fn block_last(&mut self) -> Result<(), Error> {
        if let Some(model) = self.last.take() {
            self.solver.block_model(&model)?;
        }
        Ok(())
    }

    /// Up to `count` distinct keys; fewer if the key space runs out.
    pub fn keys(&mut self, count: usize) -> Result<Vec<Key>, Error> {
        let mut keys = vec![];
        self.extend_keys(&mut keys, count)?;
        Ok(keys)
    }

    /// Appends distinct keys until `keys` holds `count` of them or the key
    /// space runs out. A pending satisfiable check supplies the first key.
    /// Keys found before a solver error stay in `keys`.
    pub fn extend_keys(&mut self, keys: &mut Vec<Key>, count: usize) -> Result<(), Error> {
        while keys.len() < count {
            if self.last.is_none() && !self.check()?.is_sat() {
                break;
            }
            keys.push(self.key()?);
            if keys.len() < count {
                self.block_last()?;
            }
        }
        Ok(())
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }
}

/// Outcome of a keygen run, as printed on stdout.
#[derive(Debug)]
pub struct Report {
    pub status: SatStatus,
    pub backend: Backend,
    pub keys: Vec<Key>,
}

#[derive(serde::Serialize)]
struct JsonReport {
    status: SatStatus,
    backend: Backend,
    keys: Vec<String>,
}

impl Report {
    /// Writes the status line followed by one line per key, or a JSON object.
    pub fn write(&self, out: &mut impl Write, json: bool) -> std::io::Result<()> {
        if json {
            let report = JsonReport {
                status: self.status,
                backend: self.backend,
                keys: self.keys.iter().map(|k| k.to_string()).collect(),
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", self.status)?;
            for key in &self.keys {
                writeln!(out, "{}", key.to_line())?;
            }
        }
        out.flush()
    }

    /// Fails with the solver status when no key was found.
    pub fn outcome(&self) -> Result<(), Error> {
        if self.keys.is_empty() {
            return Err(Error::NoModel(self.status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{KeyChecker, check_program};
    use crate::vm::DEFAULT_MAX_STEPS;
    use itertools::Itertools;

    fn satisfies(k: &[u32; 4]) -> bool {
        k[0] ^ k[3] == 0x3713 && k[0] & 0x1414 == 0 && k[1] | k[2] == 0x7f7f
    }

    #[test]
    fn fixed_constraints_are_satisfiable_on_every_backend() {
        for backend in Backend::ALL {
            let mut generator = KeyGenerator::new(backend).unwrap();
            assert_eq!(generator.check().unwrap(), SatStatus::Satisfiable);
            let key = generator.key().unwrap();
            assert!(satisfies(key.words()), "{}: {}", backend, key);
        }
    }

    #[test]
    fn output_line_format() {
        let mut generator = KeyGenerator::new(Backend::Cadical).unwrap();
        generator.check().unwrap();
        let line = generator.key().unwrap().to_line();
        assert_eq!(line.len(), 36);
        let tokens = line.split(' ').collect_vec();
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[4], "");
        for t in &tokens[..4] {
            assert_eq!(t.len(), 8);
            assert!(t.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn key_before_check_is_an_error() {
        let generator = KeyGenerator::new(Backend::Cadical).unwrap();
        assert!(matches!(generator.key(), Err(Error::NotChecked)));
    }

    #[test]
    fn unsatisfiable_constraints_have_no_key() {
        let mut generator = KeyGenerator::with_constraints(Backend::Cadical, |k| {
            let mut cs = key_constraints(k);
            cs.push(Constraint::eq(&k[0] & 0x10u32, 0x10u32));
            cs.push(Constraint::eq(&k[3] & 0x10u32, 0x10u32));
            cs
        })
        .unwrap();
        assert_eq!(generator.check().unwrap(), SatStatus::Unsatisfiable);
        assert!(matches!(
            generator.key(),
            Err(Error::NoModel(SatStatus::Unsatisfiable))
        ));
    }

    #[test]
    fn enumerated_keys_are_distinct_and_valid() {
        let mut generator = KeyGenerator::new(Backend::Cadical).unwrap();
        let keys = generator.keys(20).unwrap();
        assert_eq!(keys.len(), 20);
        assert!(keys.iter().all_unique());
        let checker = KeyChecker::builtin();
        for key in &keys {
            assert!(satisfies(key.words()));
            assert!(checker.check(key).unwrap().correct);
        }
    }

    #[test]
    fn keys_from_the_check_program_pass_the_vm() {
        let mut generator =
            KeyGenerator::from_program(Backend::Cadical, check_program(), DEFAULT_MAX_STEPS)
                .unwrap();
        let checker = KeyChecker::builtin();
        for key in generator.keys(5).unwrap() {
            assert!(satisfies(key.words()));
            assert!(checker.check(&key).unwrap().correct);
        }
    }

    #[test]
    fn keys_for_an_arithmetic_check_program() {
        // r0 = ((k0 + 0x1234) ^ k1) - 0x10, must be zero
        let prog = [
            3, 0, 0x12, 0x34, // add r0, 0x1234
            7, 0, 1, // xor r0, r1
            4, 0, 0x00, 0x10, // sub r0, 0x10
            0,    // hlt
        ];
        let mut generator =
            KeyGenerator::from_program(Backend::Minisat, &prog, DEFAULT_MAX_STEPS).unwrap();
        assert!(generator.check().unwrap().is_sat());
        let key = generator.key().unwrap();
        let k = key.words();
        assert_eq!(k[0].wrapping_add(0x1234) ^ k[1], 0x10);
        assert!(KeyChecker::new(prog.to_vec()).check(&key).unwrap().correct);
    }

    #[test]
    fn tiny_key_space_runs_out() {
        // Pin everything but the two low bits of k[2].
        let mut generator = KeyGenerator::with_constraints(Backend::Cadical, |k| {
            vec![
                Constraint::eq(k[0].clone(), 1u32),
                Constraint::eq(k[1].clone(), 2u32),
                Constraint::eq(&k[2] | 3u32, 3u32),
                Constraint::eq(k[3].clone(), 4u32),
            ]
        })
        .unwrap();
        let keys = generator.keys(10).unwrap();
        assert_eq!(keys.len(), 4);
    }

    fn is_key_line(line: &str) -> bool {
        line.len() == 36
            && line.split(' ').take(4).all(|w| {
                w.len() == 8 && w.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
            })
            && line.ends_with(' ')
    }

    #[test]
    fn report_prints_status_then_key() {
        let mut generator = KeyGenerator::new(Backend::Cadical).unwrap();
        let status = generator.check().unwrap();
        let mut keys = vec![];
        generator.extend_keys(&mut keys, 1).unwrap();
        let report = Report {
            status,
            backend: Backend::Cadical,
            keys,
        };
        let mut out = vec![];
        report.write(&mut out, false).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines = out.lines().collect_vec();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "satisfiable");
        assert!(is_key_line(lines[1]), "{:?}", lines[1]);
        assert!(report.outcome().is_ok());
    }

    #[test]
    fn report_without_key_prints_status_and_fails() {
        let report = Report {
            status: SatStatus::Unsatisfiable,
            backend: Backend::Minisat,
            keys: vec![],
        };
        let mut out = vec![];
        report.write(&mut out, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "unsatisfiable\n");
        assert!(matches!(
            report.outcome(),
            Err(Error::NoModel(SatStatus::Unsatisfiable))
        ));
    }

    #[test]
    fn json_report_lists_keys() {
        let report = Report {
            status: SatStatus::Satisfiable,
            backend: Backend::Glucose,
            keys: vec![Key::new([0x3713, 0x7f7f, 0, 0])],
        };
        let mut out = vec![];
        report.write(&mut out, true).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["status"], "satisfiable");
        assert_eq!(v["backend"], "glucose");
        assert_eq!(v["keys"][0], "00003713 00007f7f 00000000 00000000");
    }

    #[test]
    fn single_key_adds_no_blocking_clause() {
        let mut generator = KeyGenerator::new(Backend::Kissat).unwrap();
        assert!(generator.check().unwrap().is_sat());
        let clauses = generator.solver().num_clauses();
        let mut keys = vec![];
        generator.extend_keys(&mut keys, 1).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(generator.solver().num_clauses(), clauses);
    }

    #[test]
    fn keys_found_before_a_backend_error_are_kept() {
        // Kissat cannot solve again after the first call.
        let mut generator = KeyGenerator::new(Backend::Kissat).unwrap();
        assert!(generator.check().unwrap().is_sat());
        let mut keys = vec![];
        let res = generator.extend_keys(&mut keys, 3);
        assert!(res.is_err());
        assert_eq!(keys.len(), 1);
        assert!(satisfies(keys[0].words()));
    }

    #[test]
    fn zero_keys_requested() {
        let mut generator = KeyGenerator::new(Backend::Cadical).unwrap();
        assert!(generator.keys(0).unwrap().is_empty());
    }

    #[test]
    fn keys_for_a_long_straight_line_program() {
        // movi r4, 0xfffe; then 100k x `and r0, r4`; hlt
        let mut prog = vec![1, 4, 0xff, 0xfe];
        for _ in 0..100_000 {
            prog.extend_from_slice(&[5, 0, 4]);
        }
        prog.push(0);
        let mut generator =
            KeyGenerator::from_program(Backend::Cadical, &prog, DEFAULT_MAX_STEPS).unwrap();
        let keys = generator.keys(2).unwrap();
        assert_eq!(keys.len(), 2);
        let checker = KeyChecker::new(prog);
        for key in &keys {
            assert_eq!(key.words()[0] & 0xfffe, 0);
            assert!(checker.check(key).unwrap().correct);
        }
    }
}
