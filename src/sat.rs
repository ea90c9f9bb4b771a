// ----------------------------- SAT backends ------------------------------
//
// Literals are DIMACS/IPASIR style `i32`s throughout: variable `v` is `v`,
// its negation is `-v`. The rustsat-based backends convert at the boundary.

use std::fmt;
use std::str::FromStr;

use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::{Lit, TernaryVal};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown SAT backend: {0} (expected cadical, kissat, minisat or glucose)")]
    UnknownBackend(String),
    #[error("SAT backend failure: {0}")]
    Backend(String),
    #[error("model requested before the satisfiability check")]
    NotChecked,
    #[error("no model available (solver reported {0})")]
    NoModel(crate::solver::SatStatus),
    #[error("variable k[{0}] is not declared")]
    UndeclaredVariable(usize),
    #[error("solver model violates {0}")]
    ModelMismatch(String),
}

pub trait SatBackend {
    fn add_clause(&mut self, lits: &[i32]) -> Result<(), Error>;
    /// `Some(true)` for SAT, `Some(false)` for UNSAT, `None` when the solver gave up.
    fn solve(&mut self) -> Result<Option<bool>, Error>;
    /// Value of `lit` in the last model, `None` if unassigned.
    fn value(&self, lit: i32) -> Option<bool>;
}

pub struct Cadical {
    sat: cadical::Solver,
}

impl Cadical {
    pub fn new() -> Result<Self, Error> {
        let sat = cadical::Solver::with_config("sat")
            .map_err(|e| Error::Backend(format!("cadical: {:?}", e)))?;
        Ok(Self { sat })
    }
}

impl SatBackend for Cadical {
    fn add_clause(&mut self, lits: &[i32]) -> Result<(), Error> {
        self.sat.add_clause(lits.iter().copied());
        Ok(())
    }

    fn solve(&mut self) -> Result<Option<bool>, Error> {
        Ok(self.sat.solve())
    }

    fn value(&self, lit: i32) -> Option<bool> {
        self.sat.value(lit)
    }
}

/// Any solver implementing rustsat's `Solve` (kissat, minisat, glucose).
pub struct RustSat<S> {
    name: &'static str,
    solver: S,
}

impl<S: Solve> RustSat<S> {
    pub fn new(name: &'static str, solver: S) -> Self {
        Self { name, solver }
    }
}

#[inline]
fn to_lit(lit: i32) -> Lit {
    debug_assert!(lit != 0);
    let idx = lit.unsigned_abs() - 1;
    if lit > 0 {
        Lit::positive(idx)
    } else {
        Lit::negative(idx)
    }
}

impl<S: Solve> SatBackend for RustSat<S> {
    fn add_clause(&mut self, lits: &[i32]) -> Result<(), Error> {
        let c: Vec<Lit> = lits.iter().map(|&l| to_lit(l)).collect();
        self.solver
            .add_clause(c.as_slice().into())
            .map_err(|e| Error::Backend(format!("{}: {}", self.name, e)))
    }

    fn solve(&mut self) -> Result<Option<bool>, Error> {
        let res = self
            .solver
            .solve()
            .map_err(|e| Error::Backend(format!("{}: {}", self.name, e)))?;
        Ok(match res {
            SolverResult::Sat => Some(true),
            SolverResult::Unsat => Some(false),
            SolverResult::Interrupted => None,
        })
    }

    fn value(&self, lit: i32) -> Option<bool> {
        match self.solver.lit_val(to_lit(lit)).ok()? {
            TernaryVal::True => Some(true),
            TernaryVal::False => Some(false),
            TernaryVal::DontCare => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cadical,
    Kissat,
    Minisat,
    Glucose,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Cadical,
        Backend::Kissat,
        Backend::Minisat,
        Backend::Glucose,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Cadical => "cadical",
            Backend::Kissat => "kissat",
            Backend::Minisat => "minisat",
            Backend::Glucose => "glucose",
        }
    }

    pub fn create(self) -> Result<Box<dyn SatBackend>, Error> {
        Ok(match self {
            Backend::Cadical => Box::new(Cadical::new()?),
            Backend::Kissat => Box::new(RustSat::new(
                self.name(),
                rustsat_kissat::Kissat::default(),
            )),
            Backend::Minisat => Box::new(RustSat::new(
                self.name(),
                rustsat_minisat::core::Minisat::default(),
            )),
            Backend::Glucose => Box::new(RustSat::new(
                self.name(),
                rustsat_glucose::core::Glucose::default(),
            )),
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Backend::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownBackend(s.to_owned()))
    }
}

// ------------------------------ CNF builder ------------------------------

/// Clause sink with a variable counter and Tseitin gates.
///
/// Gates fold constants: `top` is a literal fixed to true by a unit clause, and
/// any gate whose output is determined by constant or repeated inputs returns
/// an existing literal instead of allocating a new variable.
pub struct Cnf {
    sat: Box<dyn SatBackend>,
    num_vars: i32,
    num_clauses: usize,
    top: i32,
}

impl Cnf {
    pub fn new(sat: Box<dyn SatBackend>) -> Result<Self, Error> {
        let mut cnf = Self {
            sat,
            num_vars: 0,
            num_clauses: 0,
            top: 0,
        };
        let top = cnf.var();
        cnf.top = top;
        cnf.clause(&[top])?;
        Ok(cnf)
    }

    #[inline]
    pub fn var(&mut self) -> i32 {
        self.num_vars += 1;
        self.num_vars
    }

    #[inline]
    pub fn clause(&mut self, lits: &[i32]) -> Result<(), Error> {
        self.num_clauses += 1;
        self.sat.add_clause(lits)
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars as usize
    }

    pub fn num_clauses(&self) -> usize {
        self.num_clauses
    }

    #[inline]
    pub fn constant(&self, b: bool) -> i32 {
        if b { self.top } else { -self.top }
    }

    #[inline]
    fn as_const(&self, lit: i32) -> Option<bool> {
        if lit == self.top {
            Some(true)
        } else if lit == -self.top {
            Some(false)
        } else {
            None
        }
    }

    pub fn and(&mut self, a: i32, b: i32) -> Result<i32, Error> {
        match (self.as_const(a), self.as_const(b)) {
            (Some(false), _) | (_, Some(false)) => return Ok(self.constant(false)),
            (Some(true), _) => return Ok(b),
            (_, Some(true)) => return Ok(a),
            _ => {}
        }
        if a == b {
            return Ok(a);
        }
        if a == -b {
            return Ok(self.constant(false));
        }
        let c = self.var();
        self.clause(&[-c, a])?;
        self.clause(&[-c, b])?;
        self.clause(&[c, -a, -b])?;
        Ok(c)
    }

    pub fn or(&mut self, a: i32, b: i32) -> Result<i32, Error> {
        Ok(-self.and(-a, -b)?)
    }

    pub fn xor(&mut self, a: i32, b: i32) -> Result<i32, Error> {
        match (self.as_const(a), self.as_const(b)) {
            (Some(x), _) => return Ok(if x { -b } else { b }),
            (_, Some(y)) => return Ok(if y { -a } else { a }),
            _ => {}
        }
        if a == b {
            return Ok(self.constant(false));
        }
        if a == -b {
            return Ok(self.constant(true));
        }
        let c = self.var();
        self.clause(&[-c, a, b])?;
        self.clause(&[-c, -a, -b])?;
        self.clause(&[c, -a, b])?;
        self.clause(&[c, a, -b])?;
        Ok(c)
    }

    /// Returns `(sum, carry)` of `a + b + cin`.
    pub fn full_adder(&mut self, a: i32, b: i32, cin: i32) -> Result<(i32, i32), Error> {
        let ab = self.xor(a, b)?;
        let sum = self.xor(ab, cin)?;
        let g = self.and(a, b)?;
        let p = self.and(ab, cin)?;
        let carry = self.or(g, p)?;
        Ok((sum, carry))
    }

    /// Forces `a <-> b`.
    pub fn assert_equal(&mut self, a: i32, b: i32) -> Result<(), Error> {
        if a == b {
            return Ok(());
        }
        self.clause(&[-a, b])?;
        self.clause(&[a, -b])
    }

    pub fn solve(&mut self) -> Result<Option<bool>, Error> {
        self.sat.solve()
    }

    #[inline]
    pub fn value(&self, lit: i32) -> bool {
        self.sat.value(lit) == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnf() -> Cnf {
        Cnf::new(Backend::Cadical.create().unwrap()).unwrap()
    }

    #[test]
    fn backend_names_round_trip() {
        for b in Backend::ALL {
            assert_eq!(b.name().parse::<Backend>().unwrap(), b);
        }
        assert_eq!("KISSAT".parse::<Backend>().unwrap(), Backend::Kissat);
        assert!(matches!(
            "z3".parse::<Backend>(),
            Err(Error::UnknownBackend(_))
        ));
    }

    #[test]
    fn gates_fold_constants_without_new_vars() {
        let mut cnf = cnf();
        let x = cnf.var();
        let before = cnf.num_vars();
        let t = cnf.constant(true);
        let f = cnf.constant(false);
        assert_eq!(cnf.and(x, t).unwrap(), x);
        assert_eq!(cnf.and(x, f).unwrap(), f);
        assert_eq!(cnf.or(x, t).unwrap(), t);
        assert_eq!(cnf.xor(x, t).unwrap(), -x);
        assert_eq!(cnf.xor(x, x).unwrap(), f);
        assert_eq!(cnf.xor(x, -x).unwrap(), t);
        assert_eq!(cnf.num_vars(), before);
    }

    #[test]
    fn gates_match_truth_tables() {
        for backend in Backend::ALL {
            for a_val in [false, true] {
                for b_val in [false, true] {
                    for c_val in [false, true] {
                        let mut cnf = Cnf::new(backend.create().unwrap()).unwrap();
                        let a = cnf.var();
                        let b = cnf.var();
                        let c = cnf.var();
                        let and = cnf.and(a, b).unwrap();
                        let or = cnf.or(a, b).unwrap();
                        let xor = cnf.xor(a, b).unwrap();
                        let (sum, carry) = cnf.full_adder(a, b, c).unwrap();
                        cnf.clause(&[if a_val { a } else { -a }]).unwrap();
                        cnf.clause(&[if b_val { b } else { -b }]).unwrap();
                        cnf.clause(&[if c_val { c } else { -c }]).unwrap();
                        assert_eq!(cnf.solve().unwrap(), Some(true), "{}", backend);
                        assert_eq!(cnf.value(and), a_val && b_val);
                        assert_eq!(cnf.value(or), a_val || b_val);
                        assert_eq!(cnf.value(xor), a_val ^ b_val);
                        let total = a_val as u8 + b_val as u8 + c_val as u8;
                        assert_eq!(cnf.value(sum), total % 2 == 1);
                        assert_eq!(cnf.value(carry), total >= 2);
                    }
                }
            }
        }
    }

    #[test]
    fn contradictory_equality_is_unsat() {
        let mut cnf = cnf();
        let x = cnf.var();
        cnf.assert_equal(x, -x).unwrap();
        assert_eq!(cnf.solve().unwrap(), Some(false));
    }
}
