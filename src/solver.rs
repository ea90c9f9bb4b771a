use std::collections::HashMap;
use std::fmt;

use crate::bitvec::{BinOp, Constraint, Node, Term, WIDTH};
use crate::sat::{Backend, Cnf, Error};

/// Tri-state result of a satisfiability check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SatStatus {
    Satisfiable,
    Unsatisfiable,
    Unknown,
}

impl SatStatus {
    pub fn is_sat(self) -> bool {
        self == SatStatus::Satisfiable
    }
}

impl fmt::Display for SatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SatStatus::Satisfiable => "satisfiable",
            SatStatus::Unsatisfiable => "unsatisfiable",
            SatStatus::Unknown => "unknown",
        })
    }
}

/// A satisfying assignment, one value per declared variable.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Model {
    names: Vec<String>,
    values: Vec<u32>,
}

impl Model {
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Value of a declared variable term.
    pub fn get(&self, var: &Term) -> Option<u32> {
        var.as_var().and_then(|i| self.values.get(i).copied())
    }

    pub fn eval(&self, term: &Term) -> u32 {
        term.eval(&self.values)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.names.iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {:#010x}", name, value)?;
        }
        Ok(())
    }
}

/// Bit-vector solver: terms are bit-blasted into CNF as they are asserted.
pub struct Solver {
    cnf: Cnf,
    names: Vec<String>,
    // vars[i][j] is bit j (LSB first) of variable i
    vars: Vec<Vec<i32>>,
    constraints: Vec<Constraint>,
    // keyed by node identity; the Term keeps the node alive so ids are never reused
    memo: HashMap<usize, (Term, Vec<i32>)>,
    status: Option<SatStatus>,
}

impl Solver {
    pub fn new(backend: Backend) -> Result<Self, Error> {
        Ok(Self {
            cnf: Cnf::new(backend.create()?)?,
            names: vec![],
            vars: vec![],
            constraints: vec![],
            memo: HashMap::new(),
            status: None,
        })
    }

    /// Declares a fresh unconstrained 32-bit variable.
    pub fn declare(&mut self, name: impl Into<String>) -> Term {
        let bits = (0..WIDTH).map(|_| self.cnf.var()).collect();
        self.vars.push(bits);
        self.names.push(name.into());
        Term::var(self.vars.len() - 1)
    }

    pub fn assert(&mut self, constraint: Constraint) -> Result<(), Error> {
        match &constraint {
            Constraint::Eq(a, b) => {
                let xs = self.blast(a)?;
                let ys = self.blast(b)?;
                for (x, y) in xs.into_iter().zip(ys) {
                    self.cnf.assert_equal(x, y)?;
                }
            }
        }
        self.constraints.push(constraint);
        self.status = None;
        Ok(())
    }

    pub fn check(&mut self) -> Result<SatStatus, Error> {
        let status = match self.cnf.solve()? {
            Some(true) => SatStatus::Satisfiable,
            Some(false) => SatStatus::Unsatisfiable,
            None => SatStatus::Unknown,
        };
        self.status = Some(status);
        Ok(status)
    }

    /// Model of the last check. Verified against every asserted constraint.
    pub fn model(&self) -> Result<Model, Error> {
        match self.status {
            None => return Err(Error::NotChecked),
            Some(SatStatus::Satisfiable) => {}
            Some(status) => return Err(Error::NoModel(status)),
        }
        let values: Vec<u32> = self
            .vars
            .iter()
            .map(|bits| {
                bits.iter()
                    .enumerate()
                    .filter(|&(_, &lit)| self.cnf.value(lit))
                    .fold(0u32, |acc, (j, _)| acc | (1 << j))
            })
            .collect();
        if let Some(c) = self.constraints.iter().find(|c| !c.holds(&values)) {
            return Err(Error::ModelMismatch(c.to_string()));
        }
        Ok(Model {
            names: self.names.clone(),
            values,
        })
    }

    /// Excludes `model` from future checks: some variable bit must differ.
    pub fn block_model(&mut self, model: &Model) -> Result<(), Error> {
        let mut clause = Vec::with_capacity(self.vars.len() * WIDTH);
        for (bits, &value) in self.vars.iter().zip(model.values()) {
            for (j, &lit) in bits.iter().enumerate() {
                clause.push(if value >> j & 1 == 1 { -lit } else { lit });
            }
        }
        self.cnf.clause(&clause)?;
        self.status = None;
        Ok(())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_vars(&self) -> usize {
        self.cnf.num_vars()
    }

    pub fn num_clauses(&self) -> usize {
        self.cnf.num_clauses()
    }

    /// Asserted constraints in SMT-LIB form, using the declared names.
    pub fn smt_constraints(&self) -> Vec<String> {
        self.constraints
            .iter()
            .map(|c| {
                let mut s = String::new();
                // writing into a String cannot fail
                let _ = c.write_smt(&mut s, &self.names);
                s
            })
            .collect()
    }

    fn blast(&mut self, term: &Term) -> Result<Vec<i32>, Error> {
        for t in term.post_order() {
            if self.memo.contains_key(&t.id()) {
                continue;
            }
            let bits = match t.node() {
                Node::Var(i) => self
                    .vars
                    .get(*i)
                    .cloned()
                    .ok_or(Error::UndeclaredVariable(*i))?,
                Node::Const(c) => (0..WIDTH)
                    .map(|j| self.cnf.constant(c >> j & 1 == 1))
                    .collect(),
                Node::Bin(op, a, b) => {
                    let xs = self.memo[&a.id()].1.clone();
                    let ys = self.memo[&b.id()].1.clone();
                    self.blast_bin(*op, &xs, &ys)?
                }
            };
            self.memo.insert(t.id(), (t.clone(), bits));
        }
        Ok(self.memo[&term.id()].1.clone())
    }

    fn blast_bin(&mut self, op: BinOp, xs: &[i32], ys: &[i32]) -> Result<Vec<i32>, Error> {
        let mut out = Vec::with_capacity(WIDTH);
        match op {
            BinOp::Xor | BinOp::And | BinOp::Or => {
                for (&x, &y) in xs.iter().zip(ys) {
                    out.push(match op {
                        BinOp::Xor => self.cnf.xor(x, y)?,
                        BinOp::And => self.cnf.and(x, y)?,
                        _ => self.cnf.or(x, y)?,
                    });
                }
            }
            BinOp::Add | BinOp::Sub => {
                // a - b = a + !b + 1
                let sub = op == BinOp::Sub;
                let mut carry = self.cnf.constant(sub);
                for (&x, &y) in xs.iter().zip(ys) {
                    let y = if sub { -y } else { y };
                    let (s, c) = self.cnf.full_adder(x, y, carry)?;
                    out.push(s);
                    carry = c;
                }
            }
        }
        Ok(out)
    }
}
