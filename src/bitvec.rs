// 32-bit bit-vector terms and equality constraints.
//
// Terms are reference-counted DAG nodes so that symbolic execution can share
// subterms (a `mov` copies a pointer, not a tree). Constant operands are folded
// when a term is built. A straight-line program yields one node per
// instruction, so every walk over a term (eval, rendering, bit-blasting, drop)
// uses an explicit stack instead of recursion.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Sub};
use std::rc::Rc;

/// Width of every bit-vector in this crate.
pub const WIDTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Xor,
    And,
    Or,
    Add,
    Sub,
}

impl BinOp {
    /// Applies the operator to concrete values (wrapping for `Add`/`Sub`).
    pub fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            BinOp::Xor => a ^ b,
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
        }
    }

    fn smt_name(self) -> &'static str {
        match self {
            BinOp::Xor => "bvxor",
            BinOp::And => "bvand",
            BinOp::Or => "bvor",
            BinOp::Add => "bvadd",
            BinOp::Sub => "bvsub",
        }
    }
}

#[derive(Debug)]
pub enum Node {
    Var(usize),
    Const(u32),
    Bin(BinOp, Term, Term),
}

#[derive(Clone, Debug)]
pub struct Term(Rc<Node>);

impl Term {
    pub fn var(index: usize) -> Self {
        Term(Rc::new(Node::Var(index)))
    }

    pub fn constant(value: u32) -> Self {
        Term(Rc::new(Node::Const(value)))
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub fn as_const(&self) -> Option<u32> {
        match *self.0 {
            Node::Const(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<usize> {
        match *self.0 {
            Node::Var(i) => Some(i),
            _ => None,
        }
    }

    /// Identity of the shared node, stable while any clone of the term is alive.
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Builds `op(a, b)`, folding constants and the trivial identities.
    pub fn binary(op: BinOp, a: Term, b: Term) -> Term {
        match (op, a.as_const(), b.as_const()) {
            (_, Some(x), Some(y)) => Term::constant(op.apply(x, y)),
            (BinOp::Xor | BinOp::Or | BinOp::Add, Some(0), None) => b,
            (BinOp::Xor | BinOp::Or | BinOp::Add | BinOp::Sub, None, Some(0)) => a,
            (BinOp::And, Some(0), None) | (BinOp::And, None, Some(0)) => Term::constant(0),
            (BinOp::And, Some(u32::MAX), None) => b,
            (BinOp::And, None, Some(u32::MAX)) => a,
            (BinOp::Or, Some(u32::MAX), None) | (BinOp::Or, None, Some(u32::MAX)) => {
                Term::constant(u32::MAX)
            }
            _ => Term(Rc::new(Node::Bin(op, a, b))),
        }
    }

    /// Distinct nodes reachable from `self`, children before parents.
    pub fn post_order(&self) -> Vec<&Term> {
        let mut order = vec![];
        let mut seen = HashSet::new();
        let mut stack = vec![(self, false)];
        while let Some((t, expanded)) = stack.pop() {
            if expanded {
                order.push(t);
                continue;
            }
            if !seen.insert(t.id()) {
                continue;
            }
            stack.push((t, true));
            if let Node::Bin(_, a, b) = t.node() {
                stack.push((b, false));
                stack.push((a, false));
            }
        }
        order
    }

    /// Evaluates the term under a concrete assignment.
    ///
    /// Panics if the term mentions a variable index outside `values`.
    pub fn eval(&self, values: &[u32]) -> u32 {
        let mut memo: HashMap<usize, u32> = HashMap::new();
        for t in self.post_order() {
            let v = match t.node() {
                Node::Var(i) => values[*i],
                Node::Const(c) => *c,
                Node::Bin(op, a, b) => op.apply(memo[&a.id()], memo[&b.id()]),
            };
            memo.insert(t.id(), v);
        }
        memo[&self.id()]
    }

    /// Writes the term in SMT-LIB form. Variable `i` is printed as `names[i]`,
    /// or as `k[i]` when `names` has no entry for it.
    pub fn write_smt(&self, out: &mut impl fmt::Write, names: &[String]) -> fmt::Result {
        enum Piece<'a> {
            Expr(&'a Term),
            Text(&'static str),
        }
        let mut stack = vec![Piece::Expr(self)];
        while let Some(piece) = stack.pop() {
            let t = match piece {
                Piece::Text(s) => {
                    out.write_str(s)?;
                    continue;
                }
                Piece::Expr(t) => t,
            };
            match t.node() {
                Node::Var(i) => match names.get(*i) {
                    Some(name) => out.write_str(name)?,
                    None => write!(out, "k[{}]", i)?,
                },
                Node::Const(c) => write!(out, "#x{:08x}", c)?,
                Node::Bin(op, a, b) => {
                    write!(out, "({} ", op.smt_name())?;
                    stack.push(Piece::Text(")"));
                    stack.push(Piece::Expr(b));
                    stack.push(Piece::Text(" "));
                    stack.push(Piece::Expr(a));
                }
            }
        }
        Ok(())
    }
}

impl Drop for Term {
    fn drop(&mut self) {
        // Unlink uniquely owned children here so dropping a long chain does
        // not recurse once per node.
        let mut stack = vec![];
        take_children(self, &mut stack);
        while let Some(mut t) = stack.pop() {
            take_children(&mut t, &mut stack);
        }
    }
}

fn take_children(t: &mut Term, stack: &mut Vec<Term>) {
    if let Some(node) = Rc::get_mut(&mut t.0)
        && let Node::Bin(_, a, b) = std::mem::replace(node, Node::Const(0))
    {
        stack.push(a);
        stack.push(b);
    }
}

impl From<u32> for Term {
    fn from(value: u32) -> Self {
        Term::constant(value)
    }
}

impl From<&Term> for Term {
    fn from(term: &Term) -> Self {
        term.clone()
    }
}

/// Renders variables as key words `k[i]`; see [`Term::write_smt`] for names.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_smt(f, &[])
    }
}

macro_rules! impl_term_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Term>> $trait<T> for Term {
            type Output = Term;
            fn $method(self, rhs: T) -> Term {
                Term::binary($op, self, rhs.into())
            }
        }
        impl<T: Into<Term>> $trait<T> for &Term {
            type Output = Term;
            fn $method(self, rhs: T) -> Term {
                Term::binary($op, self.clone(), rhs.into())
            }
        }
    };
}

impl_term_op!(BitXor, bitxor, BinOp::Xor);
impl_term_op!(BitAnd, bitand, BinOp::And);
impl_term_op!(BitOr, bitor, BinOp::Or);
impl_term_op!(Add, add, BinOp::Add);
impl_term_op!(Sub, sub, BinOp::Sub);

/// A boolean predicate over bit-vector terms.
#[derive(Clone, Debug)]
pub enum Constraint {
    Eq(Term, Term),
}

impl Constraint {
    pub fn eq(lhs: impl Into<Term>, rhs: impl Into<Term>) -> Self {
        Constraint::Eq(lhs.into(), rhs.into())
    }

    pub fn holds(&self, values: &[u32]) -> bool {
        match self {
            Constraint::Eq(a, b) => a.eval(values) == b.eval(values),
        }
    }

    /// Writes the constraint in SMT-LIB form, naming variables as in [`Term::write_smt`].
    pub fn write_smt(&self, out: &mut impl fmt::Write, names: &[String]) -> fmt::Result {
        match self {
            Constraint::Eq(a, b) => {
                out.write_str("(= ")?;
                a.write_smt(out, names)?;
                out.write_str(" ")?;
                b.write_smt(out, names)?;
                out.write_str(")")
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_smt(f, &[])
    }
}
