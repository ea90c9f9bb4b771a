use crate::bitvec::{Constraint, Term};
use crate::key::KEY_WORDS;
use crate::vm::{Exit, Machine, VmError};

/// Result of running a check program over symbolic key words.
pub struct SymbolicRun {
    pub exit: Exit,
    pub steps: usize,
    /// Final value of `r0` in terms of `k[0]..k[3]`.
    pub r0: Term,
}

/// Executes `program` with `r0..r3 = k[0]..k[3]`.
///
/// Jumps have constant targets, so there is exactly one path; the step limit
/// bounds programs that never stop.
pub fn run(program: &[u8], max_steps: usize) -> Result<SymbolicRun, VmError> {
    let mut m: Machine<Term> = Machine::new(program.to_vec()).with_max_steps(max_steps);
    for (i, r) in m.registers_mut().iter_mut().take(KEY_WORDS).enumerate() {
        *r = Term::var(i);
    }
    let exit = m.run()?;
    Ok(SymbolicRun {
        exit,
        steps: m.steps(),
        r0: m.registers()[0].clone(),
    })
}

/// The constraints a key must satisfy to be accepted by `program`.
pub fn constraints_for(program: &[u8], max_steps: usize) -> Result<Vec<Constraint>, VmError> {
    let run = run(program, max_steps)?;
    Ok(vec![Constraint::eq(run.r0, 0u32)])
}
