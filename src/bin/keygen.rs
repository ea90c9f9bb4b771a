use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::RangedU64ValueParser;
use keysmith::keygen::Report;
use keysmith::vm::DEFAULT_MAX_STEPS;
use keysmith::{Backend, KeyGenerator};
use std::path::PathBuf;

/// Solves the key constraints and prints the solver status and a key.
#[derive(Parser, Debug)]
#[command(name = "keygen")]
struct Cli {
    /// SAT backend: cadical, kissat, minisat or glucose
    #[arg(short = 'b', long, env = "KEYSMITH_BACKEND", default_value_t = Backend::Cadical)]
    backend: Backend,
    /// Derive the constraints from this check program instead of the built-in equations
    #[arg(short = 'p', long)]
    program: Option<PathBuf>,
    /// Step limit for symbolic execution of the check program
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: usize,
    /// Number of distinct keys to print
    #[arg(short = 'n', long, default_value_t = 1,
          value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    count: usize,
    /// Print the asserted constraints to stderr before solving
    #[arg(long)]
    print_constraints: bool,
    /// Print a JSON report instead of the two-line output
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let stime = std::time::Instant::now();

    let mut generator = match &cli.program {
        Some(path) => {
            let program = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            KeyGenerator::from_program(cli.backend, &program, cli.max_steps)
                .with_context(|| format!("Cannot derive constraints from {}", path.display()))?
        }
        None => KeyGenerator::new(cli.backend)?,
    };
    eprintln!("!log backend {}", cli.backend);
    if cli.print_constraints {
        for c in generator.solver().smt_constraints() {
            eprintln!("{}", c);
        }
    }
    eprintln!("!log vars {}", generator.solver().num_vars());
    eprintln!("!log clauses {}", generator.solver().num_clauses());

    let status = generator.check()?;
    eprintln!("!log status {}", status);
    let mut keys = vec![];
    let enumerated = if status.is_sat() {
        generator.extend_keys(&mut keys, cli.count)
    } else {
        Ok(())
    };
    eprintln!("!log time {:.3}", stime.elapsed().as_secs_f64());

    let report = Report {
        status,
        backend: cli.backend,
        keys,
    };
    report.write(&mut std::io::stdout().lock(), cli.json)?;
    enumerated.context("Key enumeration stopped early")?;
    report.outcome().context("Cannot extract a key")?;
    if report.keys.len() < cli.count {
        eprintln!("only {} distinct keys exist", report.keys.len());
    }
    Ok(())
}
