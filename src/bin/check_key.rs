use anyhow::{Context, Result, bail};
use clap::Parser;
use keysmith::Key;
use keysmith::checker::KeyChecker;
use keysmith::vm::DEFAULT_MAX_STEPS;
use proconio::input;
use proconio::source::once::OnceSource;
use std::path::PathBuf;

/// Runs a key through the key-check VM.
#[derive(Parser, Debug)]
#[command(name = "check_key")]
struct Cli {
    /// Key as 32 hex digits or four 8-digit hex words; read from stdin when omitted
    key: Vec<String>,
    /// Check program to run instead of the built-in one
    #[arg(short = 'p', long)]
    program: Option<PathBuf>,
    /// Abort programs that run longer than this many instructions
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: usize,
}

fn main() {
    match run() {
        Ok(true) => println!("Key is correct"),
        Ok(false) => {
            println!("Key is incorrect");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(2);
        }
    }
}

/// Reads a key from stdin. Accepts keygen output, status line included.
fn read_key_from_stdin() -> Result<Key> {
    use std::io::Read;
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;

    let mut src = OnceSource::from(buf.as_str());
    input! { from &mut src, first: String }
    let key = if first == "satisfiable" {
        input! { from &mut src, words: [String; 4] }
        words.join(" ")
    } else if first == "unsatisfiable" || first == "unknown" {
        bail!("keygen found no key ({})", first);
    } else if first.len() == 32 {
        first
    } else {
        input! { from &mut src, rest: [String; 3] }
        format!("{} {}", first, rest.join(" "))
    };
    key.parse::<Key>()
        .with_context(|| format!("Invalid key: {}", key))
}

fn run() -> Result<bool> {
    let cli = Cli::parse();
    let key = if cli.key.is_empty() {
        read_key_from_stdin()?
    } else {
        let s = cli.key.join(" ");
        s.parse::<Key>()
            .with_context(|| format!("Invalid key: {}", s))?
    };

    let checker = match &cli.program {
        Some(path) => KeyChecker::new(
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => KeyChecker::builtin(),
    }
    .with_max_steps(cli.max_steps);

    let verdict = checker.check(&key).context("Check program failed")?;
    eprintln!("!log key {}", key);
    eprintln!("!log exit {:?}", verdict.exit);
    eprintln!("!log steps {}", verdict.steps);
    eprintln!("!log r0 {:#010x}", verdict.r0);
    Ok(verdict.correct)
}
