use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keysmith::checker::check_program;
use keysmith::instruction::disassemble;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "checkprog", about = "Check program utilities: emit/disasm")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the built-in check program as raw bytes
    Emit {
        #[arg(name = "FILE")]
        path: PathBuf,
    },

    /// Print a check program as assembly (the built-in one when no file is given)
    Disasm {
        #[arg(name = "FILE")]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Commands::Emit { path } => {
            std::fs::write(&path, check_program())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("!log bytes {}", check_program().len());
        }
        Commands::Disasm { path } => {
            let program = match &path {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => check_program().to_vec(),
            };
            for (pc, ins) in disassemble(&program)? {
                println!("{:04x}  {}", pc, ins);
            }
        }
    }
    Ok(())
}
