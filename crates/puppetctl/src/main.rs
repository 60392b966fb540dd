//! Entry point for `puppetctl`, the command-line companion to the puppet runtime. It parses
//! the CLI surface, initialises tracing and dispatches to the subcommand modules.
//!
//! Types:
//!
//! - None; this module focuses on orchestrating submodules.
//!
//! Functions:
//!
//! - `main` parses CLI input, initialises tracing, and dispatches to subcommands.
//! - `run_where` prints the resolved configuration paths.

mod check;
mod cli;
mod envelope;
mod inspect;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Inspect(args) => inspect::run(args),
        Command::Check(args) => check::run(args),
        Command::Lipsync(args) => envelope::run(args),
        Command::Where => run_where(),
    }
}

fn run_where() -> Result<()> {
    let paths = AppPaths::discover()?;
    println!("Configuration directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  stage:      {}", paths.stage_file().display());
    Ok(())
}
