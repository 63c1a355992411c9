//! CLI entry point for taskmaster.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use context::AppContext;
use shell::{Flow, Shell};
use taskmaster_app::AppConfig;

mod context;
mod demo;
mod shell;

/// Personal task lists with live sync, driven from the terminal.
#[derive(Parser, Debug)]
#[command(
    name = "taskmaster",
    version,
    about = "taskmaster: per-user task lists with live synchronization"
)]
struct Cli {
    /// Configuration file (defaults to ./.taskmaster/config.toml, then the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Read shell commands from stdin.
    Shell,
    /// Run the scripted two-user scenario.
    Demo,
}

fn main() -> Result<()> {
    let Cli { config, cmd } = Cli::parse();
    install_tracing();

    let config = AppConfig::discover(config.as_deref(), ".")?;
    tokio::runtime::Runtime::new()?.block_on(execute_command(&config, cmd))
}

async fn execute_command(config: &AppConfig, command: Command) -> Result<()> {
    match command {
        Command::Shell => run_shell(config).await,
        Command::Demo => {
            let mut stdout = std::io::stdout();
            demo::run(config, &mut stdout).await?;
            stdout.flush()?;
            Ok(())
        }
    }
}

async fn run_shell(config: &AppConfig) -> Result<()> {
    let mut shell = Shell::new(AppContext::new(config), std::io::stdout());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let flow = shell.run_line(&line).await?;
        if flow == Flow::Quit {
            break;
        }
        prompt()?;
    }
    shell.into_output().flush()?;
    Ok(())
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}

fn install_tracing() {
    // RUST_LOG overrides the INFO default; logs go to stderr so shell output stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .compact()
        .try_init();
}
