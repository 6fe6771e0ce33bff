//! CLI for deploying files onto MicroPython boards.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod deploy;
mod exec;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mpflash",
    version,
    about = "Deploy files to MicroPython boards over the raw REPL"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy a manifest's files onto a board and set its name.
    Deploy(Box<deploy::DeployArgs>),

    /// Run a Python snippet on a board and print its output.
    Exec(exec::ExecArgs),

    /// List the board profiles of a manifest.
    Boards(deploy::BoardsArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for list commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = cli.dispatch().await {
        eprintln!("mpflash: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Deploy(args) => args.run().await,
            Command::Exec(args) => args.run().await,
            Command::Boards(args) => args.run(),
            Command::Completion { shell } => {
                let mut cmd = Self::command();
                clap_complete::generate(shell, &mut cmd, "mpflash", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `-v`.
/// Default filter for `-v` repeated `verbose` times.
const fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
