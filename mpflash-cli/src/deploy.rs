//! `mpflash deploy` and `mpflash boards`.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mpflash::{
    DeployOptions, Deployer, Manifest, Outcome, Phase, SerialTransport, SessionConfig, Step,
};

use crate::OutputFormat;

/// Arguments for `mpflash deploy`.
///
/// Usage: `mpflash deploy [OPTIONS] --name NAME PORT`
#[derive(clap::Args)]
pub struct DeployArgs {
    /// Serial port the board is attached to (e.g. /dev/ttyUSB0, COM3).
    port: String,

    /// Device name written to the board (1 to 8 characters).
    #[arg(short, long)]
    name: String,

    /// Deployment manifest.
    #[arg(short, long, default_value = "deploy.json")]
    manifest: PathBuf,

    /// Board profile used to patch the constants file.
    #[arg(short, long)]
    board: Option<String>,

    /// Recreate the LittleFS filesystem before copying.
    #[arg(long)]
    format: bool,

    /// Release DTR/RTS right after opening the port.
    #[arg(long)]
    hold_reset: bool,

    /// Skip the reset pulse before opening the port.
    #[arg(long)]
    no_reset: bool,

    /// Baud rate.
    #[arg(long, default_value_t = mpflash::proto::DEFAULT_BAUD)]
    baud: u32,

    /// Pause between 256-byte chunks, in milliseconds.
    #[arg(long, default_value_t = 10)]
    chunk_delay_ms: u64,

    /// Idle timeout for each command, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Completion marker printed after each command.
    #[arg(long)]
    marker: Option<String>,
}

impl DeployArgs {
    pub async fn run(self) -> Result<()> {
        let manifest = Manifest::load(&self.manifest)?;
        let fileset = manifest
            .fileset(base_dir(&self.manifest), self.board.as_deref())
            .context("failed to assemble files")?;

        let mut config = SessionConfig::default()
            .baud_rate(self.baud)
            .chunk_delay(Duration::from_millis(self.chunk_delay_ms))
            .wait_timeout(Duration::from_millis(self.timeout_ms));
        if let Some(marker) = self.marker {
            config = config.marker(marker);
        }
        let options = DeployOptions::default()
            .format_filesystem(self.format)
            .hold_reset_during_open(self.hold_reset)
            .reset_before_open(!self.no_reset);

        println!(
            "Deploying {} files and {} directories to {}",
            fileset.len() + usize::from(fileset.constants().is_some()),
            fileset.dirs().len(),
            self.port
        );
        let mut deployer = Deployer::with_config(SerialTransport::new(&self.port), config);
        let report = deployer
            .deploy(&self.name, &fileset, options, print_step)
            .await
            .with_context(|| format!("deployment to {} failed", self.port))?;

        println!("Deployed {} files. Device is now {:?}.", report.files.len(), self.name.trim());
        Ok(())
    }
}

/// Prints one status line per step.
fn print_step(step: &Step) {
    match (&step.outcome, &step.detail) {
        (Outcome::Started, None) => println!("{}...", capitalize(step.phase)),
        (Outcome::Started, Some(detail)) if step.phase == Phase::CopyingFiles => {
            print!("    copying {detail}... ");
            let _ = std::io::stdout().flush();
        }
        (Outcome::Started, Some(detail)) => println!("    {detail}"),
        (Outcome::Done, Some(_)) if step.phase == Phase::CopyingFiles => println!("Done"),
        (Outcome::Done, Some(detail)) if step.phase == Phase::PatchingConstants => {
            println!("    {detail}");
        }
        (Outcome::Failed(reason), _) => println!("\n{} failed: {reason}", capitalize(step.phase)),
        _ => {}
    }
}

fn capitalize(phase: Phase) -> String {
    let s = phase.to_string();
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_uppercase().chain(chars).collect()
    })
}

/// Directory that manifest-relative source paths resolve against.
fn base_dir(manifest: &Path) -> &Path {
    manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Arguments for `mpflash boards`.
#[derive(clap::Args)]
pub struct BoardsArgs {
    /// Deployment manifest.
    #[arg(short, long, default_value = "deploy.json")]
    manifest: PathBuf,

    /// Output format.
    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

impl BoardsArgs {
    pub fn run(self) -> Result<()> {
        let manifest = Manifest::load(&self.manifest)?;

        if matches!(self.format, OutputFormat::Json) {
            println!("{}", serde_json::to_string_pretty(&manifest.boards)?);
            return Ok(());
        }

        if manifest.boards.is_empty() {
            println!("No boards.");
            return Ok(());
        }
        println!("{:<24} {:>8} {:>8}", "BOARD", "BOOT", "LED");
        let pin = |p: Option<u32>| p.map_or_else(|| "-".to_owned(), |p| p.to_string());
        for (name, board) in &manifest.boards {
            println!("{:<24} {:>8} {:>8}", name, pin(board.boot_pin), pin(board.led_pin));
        }
        Ok(())
    }
}
