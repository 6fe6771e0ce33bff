//! `mpflash exec`: run a snippet in raw mode.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use mpflash::{SerialTransport, SessionConfig};

/// Arguments for `mpflash exec`.
///
/// Usage: `mpflash exec [OPTIONS] PORT [CODE]`
#[derive(clap::Args)]
pub struct ExecArgs {
    /// Serial port the board is attached to.
    port: String,

    /// Python source to run. Conflicts with --file.
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    code: Option<String>,

    /// Read the Python source from a file.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Baud rate.
    #[arg(long, default_value_t = mpflash::proto::DEFAULT_BAUD)]
    baud: u32,

    /// Seconds the snippet may stay silent before giving up.
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,
}

impl ExecArgs {
    pub async fn run(self) -> Result<()> {
        let code = match (self.code, &self.file) {
            (Some(code), _) => code,
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => bail!("no code given"),
        };

        let mut transport = SerialTransport::new(&self.port);
        let config = SessionConfig::default().baud_rate(self.baud);
        let output =
            mpflash::run_snippet(&mut transport, config, &code, Duration::from_secs(self.timeout))
                .await
                .with_context(|| format!("exec on {} failed", self.port))?;

        print!("{}", output.stdout.replace("\r\n", "\n"));
        if output.failed() {
            eprint!("{}", output.stderr.replace("\r\n", "\n"));
            bail!("snippet raised an exception");
        }
        Ok(())
    }
}
