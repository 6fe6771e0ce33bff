//! Raw REPL session: timed reads, marker waits and command execution.
//!
//! A [`Session`] exclusively owns an open [`Port`] and the receive-side
//! [`Accumulator`]. Every operation borrows the session mutably, so at most
//! one read or write is ever in flight against the device.

use std::time::Duration;

use mpflash_proto::{Accumulator, script};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::deploy::Phase;
use crate::transport::{Port, Signals, Transport};
use crate::{Error, Result};

/// Size of the scratch buffer for a single read.
const READ_CHUNK: usize = 1024;

/// Tunables for a session. Defaults match the raw REPL of stock firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
#[must_use]
pub struct SessionConfig {
    /// Baud rate used to open the transport.
    pub baud_rate: u32,
    /// Largest slice written in one go by [`Session::send_command`].
    pub chunk_size: usize,
    /// Pause after every chunk.
    pub chunk_delay: Duration,
    /// Idle window for ordinary waits.
    pub wait_timeout: Duration,
    /// Idle window for the first prompt after interrupting a running program.
    pub interrupt_timeout: Duration,
    /// Completion marker printed after every executed command.
    pub marker: String,
    /// Settling time after pulsing the reset line.
    pub reset_settle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: mpflash_proto::DEFAULT_BAUD,
            chunk_size: mpflash_proto::CHUNK_SIZE,
            chunk_delay: Duration::from_millis(mpflash_proto::CHUNK_DELAY_MS),
            wait_timeout: Duration::from_millis(2000),
            interrupt_timeout: Duration::from_millis(5000),
            marker: mpflash_proto::DEFAULT_MARKER.to_owned(),
            reset_settle: Duration::from_millis(1000),
        }
    }
}

impl SessionConfig {
    /// Sets the baud rate (default: 115200).
    pub const fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Sets the chunk size (default: 256 bytes). Zero is treated as one.
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the inter-chunk delay (default: 10 ms).
    pub const fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Sets the default wait window (default: 2 s).
    pub const fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Sets the wait window after an interrupt (default: 5 s).
    pub const fn interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = timeout;
        self
    }

    /// Overrides the completion marker (default: `CGLI5wxheI`).
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Sets the settling time after a reset pulse (default: 1 s).
    pub const fn reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }
}

/// Control sequences understood by the REPL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Control {
    /// Stop the running program (`\r` Ctrl-C Ctrl-C).
    Interrupt,
    /// Enter raw mode (`\r` Ctrl-A).
    EnterRaw,
    /// Leave raw mode (`\r` Ctrl-B).
    ExitRaw,
    /// Execute the buffered command in raw mode (Ctrl-D).
    Execute,
}

impl Control {
    /// Bytes put on the wire.
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Self::Interrupt => mpflash_proto::INTERRUPT,
            Self::EnterRaw => mpflash_proto::ENTER_RAW,
            Self::ExitRaw => mpflash_proto::EXIT_RAW,
            Self::Execute => mpflash_proto::EXECUTE,
        }
    }
}

/// Output of a command run with [`Session::exec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExecOutput {
    /// Text the command printed.
    pub stdout: String,
    /// Traceback, empty if the command completed normally.
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the command raised.
    pub fn failed(&self) -> bool {
        !self.stderr.is_empty()
    }
}

/// A live connection to a device.
#[derive(Debug)]
pub struct Session<P> {
    /// `None` once closed.
    port: Option<P>,
    /// Bytes read but not yet matched.
    acc: Accumulator,
    /// Phase reported in timeouts.
    phase: Phase,
    /// Settings the session was opened with.
    config: SessionConfig,
}

impl<P: Port> Session<P> {
    /// Opens `transport` at the configured baud rate.
    pub fn open<T>(transport: &mut T, config: SessionConfig) -> Result<Self>
    where
        T: Transport<Port = P>,
    {
        let port = transport.open(config.baud_rate)?;
        Ok(Self::from_port(port, config))
    }

    /// Wraps an already open port.
    pub fn from_port(port: P, config: SessionConfig) -> Self {
        Self {
            port: Some(port),
            acc: Accumulator::new(),
            phase: Phase::Opening,
            config,
        }
    }

    /// Current phase, used to label timeouts.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves the session into `phase`.
    pub fn set_phase(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "phase");
        self.phase = phase;
    }

    /// Session tunables.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Received bytes not yet consumed by a wait.
    pub const fn buffered(&self) -> &Accumulator {
        &self.acc
    }

    /// Whether [`Session::close`] has run.
    pub const fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    /// Discards everything received so far.
    pub fn clear_buf(&mut self) {
        self.acc.clear();
    }

    /// Drives the modem control lines.
    pub fn set_signals(&mut self, signals: Signals) -> Result<()> {
        self.port()?.set_signals(signals)?;
        Ok(())
    }

    /// The open port, or [`Error::Closed`].
    fn port(&mut self) -> Result<&mut P> {
        self.port.as_mut().ok_or(Error::Closed)
    }

    /// Performs one read raced against `timeout`.
    ///
    /// Returns `None` if the timer fired first. The losing read is dropped
    /// before any bytes are taken from the port, so nothing leaks into a
    /// later call. End of stream is an error.
    pub async fn read_or_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; READ_CHUNK];
        let port = self.port()?;
        match tokio::time::timeout(timeout, port.read(&mut buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(0)) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "device closed the connection",
            )
            .into()),
            Ok(Ok(n)) => {
                trace!(n, "read");
                Ok(Some(buf[..n].to_vec()))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Reads until `marker` appears, returning the bytes before it.
    ///
    /// `timeout` bounds inactivity: each read gets a fresh window, so the
    /// wait continues for as long as data keeps arriving. The marker and
    /// everything before it are consumed; trailing bytes stay buffered.
    pub async fn wait_for_bytes(&mut self, marker: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        loop {
            let Some(chunk) = self.read_or_timeout(timeout).await? else {
                debug!(phase = %self.phase, ?timeout, "timeout waiting for marker");
                return Err(Error::Timeout {
                    phase: self.phase,
                    marker: String::from_utf8_lossy(marker).into_owned(),
                    waited: timeout,
                });
            };
            self.acc.append(&chunk);
            if let Some(before) = self.acc.take_through(marker) {
                return Ok(before);
            }
        }
    }

    /// Text variant of [`Session::wait_for_bytes`].
    pub async fn wait_for_string(&mut self, marker: &str, timeout: Duration) -> Result<String> {
        let before = self.wait_for_bytes(marker.as_bytes(), timeout).await?;
        Ok(String::from_utf8_lossy(&before).into_owned())
    }

    /// Writes a control sequence. No acknowledgement is awaited.
    pub async fn send_control(&mut self, control: Control) -> Result<()> {
        debug!(?control, "control");
        let port = self.port()?;
        port.write_all(control.bytes()).await?;
        port.flush().await?;
        Ok(())
    }

    /// Writes `text` in chunks of at most `chunk_size` bytes, pausing
    /// `chunk_delay` after each one.
    pub async fn send_command(&mut self, text: &str) -> Result<()> {
        let size = self.config.chunk_size.max(1);
        let delay = self.config.chunk_delay;
        debug!(len = text.len(), chunks = text.len().div_ceil(size), "sending command");
        for chunk in text.as_bytes().chunks(size) {
            let port = self.port()?;
            port.write_all(chunk).await?;
            port.flush().await?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Runs `command` in raw mode and waits for the default marker.
    ///
    /// Returns whatever the device sent before the marker. That text is
    /// not inspected: a command that prints an error but still reaches the
    /// marker counts as a success.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        let marker = self.config.marker.clone();
        let timeout = self.config.wait_timeout;
        self.execute_with(command, &marker, timeout).await
    }

    /// [`Session::execute`] with an explicit marker and wait window.
    pub async fn execute_with(
        &mut self,
        command: &str,
        marker: &str,
        timeout: Duration,
    ) -> Result<String> {
        self.send_command(&script::with_marker(command, marker)).await?;
        self.send_control(Control::Execute).await?;
        self.wait_for_string(marker, timeout).await
    }

    /// Runs `command` in raw mode using the firmware's own framing.
    ///
    /// The device answers `OK`, then stdout, `\x04`, the traceback, `\x04`
    /// and finally the raw prompt. Unlike [`Session::execute`] this tells a
    /// raised exception apart from normal output.
    pub async fn exec(&mut self, command: &str, timeout: Duration) -> Result<ExecOutput> {
        let ack_timeout = self.config.wait_timeout;
        self.send_command(command).await?;
        self.send_control(Control::Execute).await?;
        self.next_frame(b"OK", ack_timeout).await?;
        let stdout = self.next_frame(b"\x04", timeout).await?;
        let stderr = self.next_frame(b"\x04", ack_timeout).await?;
        self.next_frame(mpflash_proto::RAW_PROMPT.as_bytes(), ack_timeout)
            .await?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Like [`Session::wait_for_bytes`], but first looks at what is already
    /// buffered. The frames of one reply usually arrive in a single read.
    async fn next_frame(&mut self, marker: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        match self.acc.take_through(marker) {
            Some(before) => Ok(before),
            None => self.wait_for_bytes(marker, timeout).await,
        }
    }

    /// Flushes and shuts down the port, then drops it.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        debug!("closing port");
        let flushed = port.flush().await;
        let shut = port.shutdown().await;
        drop(port);
        flushed?;
        shut?;
        Ok(())
    }
}
