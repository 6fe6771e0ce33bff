//! The deployment workflow: drives a device through the raw REPL
//! handshake and copies a [`Fileset`] onto it.
//!
//! ```text
//! Disconnected → [Resetting] → Opening → AwaitingInterruptPrompt
//!   → RawModeEntering → RawModeReady → [Formatting] → CreatingDirs
//!   → [PatchingConstants] → CopyingFiles → WritingDeviceName
//!   → RawModeExiting → Closed
//! ```
//!
//! Any failure moves to [`Phase::Aborted`]. The port is closed on every
//! path out of [`Deployer::deploy`]. Nothing is retried and nothing already
//! written to the device is rolled back.

use std::borrow::Cow;
use std::fmt;

use mpflash_proto::script;
use tracing::{info, warn};

use crate::fileset::Fileset;
use crate::session::{Control, Session, SessionConfig};
use crate::transport::{Port, Signals, Transport};
use crate::{Error, Result};

/// Longest accepted device name, in characters.
pub const MAX_NAME_LEN: usize = 8;

/// Device file holding the device name.
pub const NAME_FILE: &str = "_ioty_name";

/// Where a session or deployment currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Phase {
    /// No port is open.
    Disconnected,
    /// Pulsing the reset line before the real open.
    Resetting,
    /// Opening the transport.
    Opening,
    /// Interrupt sent, waiting for `>>> `.
    AwaitingInterruptPrompt,
    /// Ctrl-A sent, waiting for `>`.
    RawModeEntering,
    /// Raw mode is active.
    RawModeReady,
    /// Recreating the filesystem.
    Formatting,
    /// Creating directories.
    CreatingDirs,
    /// Substituting board constants locally.
    PatchingConstants,
    /// Copying files.
    CopyingFiles,
    /// Writing the device name file.
    WritingDeviceName,
    /// Running an ad-hoc command.
    Executing,
    /// Ctrl-B sent, waiting for `>>> `.
    RawModeExiting,
    /// Finished normally; the port is closed.
    Closed,
    /// A step failed; the port is closed.
    Aborted,
}

impl Phase {
    /// Whether the phase ends a deployment.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Resetting => "resetting",
            Self::Opening => "opening port",
            Self::AwaitingInterruptPrompt => "terminating running program",
            Self::RawModeEntering => "switching to raw mode",
            Self::RawModeReady => "raw mode ready",
            Self::Formatting => "formatting filesystem",
            Self::CreatingDirs => "creating directories",
            Self::PatchingConstants => "patching constants",
            Self::CopyingFiles => "copying files",
            Self::WritingDeviceName => "setting device name",
            Self::Executing => "executing",
            Self::RawModeExiting => "exiting raw mode",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        })
    }
}

/// Why a device name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum NameError {
    /// Blank after trimming.
    #[error("device name cannot be empty")]
    Empty,
    /// Longer than [`MAX_NAME_LEN`].
    #[error("device name cannot exceed {max} characters (got {0})", max = MAX_NAME_LEN)]
    TooLong(usize),
}

/// A validated device name: 1 to 8 characters, no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName(String);

impl DeviceName {
    /// Trims `raw` and validates its length.
    pub fn new(raw: &str) -> std::result::Result<Self, NameError> {
        let name = raw.trim();
        match name.chars().count() {
            0 => Err(NameError::Empty),
            n if n > MAX_NAME_LEN => Err(NameError::TooLong(n)),
            _ => Ok(Self(name.to_owned())),
        }
    }

    /// The name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Switches for a deployment. All off by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
#[must_use]
pub struct DeployOptions {
    /// Recreate the filesystem before copying.
    pub format_filesystem: bool,
    /// Release DTR and RTS right after opening so the board is not held in
    /// reset by adapters that assert them on open.
    pub hold_reset_during_open: bool,
    /// Pulse RTS to reboot the board before opening.
    pub reset_before_open: bool,
}

impl DeployOptions {
    /// Recreate the filesystem before copying.
    pub const fn format_filesystem(mut self, on: bool) -> Self {
        self.format_filesystem = on;
        self
    }

    /// Release DTR and RTS right after opening.
    pub const fn hold_reset_during_open(mut self, on: bool) -> Self {
        self.hold_reset_during_open = on;
        self
    }

    /// Pulse RTS before opening.
    pub const fn reset_before_open(mut self, on: bool) -> Self {
        self.reset_before_open = on;
        self
    }
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Outcome {
    /// The step began.
    Started,
    /// The step completed.
    Done,
    /// The step failed; the deployment stops here.
    Failed(String),
}

/// Progress notification emitted by [`Deployer::deploy`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Step {
    /// Phase the step belongs to.
    pub phase: Phase,
    /// Subject of the step, e.g. the file being copied.
    pub detail: Option<String>,
    /// What happened.
    pub outcome: Outcome,
}

impl Step {
    /// Creates a step.
    pub fn new(phase: Phase, detail: Option<&str>, outcome: Outcome) -> Self {
        Self {
            phase,
            detail: detail.map(str::to_owned),
            outcome,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(d) => write!(f, "{} ({d}): ", self.phase)?,
            None => write!(f, "{}: ", self.phase)?,
        }
        match &self.outcome {
            Outcome::Started => f.write_str("started"),
            Outcome::Done => f.write_str("done"),
            Outcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Summary of a finished deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Report {
    /// Phases entered, in order.
    pub phases: Vec<Phase>,
    /// Device paths written, in order (the name file included).
    pub files: Vec<String>,
}

/// Drives deployments over a transport.
#[derive(Debug)]
pub struct Deployer<T> {
    /// Opened once per deployment, plus once more for the reset pulse.
    transport: T,
    /// Settings for every session opened.
    config: SessionConfig,
    /// Where the last deployment got to.
    phase: Phase,
}

impl<T: Transport> Deployer<T> {
    /// Takes ownership of `transport` with default session settings.
    pub fn connect(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Takes ownership of `transport` with the given session settings.
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            phase: Phase::Disconnected,
        }
    }

    /// Phase reached by the last deployment.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Session settings.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Gives the transport back.
    pub fn disconnect(self) -> T {
        self.transport
    }

    /// Deploys `fileset` and names the device `name`.
    ///
    /// The name is validated before any I/O. `progress` receives a
    /// [`Step`] as each phase starts and finishes; on failure the last
    /// step names the failing phase and reason.
    pub async fn deploy(
        &mut self,
        name: &str,
        fileset: &Fileset,
        options: DeployOptions,
        mut progress: impl FnMut(&Step),
    ) -> Result<Report> {
        let device_name = DeviceName::new(name)?;
        let mut run = Run {
            phases: Vec::new(),
            files: Vec::new(),
            progress: &mut progress,
        };

        let result = self.drive(&mut run, &device_name, fileset, options).await;
        match result {
            Ok(()) => {
                self.phase = Phase::Closed;
                run.phases.push(Phase::Closed);
                info!(files = run.files.len(), "deployment complete");
                Ok(Report {
                    phases: run.phases,
                    files: run.files,
                })
            }
            Err((phase, e)) => {
                warn!(%phase, error = %e, "deployment aborted");
                (run.progress)(&Step::new(phase, None, Outcome::Failed(e.to_string())));
                self.phase = Phase::Aborted;
                Err(e)
            }
        }
    }

    /// Opens the port, runs the phases and always closes again.
    async fn drive(
        &mut self,
        run: &mut Run<'_>,
        name: &DeviceName,
        fileset: &Fileset,
        options: DeployOptions,
    ) -> std::result::Result<(), (Phase, Error)> {
        if options.reset_before_open {
            self.phase = Phase::Resetting;
            run.enter(Phase::Resetting);
            self.reset().await.map_err(|e| (Phase::Resetting, e))?;
            run.done(Phase::Resetting, None);
        }

        self.phase = Phase::Opening;
        run.enter(Phase::Opening);
        let mut session = Session::open(&mut self.transport, self.config.clone())
            .map_err(|e| (Phase::Opening, e))?;

        let outcome = async {
            if options.hold_reset_during_open {
                session.set_signals(Signals::RELEASED)?;
            }
            run.done(Phase::Opening, None);
            handshake_and_copy(&mut session, run, name, fileset, options).await
        }
        .await;

        let phase = session.phase();
        self.phase = phase;
        let closed = session.close().await;
        match (outcome, closed) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) => Err((phase, e)),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "close after failure");
                }
                Err((phase, e))
            }
        }
    }

    /// Pulses RTS with DTR low, then lets the board boot.
    async fn reset(&mut self) -> Result<()> {
        let mut session = Session::open(&mut self.transport, self.config.clone())?;
        session.set_phase(Phase::Resetting);
        let pulsed = session
            .set_signals(Signals::RESET)
            .and_then(|()| session.set_signals(Signals::RELEASED));
        session.close().await?;
        pulsed?;
        tokio::time::sleep(self.config.reset_settle).await;
        Ok(())
    }
}

/// Bookkeeping for one deployment.
struct Run<'a> {
    /// Phases entered so far.
    phases: Vec<Phase>,
    /// Device paths written so far.
    files: Vec<String>,
    /// Caller's progress callback.
    progress: &'a mut dyn FnMut(&Step),
}

impl Run<'_> {
    /// Records and announces a new phase.
    fn enter(&mut self, phase: Phase) {
        info!(%phase, "phase");
        self.phases.push(phase);
        (self.progress)(&Step::new(phase, None, Outcome::Started));
    }

    /// Announces the start of a step within a phase.
    fn started(&mut self, phase: Phase, detail: Option<&str>) {
        (self.progress)(&Step::new(phase, detail, Outcome::Started));
    }

    /// Announces a finished step or phase.
    fn done(&mut self, phase: Phase, detail: Option<&str>) {
        (self.progress)(&Step::new(phase, detail, Outcome::Done));
    }
}

/// Enters raw mode on an interrupted device.
///
/// Shared by deployments and ad-hoc execution.
pub async fn enter_raw<P: Port>(
    session: &mut Session<P>,
    mut enter: impl FnMut(Phase),
) -> Result<()> {
    session.set_phase(Phase::AwaitingInterruptPrompt);
    enter(Phase::AwaitingInterruptPrompt);
    session.clear_buf();
    session.send_control(Control::Interrupt).await?;
    let interrupt_wait = session.config().interrupt_timeout;
    session
        .wait_for_string(mpflash_proto::FRIENDLY_PROMPT, interrupt_wait)
        .await?;

    session.set_phase(Phase::RawModeEntering);
    enter(Phase::RawModeEntering);
    session.send_control(Control::EnterRaw).await?;
    let prompt_wait = session.config().wait_timeout;
    session
        .wait_for_string(mpflash_proto::RAW_PROMPT, prompt_wait)
        .await?;
    session.set_phase(Phase::RawModeReady);
    Ok(())
}

/// Leaves raw mode and waits for the friendly prompt.
pub async fn exit_raw<P: Port>(session: &mut Session<P>) -> Result<()> {
    session.set_phase(Phase::RawModeExiting);
    session.send_control(Control::ExitRaw).await?;
    let timeout = session.config().wait_timeout;
    session
        .wait_for_string(mpflash_proto::FRIENDLY_PROMPT, timeout)
        .await?;
    Ok(())
}

/// Everything between opening and closing the port.
async fn handshake_and_copy<P: Port>(
    session: &mut Session<P>,
    run: &mut Run<'_>,
    name: &DeviceName,
    fileset: &Fileset,
    options: DeployOptions,
) -> Result<()> {
    let mut last = None;
    enter_raw(session, |phase| {
        if let Some(prev) = last.replace(phase) {
            run.done(prev, None);
        }
        run.enter(phase);
    })
    .await?;
    if let Some(prev) = last {
        run.done(prev, None);
    }

    if options.format_filesystem {
        session.set_phase(Phase::Formatting);
        run.enter(Phase::Formatting);
        session.execute(script::FORMAT_FILESYSTEM).await?;
        run.done(Phase::Formatting, None);
    }

    session.set_phase(Phase::CreatingDirs);
    run.enter(Phase::CreatingDirs);
    session.execute(&script::make_dirs(fileset.dirs())).await?;
    run.done(Phase::CreatingDirs, None);

    let mut files: Vec<(&str, Cow<'_, [u8]>)> = fileset
        .files()
        .map(|(path, content)| (path, Cow::Borrowed(content)))
        .collect();

    if let Some(constants) = fileset.constants() {
        session.set_phase(Phase::PatchingConstants);
        run.enter(Phase::PatchingConstants);
        let patched = constants.patch.apply(&constants.template);
        for applied in &patched.applied {
            run.done(Phase::PatchingConstants, Some(applied.as_str()));
        }
        let entry = (constants.path.as_str(), Cow::Owned(patched.text.into_bytes()));
        match files.iter_mut().find(|(p, _)| *p == constants.path) {
            Some(slot) => *slot = entry,
            None => files.push(entry),
        }
        run.done(Phase::PatchingConstants, None);
    }

    session.set_phase(Phase::CopyingFiles);
    run.enter(Phase::CopyingFiles);
    for (path, content) in files.iter().map(|(p, c)| (*p, c)) {
        run.started(Phase::CopyingFiles, Some(path));
        session.execute(&script::write_file(path, content)).await?;
        run.files.push(path.to_owned());
        run.done(Phase::CopyingFiles, Some(path));
    }
    run.done(Phase::CopyingFiles, None);

    session.set_phase(Phase::WritingDeviceName);
    run.enter(Phase::WritingDeviceName);
    run.started(Phase::WritingDeviceName, Some(name.as_str()));
    session
        .execute(&script::write_file(NAME_FILE, name.as_str().as_bytes()))
        .await?;
    run.files.push(NAME_FILE.to_owned());
    run.done(Phase::WritingDeviceName, None);

    run.enter(Phase::RawModeExiting);
    exit_raw(session).await?;
    run.done(Phase::RawModeExiting, None);
    Ok(())
}
