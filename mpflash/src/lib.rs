//! Deploys files onto MicroPython boards through the raw REPL.
//!
//! `mpflash` drives the REPL of a MicroPython device over a byte transport
//! (normally a USB serial adapter): it interrupts the running program,
//! switches to raw mode, runs generated Python to create directories and
//! write files, and switches back.
//!
//! # Quick start
//!
//! ```no_run
//! use mpflash::{DeployOptions, Deployer, Fileset, SerialTransport};
//!
//! # async fn demo() -> mpflash::Result<()> {
//! let mut files = Fileset::new();
//! files.insert("main.py", b"print('hello')\n".to_vec());
//!
//! let mut deployer = Deployer::connect(SerialTransport::new("/dev/ttyUSB0"));
//! deployer
//!     .deploy("dev1", &files, DeployOptions::default(), |step| println!("{step}"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod deploy;
mod error;
mod exec;
mod fileset;
mod manifest;
mod patch;
mod session;
mod transport;

pub use mpflash_proto as proto;

pub use deploy::{
    DeployOptions, Deployer, DeviceName, MAX_NAME_LEN, NAME_FILE, NameError, Outcome, Phase,
    Report, Step, enter_raw, exit_raw,
};
pub use error::{Error, Result};
pub use exec::run_snippet;
pub use fileset::{Constants, Fileset};
pub use manifest::{FileEntry, Manifest};
pub use patch::{Assignment, Board, ConstantsPatch, Patched};
pub use session::{Control, ExecOutput, Session, SessionConfig};
pub use transport::{Port, SerialTransport, Signals, Transport};
