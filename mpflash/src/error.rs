//! Error types for mpflash operations.

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::{NameError, Phase};

/// Alias for `Result<T, mpflash::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by sessions and deployments.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Opening, reading, writing or closing the transport failed.
    ///
    /// End of stream on the reader surfaces as
    /// [`std::io::ErrorKind::UnexpectedEof`].
    #[error(transparent)]
    Transport(#[from] std::io::Error),

    /// An expected marker did not arrive within the allotted idle window.
    #[error("{phase}: timeout after {} ms waiting for {marker:?}", .waited.as_millis())]
    Timeout {
        /// Phase that was waiting.
        phase: Phase,
        /// Marker that never arrived.
        marker: String,
        /// Idle window that elapsed.
        waited: Duration,
    },

    /// The device name failed local validation.
    #[error("invalid device name: {0}")]
    InvalidName(#[from] NameError),

    /// A deployment manifest or one of the files it references is unusable.
    #[error("manifest {}: {reason}", .path.display())]
    Manifest {
        /// File that could not be used.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The session was used after it was closed.
    #[error("session is closed")]
    Closed,
}

impl Error {
    /// Whether the error is a protocol timeout.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
