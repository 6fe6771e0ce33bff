//! JSON deployment manifests.
//!
//! ```json
//! {
//!   "directories": ["ioty", "umqtt", "ioty/html"],
//!   "files": ["boot.py", { "device": "ioty/html/index.html", "source": "web/index.html" }],
//!   "constants": { "device": "ioty/constants.py" },
//!   "boards": { "esp32-c3": { "boot_pin": 9, "led_pin": 8 } }
//! }
//! ```
//!
//! Source paths are relative to the manifest's directory and default to
//! the device path.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fileset::{Constants, Fileset};
use crate::patch::{Board, ConstantsPatch};
use crate::{Error, Result};

/// A file entry: a bare device path, or a device path with its own source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum FileEntry {
    /// Device path, also used as the source path.
    Path(String),
    /// Device path with an explicit source.
    Mapped {
        /// Path on the device.
        device: String,
        /// Path on the host, relative to the manifest.
        #[serde(default)]
        source: Option<PathBuf>,
    },
}

impl FileEntry {
    /// Path on the device.
    pub fn device(&self) -> &str {
        match self {
            Self::Path(p) | Self::Mapped { device: p, .. } => p,
        }
    }

    /// Path on the host, relative to the manifest.
    pub fn source(&self) -> PathBuf {
        match self {
            Self::Mapped {
                source: Some(s), ..
            } => s.clone(),
            _ => PathBuf::from(self.device()),
        }
    }
}

/// What to deploy and how to adapt it to a board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct Manifest {
    /// Directories to create, parents first.
    #[serde(default)]
    pub directories: Vec<String>,
    /// Files to copy, in order.
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Constants file patched with the selected board's pins.
    #[serde(default)]
    pub constants: Option<FileEntry>,
    /// Board profiles by name.
    #[serde(default)]
    pub boards: BTreeMap<String, Board>,
}

impl Manifest {
    /// Parses a manifest from JSON text.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Reads and parses the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| manifest_err(path, e))?;
        Self::from_json(&text).map_err(|e| manifest_err(path, e))
    }

    /// Looks up a board profile.
    pub fn board(&self, name: &str) -> Option<&Board> {
        self.boards.get(name)
    }

    /// Reads every referenced file relative to `base` and builds the
    /// fileset, patching constants for `board` when one is named.
    ///
    /// Parent directories of listed files are added when missing.
    pub fn fileset(&self, base: &Path, board: Option<&str>) -> Result<Fileset> {
        let profile = match board {
            Some(name) => *self.board(name).ok_or_else(|| Error::Manifest {
                path: base.to_path_buf(),
                reason: format!(
                    "unknown board {name:?} (known: {})",
                    self.boards.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })?,
            None => Board::default(),
        };

        let mut set = Fileset::new();
        for dir in &self.directories {
            set.add_dir(dir.trim_matches('/'));
        }
        for entry in &self.files {
            let src = base.join(entry.source());
            let content = fs::read(&src).map_err(|e| manifest_err(&src, e))?;
            set.insert(entry.device(), content);
        }
        if let Some(entry) = &self.constants {
            let src = base.join(entry.source());
            let template = fs::read_to_string(&src).map_err(|e| manifest_err(&src, e))?;
            set.set_constants(Constants::new(
                entry.device(),
                template,
                ConstantsPatch::for_board(&profile),
            ));
        }
        set.add_parent_dirs();
        Ok(set)
    }
}

/// Wraps a read or parse failure of `path`.
fn manifest_err(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
