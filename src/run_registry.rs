//! Persisted run counter.
//!
//! Every power-on is one run. At startup the counter is read, incremented and
//! written back before any data is produced; the new value names this run's
//! output files. The record is a small JSON document:
//!
//! ```json
//! { "runs": 7 }
//! ```
//!
//! Other keys in the document are preserved across updates.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::{TelemetryError, TelemetryResult};

/// Run number used when the registry cannot be read or written.
///
/// A healthy registry starts at 1, so files carrying this number are recognisable.
pub const FALLBACK_RUN: u64 = 0;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RunState {
    #[serde(default)]
    runs: u64,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Run counter stored at a fixed path.
#[derive(Debug, Clone)]
pub struct RunRegistry {
    path: PathBuf,
}

impl RunRegistry {
    /// Registry stored at `path`. Nothing is read until [`advance`](Self::advance).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the counter, increment it, persist it and return the new value.
    ///
    /// A missing record counts as 0, so the first run is 1. An unreadable,
    /// malformed or exhausted record is an error and is left as it was.
    pub fn advance(&self) -> TelemetryResult<u64> {
        let mut state = self.load()?;
        state.runs = state
            .runs
            .checked_add(1)
            .ok_or_else(|| TelemetryError::RegistryOverflow {
                path: self.path.clone(),
            })?;
        self.store(&state)?;
        Ok(state.runs)
    }

    /// [`advance`](Self::advance), logging a failure and returning [`FALLBACK_RUN`].
    pub fn advance_or_fallback(&self) -> u64 {
        match self.advance() {
            Ok(run) => {
                info!(run, path = %self.path.display(), "Run number assigned");
                run
            }
            Err(err) => {
                error!(
                    error = %err,
                    fallback = FALLBACK_RUN,
                    "Error updating run registry, continuing with fallback run number"
                );
                FALLBACK_RUN
            }
        }
    }

    fn load(&self) -> TelemetryResult<RunState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RunState::default());
            }
            Err(source) => {
                return Err(TelemetryError::RegistryRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| TelemetryError::RegistryFormat {
            path: self.path.clone(),
            source,
        })
    }

    fn store(&self, state: &RunState) -> TelemetryResult<()> {
        let write_err = |source: std::io::Error| TelemetryError::RegistryWrite {
            path: self.path.clone(),
            source,
        };

        let serialized =
            serde_json::to_string_pretty(state).map_err(|source| TelemetryError::RegistryFormat {
                path: self.path.clone(),
                source,
            })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Write then rename so a power cut leaves either the old or the new record.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            write_err(source)
        })
    }
}
