//! Custom error types for the telemetry pipeline.
//!
//! This module defines the primary error type, `TelemetryError`, for the whole crate.
//! Using the `thiserror` crate, it gives every fault the pipeline can observe a
//! named variant carrying enough context (target name, sensor identity, file path)
//! to diagnose it post-flight from the log stream alone.
//!
//! ## Error Hierarchy
//!
//! `TelemetryError` groups faults by the taxonomy the pipeline recovers from:
//!
//! - **Sensor faults** (`SensorConstruction`, `SensorTimeout`): a device could not be
//!   brought up or did not answer in time. Recovered by skipping that sensor.
//! - **Storage faults** (`StorageUnmounted`, `StorageMount`, `StorageWrite`): a volume is
//!   missing or rejected a write. Recovered by skipping that target for that write.
//! - **Radio faults** (`RadioSend`, `RadioUnavailable`): the batch could not be handed to
//!   the ground station. Recovered by dropping that cycle's transmission.
//! - **Configuration faults** (`Config`, `Configuration`, `Registry*`): the configuration
//!   or the persisted run counter is unusable.
//!
//! Device collaborators (sensor capabilities, storage volumes, radio transports) report
//! failures as `anyhow::Error`; the core turns those into the variants above, keeping
//! the reason as text, at the boundary where it adds the target or sensor name.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;

/// Every fault the pipeline distinguishes.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Failed to read run registry at '{path}': {source}")]
    RegistryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write run registry at '{path}': {source}")]
    RegistryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run registry at '{path}' is malformed: {source}")]
    RegistryFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Run registry at '{path}' has no run numbers left")]
    RegistryOverflow { path: PathBuf },

    #[error("Sensor '{sensor}' could not be constructed: {reason}")]
    SensorConstruction { sensor: String, reason: String },

    #[error("Sensor '{sensor}' did not answer within {timeout_ms} ms")]
    SensorTimeout { sensor: String, timeout_ms: u64 },

    #[error("Storage target '{target}' is not mounted")]
    StorageUnmounted { target: String },

    #[error("Storage target '{target}' failed to mount: {reason}")]
    StorageMount { target: String, reason: String },

    #[error("Storage target '{target}' failed to write '{file}': {reason}")]
    StorageWrite {
        target: String,
        file: String,
        reason: String,
    },

    #[error("Radio send to station {destination} failed: {reason}")]
    RadioSend { destination: u8, reason: String },

    #[error("Radio uplink is unavailable")]
    RadioUnavailable,
}

impl From<figment::Error> for TelemetryError {
    fn from(err: figment::Error) -> Self {
        TelemetryError::Config(Box::new(err))
    }
}

impl TelemetryError {
    /// Whether the pipeline keeps running after this fault.
    ///
    /// Sensor, storage and radio faults only cost one cycle of one target;
    /// configuration faults are the ones worth escalating to `error!`.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            TelemetryError::Config(_)
                | TelemetryError::Configuration(_)
                | TelemetryError::RegistryRead { .. }
                | TelemetryError::RegistryWrite { .. }
                | TelemetryError::RegistryFormat { .. }
                | TelemetryError::RegistryOverflow { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_name_the_target() {
        let err = TelemetryError::StorageWrite {
            target: "sd2".into(),
            file: "data-3.csv".into(),
            reason: "disk full".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sd2"));
        assert!(msg.contains("data-3.csv"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn registry_faults_are_not_recoverable() {
        let err = TelemetryError::RegistryRead {
            path: PathBuf::from("/sd1/conf.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!err.is_recoverable());
        assert!(TelemetryError::RadioUnavailable.is_recoverable());
    }
}
