//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the payload.
//! Configuration is loaded from:
//! 1. `config/telemetry.toml` (or the file given with `--config`)
//! 2. Environment variables prefixed with `CANSAT_`, nested keys split on `__`
//!
//! Every field has a default, so a missing file still yields a runnable bench
//! configuration.
//!
//! # Example
//! ```no_run
//! use cansat_telemetry::config::TelemetryConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TelemetryConfig::load()?;
//! config.validate()?;
//! println!("Sampling every {} ms", config.sampler.interval_ms);
//! # Ok(())
//! # }
//! ```
//!
//! `CANSAT_SAMPLER__INTERVAL_MS=500` overrides `sampler.interval_ms`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{TelemetryError, TelemetryResult};
use crate::logging::OutputFormat;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/telemetry.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "CANSAT_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Producer loop settings
    pub sampler: SamplerConfig,
    /// Consumer loop settings
    pub dispatcher: DispatcherConfig,
    /// Persisted run counter settings
    pub registry: RegistryConfig,
    /// Storage volume definitions
    pub storage: StorageConfig,
    /// Radio uplink settings
    pub radio: RadioConfig,
    /// Sensor definitions, polled in this order
    pub sensors: Vec<SensorDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "CanSat Telemetry".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
        }
    }
}

/// Sampler cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Target duration of one sampling iteration in milliseconds
    pub interval_ms: u64,
    /// Upper bound for a single sensor poll in milliseconds
    pub poll_timeout_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            poll_timeout_ms: 500,
        }
    }
}

impl SamplerConfig {
    /// Iteration interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Per-poll timeout as a `Duration`
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Dispatcher cadence and output naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Sleep between dispatch cycles in milliseconds
    pub interval_ms: u64,
    /// Output file name prefix; files are named `{prefix}-{run}.csv`
    pub file_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            file_prefix: "data".to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Cycle interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Output file name for run number `run`
    pub fn file_name(&self, run: u64) -> String {
        format!("{}-{}.csv", self.file_prefix, run)
    }
}

/// Run registry location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// JSON file holding the persisted run counter
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("volumes/sd1/conf.json"),
        }
    }
}

/// Storage volumes written by the fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Volumes, in fan-out order
    pub volumes: Vec<VolumeDefinition>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            volumes: vec![VolumeDefinition {
                name: "sd1".to_string(),
                root: PathBuf::from("volumes/sd1"),
            }],
        }
    }
}

/// One storage volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDefinition {
    /// Name used in logs and errors
    pub name: String,
    /// Directory the volume is mounted at
    pub root: PathBuf,
}

/// Radio uplink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Whether to open the radio transport at all
    pub enabled: bool,
    /// Local socket address of the transport
    pub bind: SocketAddr,
    /// Socket address of the ground station
    pub station: SocketAddr,
    /// Our own link address
    pub client_address: u8,
    /// Ground station link address
    pub server_address: u8,
    /// Wait this long for an acknowledgement (0 = fire and forget)
    pub ack_timeout_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            station: SocketAddr::from(([127, 0, 0, 1], 5005)),
            client_address: 1,
            server_address: 2,
            ack_timeout_ms: 0,
        }
    }
}

impl RadioConfig {
    /// Acknowledgement timeout, `None` when sends are fire-and-forget
    pub fn ack_timeout(&self) -> Option<Duration> {
        (self.ack_timeout_ms > 0).then(|| Duration::from_millis(self.ack_timeout_ms))
    }
}

/// Kinds of sensor the payload can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Temperature/pressure/humidity/gas package
    Environmental,
    /// eCO2/TVOC air-quality sensor
    Gas,
    /// Oxygen concentration sensor
    Oxygen,
    /// Nitrogen dioxide analog sensor
    NitrogenDioxide,
    /// Dust analog sensor
    Dust,
    /// 9-axis inertial measurement unit
    Inertial,
    /// GPS receiver
    Gps,
}

impl SensorKind {
    /// Name used for the source in logs
    pub fn label(self) -> &'static str {
        match self {
            SensorKind::Environmental => "environmental",
            SensorKind::Gas => "gas",
            SensorKind::Oxygen => "oxygen",
            SensorKind::NitrogenDioxide => "nitrogen_dioxide",
            SensorKind::Dust => "dust",
            SensorKind::Inertial => "inertial",
            SensorKind::Gps => "gps",
        }
    }
}

/// Sensor definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDefinition {
    /// Sensor kind
    pub kind: SensorKind,
    /// Whether this sensor is polled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Probability that a simulated transaction fails (0.0 - 1.0)
    #[serde(default)]
    pub failure_rate: f64,
    /// Device samples averaged per poll, for sensors that average (oxygen)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u8>,
}

impl SensorDefinition {
    /// Enabled, fault-free definition of `kind`
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            enabled: true,
            failure_rate: 0.0,
            samples: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl TelemetryConfig {
    /// Load configuration from `config/telemetry.toml` and environment variables
    pub fn load() -> TelemetryResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path, then apply environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> TelemetryResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(TelemetryError::from)
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml_str(toml: &str) -> TelemetryResult<Self> {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(TelemetryError::from)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> TelemetryResult<()> {
        let invalid = |msg: String| Err(TelemetryError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.sampler.interval_ms == 0 {
            return invalid("sampler.interval_ms must be greater than 0".to_string());
        }
        if self.sampler.poll_timeout_ms == 0 {
            return invalid("sampler.poll_timeout_ms must be greater than 0".to_string());
        }
        if self.dispatcher.interval_ms == 0 {
            return invalid("dispatcher.interval_ms must be greater than 0".to_string());
        }
        if self.dispatcher.file_prefix.trim().is_empty() {
            return invalid("dispatcher.file_prefix must not be empty".to_string());
        }

        let mut names = HashSet::new();
        for volume in &self.storage.volumes {
            if !names.insert(volume.name.as_str()) {
                return invalid(format!("Duplicate storage volume name: {}", volume.name));
            }
        }

        let mut kinds = HashSet::new();
        for sensor in &self.sensors {
            if !(0.0..=1.0).contains(&sensor.failure_rate) {
                return invalid(format!(
                    "Invalid failure_rate {} for sensor '{}'. Must be 0.0-1.0",
                    sensor.failure_rate,
                    sensor.kind.label()
                ));
            }
            if sensor.samples == Some(0) {
                return invalid(format!(
                    "Invalid samples 0 for sensor '{}'. Must be at least 1",
                    sensor.kind.label()
                ));
            }
            if !kinds.insert(sensor.kind) {
                return invalid(format!("Duplicate sensor kind: {}", sensor.kind.label()));
            }
        }

        Ok(())
    }

    /// Get all enabled sensors, in poll order
    pub fn enabled_sensors(&self) -> impl Iterator<Item = &SensorDefinition> {
        self.sensors.iter().filter(|sensor| sensor.enabled)
    }
}
