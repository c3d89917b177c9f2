//! # CanSat Telemetry Core Library
//!
//! Onboard acquisition pipeline for a CanSat payload. Two long-lived loops share
//! one buffer:
//!
//! - the **sampler** polls every sensor at a fixed cadence and appends the cycle's
//!   readings to the buffer;
//! - the **dispatcher** drains the buffer at its own cadence, encodes the drained
//!   readings as one text batch and hands it to every storage target and to the
//!   radio uplink.
//!
//! Faults in any sensor, storage target or the radio are logged and skipped for
//! that cycle only; neither loop ever stops because of them.
//!
//! ## Crate Structure
//!
//! - **`reading`**: `Reading`, the `SourceId` channel table and the mission clock.
//! - **`encoding`**: the `source_id,timestamp,value;` record format.
//! - **`buffer`**: `SharedBuffer`, the lock-guarded hand-off between the loops.
//! - **`sensor`**: the `SensorSource` trait, device capabilities, concrete sources,
//!   the host platform source and simulated devices.
//! - **`sampler`** / **`dispatcher`**: the two loops.
//! - **`storage`**: `StorageFanout` over mountable volumes.
//! - **`radio`**: `RadioUplink` and the UDP modem stand-in.
//! - **`run_registry`**: the persisted run counter naming each run's output file.
//! - **`pipeline`**: starts both loops and shuts them down without losing data.
//! - **`config`**, **`logging`**, **`error`**, **`shutdown`**: ambient plumbing.

pub mod buffer;
pub mod config;
pub mod dispatcher;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod radio;
pub mod reading;
pub mod run_registry;
pub mod sampler;
pub mod sensor;
pub mod shutdown;
pub mod storage;

pub use buffer::SharedBuffer;
pub use config::TelemetryConfig;
pub use error::{TelemetryError, TelemetryResult};
pub use pipeline::{Pipeline, PipelineHandle, PipelineStats};
pub use reading::{MissionClock, Reading, SourceId};
