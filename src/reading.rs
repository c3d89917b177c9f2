//! Readings and the channel enumeration they are tagged with.
//!
//! A [`Reading`] is one timestamped, source-tagged measurement. It is created once by a
//! sensor source inside the sampler loop and never mutated afterwards: the fields are
//! private and only exposed through accessors.
//!
//! Timestamps come from a [`MissionClock`], a monotonic millisecond counter started at
//! boot. It is built on `tokio::time::Instant` so tests running with a paused runtime
//! see the same virtual time as the loops.

use std::fmt;
use tokio::time::Instant;

/// Stable identifier of a measurement channel.
///
/// The numeric values are part of the persisted output format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SourceId {
    /// Environmental package temperature (°C)
    EnvTemperature = 0,
    /// Environmental package pressure (hPa)
    EnvPressure = 1,
    /// Environmental package relative humidity (%)
    EnvHumidity = 2,
    /// Environmental package gas resistance (Ω)
    EnvGasResistance = 3,
    /// Host free memory (KiB)
    RamFree = 4,
    /// Host used memory (KiB)
    RamUsed = 5,
    /// Host core temperature (°C)
    CoreTemperature = 6,
    /// Host operating system name
    SysName = 7,
    /// Host node name
    NodeName = 8,
    /// Host kernel release
    Release = 9,
    /// Host operating system version
    Version = 10,
    /// Host machine architecture
    Machine = 11,
    /// First storage volume mount status
    Volume1Mounted = 12,
    /// Second storage volume mount status
    Volume2Mounted = 13,
    /// GPS latitude (decimal degrees)
    GpsLatitude = 14,
    /// GPS longitude (decimal degrees)
    GpsLongitude = 15,
    /// GPS altitude (m)
    GpsAltitude = 16,
    /// GPS time of fix (UTC)
    GpsTime = 17,
    /// GPS date of fix (UTC)
    GpsDate = 18,
    /// Accelerometer X (m/s²)
    AccelX = 19,
    /// Accelerometer Y (m/s²)
    AccelY = 20,
    /// Accelerometer Z (m/s²)
    AccelZ = 21,
    /// Gyroscope X (rad/s)
    GyroX = 22,
    /// Gyroscope Y (rad/s)
    GyroY = 23,
    /// Gyroscope Z (rad/s)
    GyroZ = 24,
    /// Magnetometer X (µT)
    MagX = 25,
    /// Magnetometer Y (µT)
    MagY = 26,
    /// Magnetometer Z (µT)
    MagZ = 27,
    /// Inertial unit die temperature (°C)
    ImuTemperature = 28,
    /// Equivalent CO2 (ppm)
    Eco2 = 29,
    /// Total volatile organic compounds (ppb)
    Tvoc = 30,
    /// Dust sensor raw analog value
    Dust = 31,
    /// Oxygen concentration (%vol)
    Oxygen = 32,
    /// Nitrogen dioxide sensor raw analog value
    NitrogenDioxide = 33,
    /// GPS fix indicator, emitted only while there is no fix
    GpsFix = 34,
}

impl SourceId {
    /// Every channel, in id order.
    pub const ALL: [SourceId; 35] = [
        SourceId::EnvTemperature,
        SourceId::EnvPressure,
        SourceId::EnvHumidity,
        SourceId::EnvGasResistance,
        SourceId::RamFree,
        SourceId::RamUsed,
        SourceId::CoreTemperature,
        SourceId::SysName,
        SourceId::NodeName,
        SourceId::Release,
        SourceId::Version,
        SourceId::Machine,
        SourceId::Volume1Mounted,
        SourceId::Volume2Mounted,
        SourceId::GpsLatitude,
        SourceId::GpsLongitude,
        SourceId::GpsAltitude,
        SourceId::GpsTime,
        SourceId::GpsDate,
        SourceId::AccelX,
        SourceId::AccelY,
        SourceId::AccelZ,
        SourceId::GyroX,
        SourceId::GyroY,
        SourceId::GyroZ,
        SourceId::MagX,
        SourceId::MagY,
        SourceId::MagZ,
        SourceId::ImuTemperature,
        SourceId::Eco2,
        SourceId::Tvoc,
        SourceId::Dust,
        SourceId::Oxygen,
        SourceId::NitrogenDioxide,
        SourceId::GpsFix,
    ];

    /// Numeric id as written to storage and radio.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a channel by its numeric id.
    pub fn from_u8(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// One timestamped, source-tagged measurement. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reading {
    source_id: SourceId,
    timestamp_ms: u64,
    value: String,
}

impl Reading {
    /// Build a reading. `value` is stored in its text form.
    pub fn new(source_id: SourceId, timestamp_ms: u64, value: impl Into<String>) -> Self {
        Self {
            source_id,
            timestamp_ms,
            value: value.into(),
        }
    }

    /// Channel this reading belongs to.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Milliseconds since boot at which the reading was taken.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Text-encoded value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Monotonic millisecond counter started at boot.
#[derive(Debug, Clone, Copy)]
pub struct MissionClock {
    origin: Instant,
}

impl MissionClock {
    /// Start a clock reading 0 now.
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds elapsed since [`MissionClock::start`].
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MissionClock {
    fn default() -> Self {
        Self::start()
    }
}
