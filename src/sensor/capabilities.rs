//! Device Capabilities
//!
//! Each trait here is the narrow interface one class of physical device exposes to
//! the pipeline. Bus wiring, register maps and protocol details live behind these
//! traits in the device drivers; the pipeline only ever asks for measurements.
//!
//! # Contract
//!
//! Every capability:
//! - Is async (uses #[async_trait])
//! - Is `Send`, so sources can move into the sampler task
//! - Uses anyhow::Result for errors
//! - Completes within one device transaction; drivers must not block indefinitely
//!
//! Methods take `&mut self`: each device is owned by exactly one source, and that
//! source is touched only by the sampler.

use anyhow::Result;
use async_trait::async_trait;

/// Combined temperature / pressure / humidity / gas package.
#[async_trait]
pub trait EnvironmentalDevice: Send {
    /// Temperature in °C
    async fn temperature(&mut self) -> Result<f64>;
    /// Barometric pressure in hPa
    async fn pressure(&mut self) -> Result<f64>;
    /// Relative humidity in %
    async fn humidity(&mut self) -> Result<f64>;
    /// Gas sensor resistance in Ω
    async fn gas_resistance(&mut self) -> Result<f64>;
}

/// Air-quality sensor reporting equivalent CO2 and total VOC.
#[async_trait]
pub trait GasDevice: Send {
    /// Equivalent CO2 in ppm
    async fn eco2(&mut self) -> Result<u16>;
    /// Total volatile organic compounds in ppb
    async fn tvoc(&mut self) -> Result<u16>;
}

/// Electrochemical oxygen sensor.
#[async_trait]
pub trait OxygenDevice: Send {
    /// Oxygen concentration in %vol, averaged over `samples` device readings.
    async fn oxygen(&mut self, samples: u8) -> Result<f64>;
}

/// Single analog input sampled at 16-bit resolution.
///
/// Used by the nitrogen dioxide and dust sensors, whose raw counts are stored
/// uncalibrated.
#[async_trait]
pub trait AnalogChannel: Send {
    /// Raw conversion result, 0..=65535
    async fn read_u16(&mut self) -> Result<u16>;
}

/// Three-axis vector in device units.
pub type Vector3 = (f64, f64, f64);

/// Nine-axis inertial measurement unit.
#[async_trait]
pub trait InertialDevice: Send {
    /// Acceleration in m/s²
    async fn acceleration(&mut self) -> Result<Vector3>;
    /// Rotation rate in rad/s
    async fn rotation(&mut self) -> Result<Vector3>;
    /// Magnetic field in µT
    async fn magnetic(&mut self) -> Result<Vector3>;
    /// Die temperature in °C
    async fn temperature(&mut self) -> Result<f64>;
}

/// Position solution reported by a GPS receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    /// Decimal degrees, north positive
    pub latitude: f64,
    /// Decimal degrees, east positive
    pub longitude: f64,
    /// Metres above mean sea level
    pub altitude_m: f64,
    /// UTC time of the fix as `HH:MM:SS`, when the receiver reports it
    pub time: Option<String>,
    /// UTC date of the fix as `YYYY-MM-DD`, when the receiver reports it
    pub date: Option<String>,
}

/// GPS receiver.
#[async_trait]
pub trait GpsReceiver: Send {
    /// Consume pending sentences from the receiver and return the current fix,
    /// or `None` while the receiver has no fix.
    async fn update(&mut self) -> Result<Option<GpsFix>>;
}
