//! Simulated Devices
//!
//! Stand-ins for every device capability so the full pipeline runs on a bench host
//! without the payload hardware. Values wander with noise around realistic ground
//! level baselines, each transaction takes a couple of milliseconds, and a
//! configurable failure rate exercises the pipeline's fault isolation.
//!
//! # Available Devices
//!
//! - `SimulatedEnvironment` - temperature/pressure/humidity/gas package
//! - `SimulatedGas` - eCO2/TVOC air-quality sensor
//! - `SimulatedOxygen` - electrochemical O2 sensor
//! - `SimulatedAnalog` - raw 16-bit analog channel (NO2, dust)
//! - `SimulatedInertial` - 9-axis IMU at rest
//! - `SimulatedGps` - receiver that acquires a fix after a number of updates
//!
//! All delays use `tokio::time::sleep`, and the random generator is never held
//! across an await so the device futures stay `Send`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, Duration};

use super::capabilities::{
    AnalogChannel, EnvironmentalDevice, GasDevice, GpsFix, GpsReceiver, InertialDevice,
    OxygenDevice, Vector3,
};

/// Simulated duration of one device transaction.
pub const TRANSACTION_LATENCY: Duration = Duration::from_millis(2);

/// Standard gravity, m/s².
const GRAVITY: f64 = 9.806_65;

fn noise(spread: f64) -> f64 {
    rand::thread_rng().gen_range(-spread..=spread)
}

async fn transaction() {
    sleep(TRANSACTION_LATENCY).await;
}

// =============================================================================
// FaultInjector - random transaction failures
// =============================================================================

/// Fails a fraction of device transactions.
#[derive(Debug, Clone, Copy)]
pub struct FaultInjector {
    rate: f64,
}

impl FaultInjector {
    /// Fail each transaction with probability `rate`.
    ///
    /// # Errors
    /// Returns Err if `rate` is not within `[0, 1]`.
    pub fn new(rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            bail!("failure rate {rate} is outside [0, 1]");
        }
        Ok(Self { rate })
    }

    /// Never fail.
    pub fn none() -> Self {
        Self { rate: 0.0 }
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.rate > 0.0 && rand::thread_rng().gen_bool(self.rate) {
            bail!("simulated {what} transaction failure");
        }
        Ok(())
    }
}

// =============================================================================
// SimulatedEnvironment
// =============================================================================

/// Environmental package at ground level.
#[derive(Debug)]
pub struct SimulatedEnvironment {
    faults: FaultInjector,
    temperature_c: f64,
    pressure_hpa: f64,
}

impl SimulatedEnvironment {
    /// Create a package reading 20 °C and 1013.25 hPa.
    pub fn new(faults: FaultInjector) -> Self {
        Self {
            faults,
            temperature_c: 20.0,
            pressure_hpa: 1013.25,
        }
    }
}

#[async_trait]
impl EnvironmentalDevice for SimulatedEnvironment {
    async fn temperature(&mut self) -> Result<f64> {
        transaction().await;
        self.faults.check("environmental")?;
        self.temperature_c += noise(0.05);
        Ok(self.temperature_c)
    }

    async fn pressure(&mut self) -> Result<f64> {
        self.pressure_hpa += noise(0.1);
        Ok(self.pressure_hpa)
    }

    async fn humidity(&mut self) -> Result<f64> {
        Ok(45.0 + noise(1.5))
    }

    async fn gas_resistance(&mut self) -> Result<f64> {
        Ok(50_000.0 + noise(2_500.0))
    }
}

// =============================================================================
// SimulatedGas
// =============================================================================

/// Air-quality sensor in clean outdoor air.
#[derive(Debug)]
pub struct SimulatedGas {
    faults: FaultInjector,
}

impl SimulatedGas {
    /// Create a sensor reporting ~420 ppm eCO2.
    pub fn new(faults: FaultInjector) -> Self {
        Self { faults }
    }
}

#[async_trait]
impl GasDevice for SimulatedGas {
    async fn eco2(&mut self) -> Result<u16> {
        transaction().await;
        self.faults.check("gas")?;
        Ok((420.0 + noise(15.0)).round() as u16)
    }

    async fn tvoc(&mut self) -> Result<u16> {
        Ok((5.0 + noise(5.0)).max(0.0).round() as u16)
    }
}

// =============================================================================
// SimulatedOxygen
// =============================================================================

/// Oxygen sensor in ambient air.
#[derive(Debug)]
pub struct SimulatedOxygen {
    faults: FaultInjector,
}

impl SimulatedOxygen {
    /// Create a sensor reporting ~20.9 %vol.
    pub fn new(faults: FaultInjector) -> Self {
        Self { faults }
    }
}

#[async_trait]
impl OxygenDevice for SimulatedOxygen {
    async fn oxygen(&mut self, samples: u8) -> Result<f64> {
        transaction().await;
        self.faults.check("oxygen")?;
        let samples = samples.max(1);
        let total: f64 = (0..samples).map(|_| 20.9 + noise(0.2)).sum();
        Ok(total / f64::from(samples))
    }
}

// =============================================================================
// SimulatedAnalog
// =============================================================================

/// Raw analog channel wandering around a baseline count.
#[derive(Debug)]
pub struct SimulatedAnalog {
    faults: FaultInjector,
    baseline: u16,
    spread: u16,
}

impl SimulatedAnalog {
    /// Create a channel reading `baseline ± spread` counts.
    pub fn new(baseline: u16, spread: u16, faults: FaultInjector) -> Self {
        Self {
            faults,
            baseline,
            spread,
        }
    }
}

#[async_trait]
impl AnalogChannel for SimulatedAnalog {
    async fn read_u16(&mut self) -> Result<u16> {
        transaction().await;
        self.faults.check("analog")?;
        let value = f64::from(self.baseline) + noise(f64::from(self.spread));
        Ok(value.clamp(0.0, f64::from(u16::MAX)).round() as u16)
    }
}

// =============================================================================
// SimulatedInertial
// =============================================================================

/// IMU lying still, Z axis up.
#[derive(Debug)]
pub struct SimulatedInertial {
    faults: FaultInjector,
}

impl SimulatedInertial {
    /// Create an IMU at rest.
    pub fn new(faults: FaultInjector) -> Self {
        Self { faults }
    }
}

#[async_trait]
impl InertialDevice for SimulatedInertial {
    async fn acceleration(&mut self) -> Result<Vector3> {
        transaction().await;
        self.faults.check("inertial")?;
        Ok((noise(0.05), noise(0.05), GRAVITY + noise(0.05)))
    }

    async fn rotation(&mut self) -> Result<Vector3> {
        Ok((noise(0.01), noise(0.01), noise(0.01)))
    }

    async fn magnetic(&mut self) -> Result<Vector3> {
        Ok((20.0 + noise(0.5), 0.5 + noise(0.5), -44.0 + noise(0.5)))
    }

    async fn temperature(&mut self) -> Result<f64> {
        Ok(24.0 + noise(0.2))
    }
}

// =============================================================================
// SimulatedGps
// =============================================================================

/// GPS receiver that reports no fix for its first `acquire_after` updates.
#[derive(Debug)]
pub struct SimulatedGps {
    faults: FaultInjector,
    updates: u32,
    acquire_after: u32,
    latitude: f64,
    longitude: f64,
    altitude_m: f64,
}

impl SimulatedGps {
    /// Create a receiver that gets its fix on update number `acquire_after + 1`.
    pub fn new(acquire_after: u32, faults: FaultInjector) -> Self {
        Self {
            faults,
            updates: 0,
            acquire_after,
            latitude: 50.087_451,
            longitude: 14.420_671,
            altitude_m: 312.0,
        }
    }
}

#[async_trait]
impl GpsReceiver for SimulatedGps {
    async fn update(&mut self) -> Result<Option<GpsFix>> {
        transaction().await;
        self.faults.check("gps")?;
        self.updates = self.updates.saturating_add(1);
        if self.updates <= self.acquire_after {
            return Ok(None);
        }

        self.latitude += noise(0.000_01);
        self.longitude += noise(0.000_01);
        self.altitude_m += noise(0.5);
        let now = chrono::Utc::now();
        Ok(Some(GpsFix {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude_m: self.altitude_m,
            time: Some(now.format("%H:%M:%S").to_string()),
            date: Some(now.format("%Y-%m-%d").to_string()),
        }))
    }
}
