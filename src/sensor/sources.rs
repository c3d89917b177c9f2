//! Per-device sensor sources.
//!
//! Each source owns one device and maps its measurements onto the fixed channel
//! enumeration. A source takes the timestamp once, after its device transaction,
//! so all readings from one poll share it.

use anyhow::Result;
use async_trait::async_trait;

use super::capabilities::{
    AnalogChannel, EnvironmentalDevice, GasDevice, GpsReceiver, InertialDevice, OxygenDevice,
};
use super::SensorSource;
use crate::reading::{MissionClock, Reading, SourceId};

/// Device readings averaged by the oxygen sensor per poll.
pub const DEFAULT_OXYGEN_SAMPLES: u8 = 10;

fn fixed(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}

// =============================================================================
// EnvironmentalSource - temperature, pressure, humidity, gas (ids 0-3)
// =============================================================================

/// Four readings per poll from a combined environmental package.
pub struct EnvironmentalSource<D> {
    name: String,
    device: D,
}

impl<D: EnvironmentalDevice> EnvironmentalSource<D> {
    /// Wrap `device` under `name`.
    pub fn new(name: impl Into<String>, device: D) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }
}

#[async_trait]
impl<D: EnvironmentalDevice> SensorSource for EnvironmentalSource<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        let temperature = self.device.temperature().await?;
        let pressure = self.device.pressure().await?;
        let humidity = self.device.humidity().await?;
        let gas = self.device.gas_resistance().await?;
        let t = clock.now_ms();
        Ok(vec![
            Reading::new(SourceId::EnvTemperature, t, fixed(temperature, 2)),
            Reading::new(SourceId::EnvPressure, t, fixed(pressure, 2)),
            Reading::new(SourceId::EnvHumidity, t, fixed(humidity, 2)),
            Reading::new(SourceId::EnvGasResistance, t, fixed(gas, 0)),
        ])
    }
}

// =============================================================================
// GasSource - eCO2 / TVOC (ids 29, 30)
// =============================================================================

/// Equivalent CO2 and TVOC from an air-quality sensor.
pub struct GasSource<D> {
    name: String,
    device: D,
}

impl<D: GasDevice> GasSource<D> {
    /// Wrap `device` under `name`.
    pub fn new(name: impl Into<String>, device: D) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }
}

#[async_trait]
impl<D: GasDevice> SensorSource for GasSource<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        let eco2 = self.device.eco2().await?;
        let tvoc = self.device.tvoc().await?;
        let t = clock.now_ms();
        Ok(vec![
            Reading::new(SourceId::Eco2, t, eco2.to_string()),
            Reading::new(SourceId::Tvoc, t, tvoc.to_string()),
        ])
    }
}

// =============================================================================
// OxygenSource (id 32)
// =============================================================================

/// Oxygen concentration averaged over several device samples.
pub struct OxygenSource<D> {
    name: String,
    device: D,
    samples: u8,
}

impl<D: OxygenDevice> OxygenSource<D> {
    /// Wrap `device` under `name`, averaging [`DEFAULT_OXYGEN_SAMPLES`] per poll.
    pub fn new(name: impl Into<String>, device: D) -> Self {
        Self {
            name: name.into(),
            device,
            samples: DEFAULT_OXYGEN_SAMPLES,
        }
    }

    /// Override the number of device samples averaged per poll (at least 1).
    pub fn with_samples(mut self, samples: u8) -> Self {
        self.samples = samples.max(1);
        self
    }
}

#[async_trait]
impl<D: OxygenDevice> SensorSource for OxygenSource<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        let oxygen = self.device.oxygen(self.samples).await?;
        Ok(vec![Reading::new(
            SourceId::Oxygen,
            clock.now_ms(),
            fixed(oxygen, 2),
        )])
    }
}

// =============================================================================
// AnalogSource - raw 16-bit channel (NO2 id 33, dust id 31)
// =============================================================================

/// One raw analog conversion per poll, reported on a fixed channel.
pub struct AnalogSource<D> {
    name: String,
    channel: SourceId,
    device: D,
}

impl<D: AnalogChannel> AnalogSource<D> {
    /// Report `device` conversions on `channel`.
    pub fn new(name: impl Into<String>, channel: SourceId, device: D) -> Self {
        Self {
            name: name.into(),
            channel,
            device,
        }
    }
}

#[async_trait]
impl<D: AnalogChannel> SensorSource for AnalogSource<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        let raw = self.device.read_u16().await?;
        Ok(vec![Reading::new(self.channel, clock.now_ms(), raw.to_string())])
    }
}

// =============================================================================
// InertialSource (ids 19-28)
// =============================================================================

/// Acceleration, rotation, magnetic field and die temperature from a 9-axis IMU.
pub struct InertialSource<D> {
    name: String,
    device: D,
}

impl<D: InertialDevice> InertialSource<D> {
    /// Wrap `device` under `name`.
    pub fn new(name: impl Into<String>, device: D) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }
}

#[async_trait]
impl<D: InertialDevice> SensorSource for InertialSource<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        let (ax, ay, az) = self.device.acceleration().await?;
        let (gx, gy, gz) = self.device.rotation().await?;
        let (mx, my, mz) = self.device.magnetic().await?;
        let temperature = self.device.temperature().await?;
        let t = clock.now_ms();

        let axes = [
            (SourceId::AccelX, ax),
            (SourceId::AccelY, ay),
            (SourceId::AccelZ, az),
            (SourceId::GyroX, gx),
            (SourceId::GyroY, gy),
            (SourceId::GyroZ, gz),
            (SourceId::MagX, mx),
            (SourceId::MagY, my),
            (SourceId::MagZ, mz),
        ];
        let mut readings: Vec<Reading> = axes
            .into_iter()
            .map(|(id, value)| Reading::new(id, t, fixed(value, 3)))
            .collect();
        readings.push(Reading::new(SourceId::ImuTemperature, t, fixed(temperature, 1)));
        Ok(readings)
    }
}

// =============================================================================
// GpsSource (ids 14-18, 34)
// =============================================================================

/// Position while the receiver has a fix, a single "no fix" indicator otherwise.
pub struct GpsSource<D> {
    name: String,
    device: D,
}

impl<D: GpsReceiver> GpsSource<D> {
    /// Wrap `device` under `name`.
    pub fn new(name: impl Into<String>, device: D) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }
}

#[async_trait]
impl<D: GpsReceiver> SensorSource for GpsSource<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        let fix = self.device.update().await?;
        let t = clock.now_ms();

        let Some(fix) = fix else {
            return Ok(vec![Reading::new(SourceId::GpsFix, t, "false")]);
        };

        let mut readings = vec![
            Reading::new(SourceId::GpsLatitude, t, fixed(fix.latitude, 6)),
            Reading::new(SourceId::GpsLongitude, t, fixed(fix.longitude, 6)),
            Reading::new(SourceId::GpsAltitude, t, fixed(fix.altitude_m, 1)),
        ];
        if let Some(time) = fix.time {
            readings.push(Reading::new(SourceId::GpsTime, t, time));
        }
        if let Some(date) = fix.date {
            readings.push(Reading::new(SourceId::GpsDate, t, date));
        }
        Ok(readings)
    }
}
