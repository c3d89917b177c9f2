//! Sensor sources.
//!
//! A [`SensorSource`] wraps one physical device and turns one device transaction
//! into zero or more [`Reading`]s. Sources are the only place device faults can
//! happen during acquisition; the sampler catches any error a source returns, logs
//! it with the source name and moves on, so a failing sensor costs exactly one
//! cycle of its own readings.
//!
//! - [`capabilities`]: the narrow device interfaces the sources drive
//! - [`sources`]: per-device sources mapping measurements onto channel ids
//! - [`platform`]: host memory/thermal/identity source, always present
//! - [`simulated`]: bench stand-ins for every device capability
//!
//! The sensor set is fixed at startup by [`build_sources`].

pub mod capabilities;
pub mod platform;
pub mod simulated;
pub mod sources;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{SensorDefinition, SensorKind};
use crate::error::{TelemetryError, TelemetryResult};
use crate::reading::{MissionClock, Reading, SourceId};

pub use platform::PlatformSource;
use simulated::{
    FaultInjector, SimulatedAnalog, SimulatedEnvironment, SimulatedGas, SimulatedGps,
    SimulatedInertial, SimulatedOxygen,
};
use sources::{
    AnalogSource, EnvironmentalSource, GasSource, GpsSource, InertialSource, OxygenSource,
};

/// Something the sampler polls once per cycle.
///
/// # Contract
/// - `poll` completes within one device transaction; it never waits indefinitely
/// - every returned reading is stamped from `clock`
/// - an `Err` means "no readings this cycle"; the source stays registered and is
///   polled again next cycle
#[async_trait]
pub trait SensorSource: Send {
    /// Name used in logs when this source fails.
    fn name(&self) -> &str;

    /// Read the device once.
    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>>;
}

/// Raw count a clean-air NO2 channel sits at.
const NO2_BASELINE: u16 = 9_800;
/// Raw count a clean-air dust channel sits at.
const DUST_BASELINE: u16 = 1_200;
/// Updates the simulated GPS needs before its first fix.
const GPS_ACQUIRE_AFTER: u32 = 5;

/// Build the fixed sensor set for this run.
///
/// Every enabled definition is constructed in order. A sensor that fails to come
/// up is logged and left out; startup continues with the rest. The host platform
/// source is always appended last, reporting `volume_mounted` for the first two
/// storage volumes.
pub fn build_sources(
    definitions: &[SensorDefinition],
    volume_mounted: &[bool],
) -> Vec<Box<dyn SensorSource>> {
    let mut sources: Vec<Box<dyn SensorSource>> = Vec::with_capacity(definitions.len() + 1);

    for definition in definitions.iter().filter(|d| d.enabled) {
        match build_simulated(definition) {
            Ok(source) => {
                info!(sensor = definition.kind.label(), "Sensor initialized");
                sources.push(source);
            }
            Err(err) => {
                error!(sensor = definition.kind.label(), error = %err, "Error initializing sensor");
            }
        }
    }

    sources.push(Box::new(
        PlatformSource::new().with_volume_status(volume_mounted),
    ));
    sources
}

/// Construct the bench implementation of one sensor definition.
pub fn build_simulated(definition: &SensorDefinition) -> TelemetryResult<Box<dyn SensorSource>> {
    let name = definition.kind.label();
    let faults = FaultInjector::new(definition.failure_rate).map_err(|err| {
        TelemetryError::SensorConstruction {
            sensor: name.to_string(),
            reason: err.to_string(),
        }
    })?;

    let source: Box<dyn SensorSource> = match definition.kind {
        SensorKind::Environmental => Box::new(EnvironmentalSource::new(
            name,
            SimulatedEnvironment::new(faults),
        )),
        SensorKind::Gas => Box::new(GasSource::new(name, SimulatedGas::new(faults))),
        SensorKind::Oxygen => Box::new(oxygen_source(
            name,
            SimulatedOxygen::new(faults),
            definition,
        )),
        SensorKind::NitrogenDioxide => Box::new(AnalogSource::new(
            name,
            SourceId::NitrogenDioxide,
            SimulatedAnalog::new(NO2_BASELINE, 150, faults),
        )),
        SensorKind::Dust => Box::new(AnalogSource::new(
            name,
            SourceId::Dust,
            SimulatedAnalog::new(DUST_BASELINE, 300, faults),
        )),
        SensorKind::Inertial => Box::new(InertialSource::new(name, SimulatedInertial::new(faults))),
        SensorKind::Gps => Box::new(GpsSource::new(
            name,
            SimulatedGps::new(GPS_ACQUIRE_AFTER, faults),
        )),
    };
    Ok(source)
}

/// Oxygen source averaging the configured number of samples, if any.
fn oxygen_source<D: capabilities::OxygenDevice>(
    name: &str,
    device: D,
    definition: &SensorDefinition,
) -> OxygenSource<D> {
    let source = OxygenSource::new(name, device);
    match definition.samples {
        Some(samples) => source.with_samples(samples),
        None => source,
    }
}
