//! Host platform health source.
//!
//! Reports free/used memory, core temperature and the platform identity strings
//! (ids 4-11), plus the one-time mount status of the first two storage volumes
//! (ids 12, 13). The identity strings never change during a run, so they are
//! captured once at construction.
//!
//! This source only fails if the host itself does; a missing thermal sensor just
//! drops the core temperature reading.

use anyhow::Result;
use async_trait::async_trait;
use sysinfo::{Components, System};

use super::SensorSource;
use crate::reading::{MissionClock, Reading, SourceId};

const UNKNOWN: &str = "unknown";

/// Memory, thermal and identity readings for the host running the pipeline.
pub struct PlatformSource {
    system: System,
    components: Components,
    identity: [(SourceId, String); 5],
    volume_status: Vec<(SourceId, bool)>,
}

impl PlatformSource {
    /// Query the host once for identity strings and thermal sensors.
    pub fn new() -> Self {
        let node_name = hostname::get()
            .ok()
            .map(|name| name.to_string_lossy().into_owned())
            .or_else(System::host_name)
            .unwrap_or_else(|| UNKNOWN.to_string());

        let identity = [
            (
                SourceId::SysName,
                System::name().unwrap_or_else(|| UNKNOWN.to_string()),
            ),
            (SourceId::NodeName, node_name),
            (
                SourceId::Release,
                System::kernel_version().unwrap_or_else(|| UNKNOWN.to_string()),
            ),
            (
                SourceId::Version,
                System::os_version().unwrap_or_else(|| UNKNOWN.to_string()),
            ),
            (SourceId::Machine, std::env::consts::ARCH.to_string()),
        ];

        Self {
            system: System::new(),
            components: Components::new_with_refreshed_list(),
            identity,
            volume_status: Vec::new(),
        }
    }

    /// Report the mount status of the first two storage volumes on every poll.
    ///
    /// Extra flags beyond the second volume are ignored: the channel enumeration
    /// only has room for two.
    pub fn with_volume_status(mut self, mounted: &[bool]) -> Self {
        self.volume_status = [SourceId::Volume1Mounted, SourceId::Volume2Mounted]
            .into_iter()
            .zip(mounted.iter().copied())
            .collect();
        self
    }

    fn core_temperature(&mut self) -> Option<f32> {
        let components = self.components.list_mut();
        for component in components.iter_mut() {
            component.refresh();
        }

        let is_core = |label: &str| {
            let label = label.to_ascii_lowercase();
            ["cpu", "core", "package", "soc"]
                .iter()
                .any(|needle| label.contains(needle))
        };

        components
            .iter()
            .find(|c| is_core(c.label()))
            .or_else(|| components.first())
            .map(|c| c.temperature())
            .filter(|t| t.is_finite())
    }
}

impl Default for PlatformSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorSource for PlatformSource {
    fn name(&self) -> &str {
        "platform"
    }

    async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
        self.system.refresh_memory();
        let free_kib = self.system.free_memory() as f64 / 1024.0;
        let used_kib = self.system.used_memory() as f64 / 1024.0;
        let core_temperature = self.core_temperature();
        let t = clock.now_ms();

        let mut readings = Vec::with_capacity(8 + self.volume_status.len());
        readings.push(Reading::new(SourceId::RamFree, t, format!("{free_kib:.1}")));
        readings.push(Reading::new(SourceId::RamUsed, t, format!("{used_kib:.1}")));
        if let Some(celsius) = core_temperature {
            readings.push(Reading::new(
                SourceId::CoreTemperature,
                t,
                format!("{celsius:.1}"),
            ));
        }
        for (id, value) in &self.identity {
            readings.push(Reading::new(*id, t, value.clone()));
        }
        for (id, mounted) in &self.volume_status {
            readings.push(Reading::new(*id, t, mounted.to_string()));
        }
        Ok(readings)
    }
}
