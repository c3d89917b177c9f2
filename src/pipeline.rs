//! Wiring of the two loops.
//!
//! [`Pipeline`] owns everything needed to start acquisition. [`Pipeline::spawn`]
//! starts the sampler and the dispatcher as two tasks sharing one buffer and
//! returns a [`PipelineHandle`]. Shutdown stops the sampler first and waits for
//! it, then stops the dispatcher, whose final drain picks up the sampler's last
//! iteration.

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use crate::buffer::SharedBuffer;
use crate::config::TelemetryConfig;
use crate::dispatcher::{Dispatcher, DispatcherStats};
use crate::radio::RadioUplink;
use crate::reading::MissionClock;
use crate::sampler::{Sampler, SamplerStats};
use crate::sensor::SensorSource;
use crate::shutdown::{self, ShutdownTrigger};
use crate::storage::StorageFanout;

/// Everything needed to start acquisition for one run.
pub struct Pipeline {
    sampler: Sampler,
    dispatcher: Dispatcher,
}

impl Pipeline {
    /// Assemble a pipeline for run number `run`.
    ///
    /// Storage targets should already be mounted.
    pub fn new(
        config: &TelemetryConfig,
        run: u64,
        sources: Vec<Box<dyn SensorSource>>,
        storage: StorageFanout,
        radio: RadioUplink,
    ) -> Self {
        let buffer = SharedBuffer::new();
        let sampler = Sampler::new(
            sources,
            buffer.clone(),
            MissionClock::start(),
            &config.sampler,
        );
        let dispatcher = Dispatcher::new(
            buffer,
            storage,
            radio,
            config.dispatcher.file_name(run),
            config.dispatcher.interval(),
        );
        Self {
            sampler,
            dispatcher,
        }
    }

    /// Start both loops on the current runtime.
    pub fn spawn(self) -> PipelineHandle {
        let (sampler_stop, sampler_signal) = shutdown::channel();
        let (dispatcher_stop, dispatcher_signal) = shutdown::channel();

        info!(
            sources = ?self.sampler.source_names(),
            file = %self.dispatcher.file_name(),
            "Starting pipeline"
        );

        let sampler = tokio::spawn(self.sampler.run(sampler_signal));
        let dispatcher = tokio::spawn(self.dispatcher.run(dispatcher_signal));

        PipelineHandle {
            sampler,
            dispatcher,
            sampler_stop,
            dispatcher_stop,
        }
    }
}

/// Counters from both loops after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Sampler counters
    pub sampler: SamplerStats,
    /// Dispatcher counters
    pub dispatcher: DispatcherStats,
}

/// Running pipeline.
pub struct PipelineHandle {
    sampler: JoinHandle<SamplerStats>,
    dispatcher: JoinHandle<DispatcherStats>,
    sampler_stop: ShutdownTrigger,
    dispatcher_stop: ShutdownTrigger,
}

impl PipelineHandle {
    /// Stop the sampler, then the dispatcher, and collect their counters.
    ///
    /// Every reading the sampler appended is dispatched before this returns.
    pub async fn shutdown(self) -> Result<PipelineStats> {
        self.sampler_stop.trigger();
        let sampler = self.sampler.await.context("sampler task failed")?;

        self.dispatcher_stop.trigger();
        let dispatcher = self.dispatcher.await.context("dispatcher task failed")?;

        info!(
            sampled = sampler.readings,
            dispatched = dispatcher.readings,
            "Pipeline stopped"
        );
        Ok(PipelineStats {
            sampler,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Reading, SourceId};
    use crate::storage::StorageVolume;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::time::{sleep, Duration};

    struct Counter(u64);

    #[async_trait]
    impl SensorSource for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
            self.0 += 1;
            Ok(vec![Reading::new(SourceId::Dust, clock.now_ms(), self.0.to_string())])
        }
    }

    #[derive(Clone, Default)]
    struct MemoryVolume(Arc<Mutex<String>>);

    #[async_trait]
    impl StorageVolume for MemoryVolume {
        async fn mount(&mut self) -> Result<()> {
            Ok(())
        }

        async fn append(&mut self, _path: &str, text: &str) -> Result<()> {
            self.0.lock().unwrap().push_str(text);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_dispatches_every_sampled_reading() {
        let mut config = TelemetryConfig::default();
        config.sampler.interval_ms = 10;
        config.dispatcher.interval_ms = 35;

        let volume = MemoryVolume::default();
        let mut storage = StorageFanout::new().with_target("sd1", Box::new(volume.clone()));
        storage.mount_all().await;

        let pipeline = Pipeline::new(
            &config,
            3,
            vec![Box::new(Counter(0))],
            storage,
            RadioUplink::disabled(),
        );
        let handle = pipeline.spawn();
        sleep(Duration::from_millis(200)).await;
        let stats = handle.shutdown().await.unwrap();

        assert!(stats.sampler.readings >= 10);
        assert_eq!(stats.sampler.readings, stats.dispatcher.readings);
        assert_eq!(stats.dispatcher.radio_failures, stats.dispatcher.cycles);

        let written = volume.0.lock().unwrap().clone();
        let values: Vec<u64> = written
            .lines()
            .map(|line| line.trim_end_matches(';').rsplit(',').next().unwrap().parse().unwrap())
            .collect();
        let expected: Vec<u64> = (1..=stats.sampler.readings).collect();
        assert_eq!(values, expected);
    }
}
