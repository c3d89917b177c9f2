//! Producer loop.
//!
//! Every iteration polls each registered source once, in registration order, and
//! appends everything the iteration produced to the shared buffer in one locked
//! append. Polling happens entirely outside the lock.
//!
//! Cadence is best-effort: an iteration that finishes early sleeps for the rest of
//! the interval, an iteration that overran starts the next one immediately. Missed
//! iterations are never made up.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::config::SamplerConfig;
use crate::error::TelemetryError;
use crate::reading::{MissionClock, Reading};
use crate::sensor::SensorSource;
use crate::shutdown::ShutdownSignal;

/// Counters accumulated over the sampler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Completed iterations
    pub cycles: u64,
    /// Readings appended to the buffer
    pub readings: u64,
    /// Source polls that failed, timed out or panicked
    pub sensor_faults: u64,
    /// Iterations that took longer than the interval
    pub overruns: u64,
}

/// Result of a single iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Readings appended this iteration
    pub readings: usize,
    /// Sources that produced nothing because of a fault
    pub faults: usize,
}

/// Fixed-cadence sampling loop over a fixed set of sources.
pub struct Sampler {
    sources: Vec<Box<dyn SensorSource>>,
    buffer: SharedBuffer,
    clock: MissionClock,
    interval: Duration,
    poll_timeout: Duration,
}

impl Sampler {
    /// Create a sampler appending to `buffer`.
    pub fn new(
        sources: Vec<Box<dyn SensorSource>>,
        buffer: SharedBuffer,
        clock: MissionClock,
        config: &SamplerConfig,
    ) -> Self {
        Self {
            sources,
            buffer,
            clock,
            interval: config.interval(),
            poll_timeout: config.poll_timeout(),
        }
    }

    /// Names of the registered sources, in poll order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run until `shutdown` fires, then return the accumulated counters.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> SamplerStats {
        let mut stats = SamplerStats::default();
        info!(
            sources = self.sources.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Sampler started"
        );

        while !shutdown.is_triggered() {
            let started = Instant::now();
            let outcome = self.sample_once().await;

            stats.cycles += 1;
            stats.readings += outcome.readings as u64;
            stats.sensor_faults += outcome.faults as u64;

            let elapsed = started.elapsed();
            debug!(
                readings = outcome.readings,
                elapsed_ms = elapsed.as_millis() as u64,
                "Sampling iteration complete"
            );

            if elapsed < self.interval {
                tokio::select! {
                    _ = sleep(self.interval - elapsed) => {}
                    _ = shutdown.triggered() => break,
                }
            } else {
                stats.overruns += 1;
                info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Behind schedule, skipping sleep"
                );
            }
        }

        info!(
            cycles = stats.cycles,
            readings = stats.readings,
            sensor_faults = stats.sensor_faults,
            overruns = stats.overruns,
            "Sampler stopped"
        );
        stats
    }

    /// Poll every source once and append the results in one locked append.
    pub async fn sample_once(&mut self) -> CycleOutcome {
        let mut cycle: Vec<Reading> = Vec::new();
        let mut faults = 0;

        for source in self.sources.iter_mut() {
            let poll = AssertUnwindSafe(source.poll(&self.clock)).catch_unwind();
            match timeout(self.poll_timeout, poll).await {
                Ok(Ok(Ok(readings))) => cycle.extend(readings),
                Ok(Ok(Err(err))) => {
                    faults += 1;
                    warn!(sensor = source.name(), error = %err, "Error getting data from sensor");
                }
                Ok(Err(_panic)) => {
                    faults += 1;
                    warn!(sensor = source.name(), "Sensor poll panicked");
                }
                Err(_elapsed) => {
                    faults += 1;
                    let err = TelemetryError::SensorTimeout {
                        sensor: source.name().to_string(),
                        timeout_ms: self.poll_timeout.as_millis() as u64,
                    };
                    warn!(sensor = source.name(), error = %err, "Sensor poll timed out");
                }
            }
        }

        let readings = cycle.len();
        self.buffer.append(cycle);
        CycleOutcome { readings, faults }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SourceId;
    use crate::shutdown;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use tracing_test::traced_test;

    enum Behaviour {
        Emit(SourceId, usize),
        Fail,
        Hang,
        Panic,
        Slow(Duration),
    }

    struct TestSource {
        name: &'static str,
        behaviour: Behaviour,
    }

    fn source(name: &'static str, behaviour: Behaviour) -> Box<dyn SensorSource> {
        Box::new(TestSource { name, behaviour })
    }

    #[async_trait]
    impl SensorSource for TestSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn poll(&mut self, clock: &MissionClock) -> Result<Vec<Reading>> {
            match &self.behaviour {
                Behaviour::Emit(id, count) => Ok((0..*count)
                    .map(|i| Reading::new(*id, clock.now_ms(), i.to_string()))
                    .collect()),
                Behaviour::Fail => bail!("device not responding"),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(vec![])
                }
                Behaviour::Panic => panic!("driver bug"),
                Behaviour::Slow(delay) => {
                    sleep(*delay).await;
                    Ok(vec![Reading::new(SourceId::Dust, clock.now_ms(), "1")])
                }
            }
        }
    }

    fn config(interval_ms: u64, poll_timeout_ms: u64) -> SamplerConfig {
        SamplerConfig {
            interval_ms,
            poll_timeout_ms,
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn failing_source_does_not_block_the_next_one() {
        let buffer = SharedBuffer::new();
        let mut sampler = Sampler::new(
            vec![
                source("oxygen", Behaviour::Fail),
                source("environmental", Behaviour::Emit(SourceId::EnvTemperature, 4)),
            ],
            buffer.clone(),
            MissionClock::start(),
            &config(1000, 100),
        );

        let outcome = sampler.sample_once().await;
        assert_eq!(outcome, CycleOutcome { readings: 4, faults: 1 });
        assert_eq!(buffer.drain_all().len(), 4);
        assert!(logs_contain("oxygen"));
        assert!(logs_contain("device not responding"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_source_times_out_and_later_sources_still_run() {
        let buffer = SharedBuffer::new();
        let mut sampler = Sampler::new(
            vec![
                source("gps", Behaviour::Hang),
                source("dust", Behaviour::Emit(SourceId::Dust, 1)),
            ],
            buffer.clone(),
            MissionClock::start(),
            &config(1000, 50),
        );

        let outcome = sampler.sample_once().await;
        assert_eq!(outcome, CycleOutcome { readings: 1, faults: 1 });
        assert_eq!(buffer.drain_all()[0].source_id(), SourceId::Dust);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_source_is_contained() {
        let buffer = SharedBuffer::new();
        let mut sampler = Sampler::new(
            vec![
                source("inertial", Behaviour::Panic),
                source("dust", Behaviour::Emit(SourceId::Dust, 1)),
            ],
            buffer.clone(),
            MissionClock::start(),
            &config(1000, 50),
        );

        let outcome = sampler.sample_once().await;
        assert_eq!(outcome, CycleOutcome { readings: 1, faults: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn failed_source_is_polled_again_next_cycle() {
        let buffer = SharedBuffer::new();
        let mut sampler = Sampler::new(
            vec![source("oxygen", Behaviour::Fail)],
            buffer.clone(),
            MissionClock::start(),
            &config(1000, 50),
        );

        assert_eq!(sampler.sample_once().await.faults, 1);
        assert_eq!(sampler.sample_once().await.faults, 1);
        assert_eq!(sampler.source_names(), vec!["oxygen"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_cadence_and_stops_on_shutdown() {
        let buffer = SharedBuffer::new();
        let sampler = Sampler::new(
            vec![source("dust", Behaviour::Emit(SourceId::Dust, 2))],
            buffer.clone(),
            MissionClock::start(),
            &config(100, 50),
        );
        let (trigger, signal) = shutdown::channel();
        let handle = tokio::spawn(sampler.run(signal));

        sleep(Duration::from_millis(350)).await;
        trigger.trigger();
        let stats = handle.await.expect("sampler task panicked");

        assert!((3..=4).contains(&stats.cycles), "cycles = {}", stats.cycles);
        assert_eq!(stats.readings, stats.cycles * 2);
        assert_eq!(stats.overruns, 0);
        assert_eq!(buffer.len() as u64, stats.readings);

        let stamps: Vec<u64> = buffer
            .drain_all()
            .iter()
            .map(Reading::timestamp_ms)
            .step_by(2)
            .collect();
        assert_eq!(&stamps[..3], &[0, 100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_iteration_skips_sleep() {
        let buffer = SharedBuffer::new();
        let sampler = Sampler::new(
            vec![source("slow", Behaviour::Slow(Duration::from_millis(150)))],
            buffer.clone(),
            MissionClock::start(),
            &config(100, 1000),
        );
        let (trigger, signal) = shutdown::channel();
        let handle = tokio::spawn(sampler.run(signal));

        sleep(Duration::from_millis(460)).await;
        trigger.trigger();
        let stats = handle.await.expect("sampler task panicked");

        assert!(stats.cycles >= 3, "cycles = {}", stats.cycles);
        assert_eq!(stats.overruns, stats.cycles);

        // Back-to-back iterations: each reading is 150 ms after the previous one.
        let stamps: Vec<u64> = buffer.drain_all().iter().map(Reading::timestamp_ms).collect();
        assert_eq!(&stamps[..3], &[150, 300, 450]);
    }
}
