//! Consumer loop.
//!
//! Each cycle drains the shared buffer, encodes the drained readings as one batch
//! and hands that batch to both sinks: the storage fan-out (appending to this
//! run's file) and the radio uplink. The two sinks are independent; either one
//! failing is logged and the other is still called. An empty drain skips both.
//!
//! When shutdown fires the loop does one last drain so nothing the sampler
//! produced before it stopped is left behind.

use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use crate::buffer::SharedBuffer;
use crate::encoding::encode_batch;
use crate::radio::RadioUplink;
use crate::shutdown::ShutdownSignal;
use crate::storage::StorageFanout;

/// Counters accumulated over the dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Cycles that had data to dispatch
    pub cycles: u64,
    /// Readings dispatched
    pub readings: u64,
    /// Storage target writes that failed, unmounted targets included
    pub storage_failures: u64,
    /// Radio sends that failed
    pub radio_failures: u64,
}

/// What one dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Readings in the batch (0 when the drain was empty)
    pub readings: usize,
    /// Targets that stored the batch
    pub stored: usize,
    /// Targets that did not
    pub storage_failures: usize,
    /// Whether the radio accepted the batch
    pub radio_sent: bool,
}

/// Periodic drain-encode-dispatch loop.
pub struct Dispatcher {
    buffer: SharedBuffer,
    storage: StorageFanout,
    radio: RadioUplink,
    file_name: String,
    interval: Duration,
}

impl Dispatcher {
    /// Create a dispatcher writing batches to `file_name` on every storage target.
    pub fn new(
        buffer: SharedBuffer,
        storage: StorageFanout,
        radio: RadioUplink,
        file_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            storage,
            radio,
            file_name: file_name.into(),
            interval,
        }
    }

    /// File this run's batches are appended to.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Run until `shutdown` fires, flush what is left, and return the counters.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> DispatcherStats {
        let mut stats = DispatcherStats::default();
        info!(
            file = %self.file_name,
            interval_ms = self.interval.as_millis() as u64,
            radio = self.radio.is_enabled(),
            "Dispatcher started"
        );

        loop {
            let outcome = self.dispatch_once().await;
            stats.record(&outcome);

            if shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown.triggered() => break,
            }
        }

        let outcome = self.dispatch_once().await;
        stats.record(&outcome);
        if outcome.readings > 0 {
            info!(readings = outcome.readings, "Flushed remaining readings");
        }

        info!(
            cycles = stats.cycles,
            readings = stats.readings,
            storage_failures = stats.storage_failures,
            radio_failures = stats.radio_failures,
            "Dispatcher stopped"
        );
        stats
    }

    /// Drain the buffer once and dispatch whatever was in it.
    pub async fn dispatch_once(&mut self) -> DispatchOutcome {
        let drained = self.buffer.drain_all();
        if drained.is_empty() {
            return DispatchOutcome::default();
        }

        let started = Instant::now();
        let batch = encode_batch(&drained);

        let writes = self.storage.write_all(&self.file_name, &batch).await;
        let stored = writes.iter().filter(|w| w.result.is_ok()).count();

        // Failures are logged by the uplink itself.
        let radio_sent = self.radio.send(&batch).await.is_ok();

        debug!(
            readings = drained.len(),
            bytes = batch.len(),
            stored,
            radio_sent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch dispatched"
        );

        DispatchOutcome {
            readings: drained.len(),
            stored,
            storage_failures: writes.len() - stored,
            radio_sent,
        }
    }
}

impl DispatcherStats {
    fn record(&mut self, outcome: &DispatchOutcome) {
        if outcome.readings == 0 {
            return;
        }
        self.cycles += 1;
        self.readings += outcome.readings as u64;
        self.storage_failures += outcome.storage_failures as u64;
        if !outcome.radio_sent {
            self.radio_failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::radio::RadioTransport;
    use crate::reading::{Reading, SourceId};
    use crate::shutdown;
    use crate::storage::StorageVolume;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingVolume {
        broken: bool,
        written: Arc<Mutex<String>>,
    }

    #[async_trait]
    impl StorageVolume for RecordingVolume {
        async fn mount(&mut self) -> Result<()> {
            Ok(())
        }

        async fn append(&mut self, _path: &str, text: &str) -> Result<()> {
            if self.broken {
                bail!("card removed");
            }
            self.written.lock().unwrap().push_str(text);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTransport {
        broken: bool,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl RadioTransport for RecordingTransport {
        async fn send(&mut self, payload: &[u8], _destination: u8) -> Result<()> {
            if self.broken {
                bail!("no acknowledgement");
            }
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    async fn dispatcher(
        volume: RecordingVolume,
        transport: RecordingTransport,
    ) -> (Dispatcher, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let mut storage = StorageFanout::new().with_target("sd1", Box::new(volume));
        storage.mount_all().await;
        let radio = RadioUplink::new(Box::new(transport), 2);
        let dispatcher = Dispatcher::new(
            buffer.clone(),
            storage,
            radio,
            "data-1.csv",
            Duration::from_millis(100),
        );
        (dispatcher, buffer)
    }

    fn sample_batch() -> Vec<Reading> {
        vec![
            Reading::new(SourceId::EnvTemperature, 100, "21.5"),
            Reading::new(SourceId::RamFree, 100, "120.0"),
        ]
    }

    #[tokio::test]
    async fn batch_goes_to_storage_and_radio() {
        let volume = RecordingVolume::default();
        let transport = RecordingTransport::default();
        let (mut dispatcher, buffer) = dispatcher(volume.clone(), transport.clone()).await;

        buffer.append(sample_batch());
        let outcome = dispatcher.dispatch_once().await;

        assert_eq!(outcome.readings, 2);
        assert!(outcome.radio_sent);
        assert_eq!(*volume.written.lock().unwrap(), "0,100,21.5;\n4,100,120.0;\n");
        assert_eq!(
            transport.sent.lock().unwrap()[0],
            b"0,100,21.5;\n4,100,120.0;\n".to_vec()
        );
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn radio_failure_does_not_prevent_storage() {
        let volume = RecordingVolume::default();
        let transport = RecordingTransport {
            broken: true,
            ..Default::default()
        };
        let (mut dispatcher, buffer) = dispatcher(volume.clone(), transport).await;

        buffer.append(sample_batch());
        let outcome = dispatcher.dispatch_once().await;

        assert!(!outcome.radio_sent);
        assert_eq!(outcome.stored, 1);
        assert!(!volume.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_does_not_prevent_radio() {
        let volume = RecordingVolume {
            broken: true,
            ..Default::default()
        };
        let transport = RecordingTransport::default();
        let (mut dispatcher, buffer) = dispatcher(volume, transport.clone()).await;

        buffer.append(sample_batch());
        let outcome = dispatcher.dispatch_once().await;

        assert_eq!(outcome.storage_failures, 1);
        assert!(outcome.radio_sent);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_drain_touches_neither_sink() {
        let volume = RecordingVolume::default();
        let transport = RecordingTransport::default();
        let (mut dispatcher, _buffer) = dispatcher(volume.clone(), transport.clone()).await;

        assert_eq!(dispatcher.dispatch_once().await, DispatchOutcome::default());
        assert!(volume.written.lock().unwrap().is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_radio_still_stores() {
        let volume = RecordingVolume::default();
        let buffer = SharedBuffer::new();
        let mut storage = StorageFanout::new().with_target("sd1", Box::new(volume.clone()));
        storage.mount_all().await;
        let mut dispatcher = Dispatcher::new(
            buffer.clone(),
            storage,
            RadioUplink::disabled(),
            "data-1.csv",
            Duration::from_millis(100),
        );

        buffer.append(sample_batch());
        let outcome = dispatcher.dispatch_once().await;
        assert!(!outcome.radio_sent);
        assert_eq!(outcome.stored, 1);
        assert!(matches!(
            RadioUplink::disabled().send("x").await,
            Err(TelemetryError::RadioUnavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_what_is_left() {
        let volume = RecordingVolume::default();
        let transport = RecordingTransport::default();
        let (dispatcher, buffer) = dispatcher(volume.clone(), transport).await;
        let (trigger, signal) = shutdown::channel();
        let handle = tokio::spawn(dispatcher.run(signal));

        sleep(Duration::from_millis(150)).await;
        buffer.append(sample_batch());
        trigger.trigger();
        let stats = handle.await.unwrap();

        assert_eq!(stats.readings, 2);
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.radio_failures, 0);
        assert!(buffer.is_empty());
        assert_eq!(*volume.written.lock().unwrap(), "0,100,21.5;\n4,100,120.0;\n");
    }
}
