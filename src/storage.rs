//! Storage fan-out.
//!
//! A [`StorageFanout`] holds every storage target the payload carries (SD cards,
//! flash partitions, ...). Each target is mounted once at startup; a target that
//! never mounts stays registered and is skipped by every later write. Writes go to
//! every target in registration order and one target's failure never stops the
//! rest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{TelemetryError, TelemetryResult};

/// A mountable file volume.
#[async_trait]
pub trait StorageVolume: Send {
    /// Bring the volume up. Called once, before any `append`.
    async fn mount(&mut self) -> Result<()>;

    /// Append `text` to the file at `path`, relative to the volume root,
    /// creating the file if needed.
    async fn append(&mut self, path: &str, text: &str) -> Result<()>;
}

/// Volume rooted at a host directory.
///
/// Mounting creates the directory if needed and checks it is writable.
pub struct DirectoryVolume {
    root: PathBuf,
}

impl DirectoryVolume {
    const WRITE_CHECK_FILE: &'static str = ".mount-check";

    /// Create a volume rooted at `root`. Nothing touches the disk until `mount`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageVolume for DirectoryVolume {
    async fn mount(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating {}", self.root.display()))?;

        let check = self.root.join(Self::WRITE_CHECK_FILE);
        fs::write(&check, b"")
            .await
            .with_context(|| format!("{} is not writable", self.root.display()))?;
        fs::remove_file(&check).await?;
        Ok(())
    }

    async fn append(&mut self, path: &str, text: &str) -> Result<()> {
        let full = self.root.join(path);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await
            .with_context(|| format!("opening {}", full.display()))?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// One named volume and whether it mounted.
pub struct StorageTarget {
    name: String,
    volume: Box<dyn StorageVolume>,
    mounted: bool,
}

impl StorageTarget {
    /// Name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the startup mount succeeded.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

/// Outcome of one target in a [`StorageFanout::write_all`].
#[derive(Debug)]
pub struct TargetWrite {
    /// Target name
    pub target: String,
    /// `Ok` when the text was appended
    pub result: TelemetryResult<()>,
}

/// Ordered set of storage targets written as a unit.
#[derive(Default)]
pub struct StorageFanout {
    targets: Vec<StorageTarget>,
}

impl StorageFanout {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a volume. It starts unmounted.
    pub fn add(&mut self, name: impl Into<String>, volume: Box<dyn StorageVolume>) {
        self.targets.push(StorageTarget {
            name: name.into(),
            volume,
            mounted: false,
        });
    }

    /// Builder form of [`add`](Self::add).
    pub fn with_target(mut self, name: impl Into<String>, volume: Box<dyn StorageVolume>) -> Self {
        self.add(name, volume);
        self
    }

    /// Registered targets, in write order.
    pub fn targets(&self) -> &[StorageTarget] {
        &self.targets
    }

    /// Mount every target once. Failures are logged and leave the target unmounted.
    ///
    /// Returns the mount status of each target, in registration order.
    pub async fn mount_all(&mut self) -> Vec<bool> {
        for target in self.targets.iter_mut() {
            match target.volume.mount().await {
                Ok(()) => {
                    target.mounted = true;
                    info!(target = %target.name, "Storage target mounted");
                }
                Err(err) => {
                    target.mounted = false;
                    let err = TelemetryError::StorageMount {
                        target: target.name.clone(),
                        reason: format!("{err:#}"),
                    };
                    warn!(target = %target.name, error = %err, "Storage target unavailable");
                }
            }
        }
        self.mounted_flags()
    }

    /// Mount status of each target, in registration order.
    pub fn mounted_flags(&self) -> Vec<bool> {
        self.targets.iter().map(|t| t.mounted).collect()
    }

    /// Append `text` to `file_name` on every target.
    ///
    /// Unmounted targets are skipped and reported as `StorageUnmounted`; a failed
    /// write is logged and reported, and the remaining targets are still written.
    pub async fn write_all(&mut self, file_name: &str, text: &str) -> Vec<TargetWrite> {
        let mut outcomes = Vec::with_capacity(self.targets.len());

        for target in self.targets.iter_mut() {
            let result = if !target.mounted {
                debug!(target = %target.name, "Skipping unmounted storage target");
                Err(TelemetryError::StorageUnmounted {
                    target: target.name.clone(),
                })
            } else {
                match target.volume.append(file_name, text).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        let err = TelemetryError::StorageWrite {
                            target: target.name.clone(),
                            file: file_name.to_string(),
                            reason: format!("{err:#}"),
                        };
                        warn!(target = %target.name, error = %err, "Error writing to storage target");
                        Err(err)
                    }
                }
            };
            outcomes.push(TargetWrite {
                target: target.name.clone(),
                result,
            });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Volume whose behaviour is scripted and whose writes are recorded.
    #[derive(Clone, Default)]
    struct FakeVolume {
        refuse_mount: bool,
        refuse_writes: bool,
        written: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl StorageVolume for FakeVolume {
        async fn mount(&mut self) -> Result<()> {
            if self.refuse_mount {
                bail!("no card in slot");
            }
            Ok(())
        }

        async fn append(&mut self, path: &str, text: &str) -> Result<()> {
            if self.refuse_writes {
                bail!("write protected");
            }
            self.written
                .lock()
                .unwrap()
                .push((path.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn unmounted_target_is_skipped_and_mounted_one_gets_the_batch() {
        let missing = FakeVolume {
            refuse_mount: true,
            ..Default::default()
        };
        let present = FakeVolume::default();
        let mut fanout = StorageFanout::new()
            .with_target("sd1", Box::new(missing.clone()))
            .with_target("sd2", Box::new(present.clone()));

        assert_eq!(fanout.mount_all().await, vec![false, true]);

        let outcomes = fanout.write_all("data-1.csv", "0,100,21.5;\n").await;
        assert!(matches!(
            outcomes[0].result,
            Err(TelemetryError::StorageUnmounted { .. })
        ));
        assert!(outcomes[1].result.is_ok());
        assert!(missing.written.lock().unwrap().is_empty());
        assert_eq!(
            *present.written.lock().unwrap(),
            vec![("data-1.csv".to_string(), "0,100,21.5;\n".to_string())]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_write_does_not_stop_later_targets() {
        let broken = FakeVolume {
            refuse_writes: true,
            ..Default::default()
        };
        let healthy = FakeVolume::default();
        let mut fanout = StorageFanout::new()
            .with_target("flash", Box::new(broken))
            .with_target("sd1", Box::new(healthy.clone()));
        fanout.mount_all().await;

        let outcomes = fanout.write_all("data-2.csv", "x").await;
        let err = outcomes[0].result.as_ref().unwrap_err();
        assert!(err.to_string().contains("flash"));
        assert!(err.to_string().contains("write protected"));
        assert!(outcomes[1].result.is_ok());
        assert_eq!(healthy.written.lock().unwrap().len(), 1);
        assert!(logs_contain("Error writing to storage target"));
        assert!(logs_contain("flash"));
    }

    #[tokio::test]
    async fn directory_volume_appends_across_writes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("sd1");
        let mut volume = DirectoryVolume::new(&root);

        volume.mount().await.unwrap();
        volume.append("data-1.csv", "0,1,a;\n").await.unwrap();
        volume.append("data-1.csv", "0,2,b;\n").await.unwrap();

        let contents = std::fs::read_to_string(root.join("data-1.csv")).unwrap();
        assert_eq!(contents, "0,1,a;\n0,2,b;\n");
        assert!(!root.join(DirectoryVolume::WRITE_CHECK_FILE).exists());
    }

    #[tokio::test]
    async fn directory_volume_under_a_file_fails_to_mount() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let mut fanout =
            StorageFanout::new().with_target("sd1", Box::new(DirectoryVolume::new(blocker.join("sd1"))));
        assert_eq!(fanout.mount_all().await, vec![false]);
        assert!(!fanout.targets()[0].is_mounted());
    }
}
