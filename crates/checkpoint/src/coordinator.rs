//! Checkpoint coordinator: triggers snapshots, retries failed writes, and
//! restores the newest completed checkpoint on startup.

use anyhow::Result;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use sluice_core::EngineError;
use sluice_state::StateBackend;

use crate::config::CheckpointConfig;
use crate::storage::FsCheckpointStorage;
use crate::types::{now_millis, CheckpointManifest, CheckpointStats, CompletedCheckpoint};

/// Coordinates checkpoints for one job.
///
/// Checkpoint ids are assigned monotonically and never reused, including
/// for failed attempts. A checkpoint that exhausts its write attempts
/// marks the coordinator unhealthy and surfaces
/// [`EngineError::CheckpointWrite`]; it is never reported as successful.
pub struct CheckpointCoordinator {
    backend: Arc<dyn StateBackend>,
    storage: FsCheckpointStorage,
    config: CheckpointConfig,
    next_checkpoint_id: RwLock<u64>,
    last_trigger: RwLock<Instant>,
    healthy: AtomicBool,
    stats: RwLock<CheckpointStats>,
}

impl CheckpointCoordinator {
    pub fn new(backend: Arc<dyn StateBackend>, config: CheckpointConfig) -> Self {
        let storage = FsCheckpointStorage::new(&config.dir);
        Self {
            backend,
            storage,
            config,
            next_checkpoint_id: RwLock::new(1),
            last_trigger: RwLock::new(Instant::now()),
            healthy: AtomicBool::new(true),
            stats: RwLock::new(CheckpointStats::default()),
        }
    }

    /// Whether the last checkpoint attempt succeeded (or none ran yet).
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CheckpointStats {
        self.stats.read().clone()
    }

    /// Trigger a checkpoint if the configured interval has elapsed since
    /// construction or the last checkpoint.
    pub async fn maybe_checkpoint(&self, source_offset: u64) -> Result<Option<CompletedCheckpoint>> {
        if self.last_trigger.read().elapsed() < self.config.interval {
            return Ok(None);
        }
        self.trigger_checkpoint(source_offset).await.map(Some)
    }

    /// Run one checkpoint now, retrying writes with doubling backoff.
    pub async fn trigger_checkpoint(&self, source_offset: u64) -> Result<CompletedCheckpoint> {
        let checkpoint_id = {
            let mut next = self.next_checkpoint_id.write();
            let id = *next;
            *next += 1;
            id
        };
        *self.last_trigger.write() = Instant::now();
        self.stats.write().total_checkpoints += 1;

        let started = Instant::now();
        let mut backoff = self.config.retry_backoff;
        let mut last_err = String::new();

        for attempt in 1..=self.config.max_attempts {
            match self.write_checkpoint(checkpoint_id, source_offset).await {
                Ok(completed) => {
                    let completed = CompletedCheckpoint { duration: started.elapsed(), ..completed };
                    self.healthy.store(true, Ordering::Release);
                    {
                        let mut stats = self.stats.write();
                        stats.completed_checkpoints += 1;
                        stats.total_size_bytes += completed.state.size;
                        stats.last_checkpoint_id = Some(checkpoint_id);
                        stats.last_checkpoint_duration = Some(completed.duration);
                    }
                    info!(
                        checkpoint_id,
                        source_offset,
                        size = completed.state.size,
                        duration_ms = completed.duration.as_millis() as u64,
                        "checkpoint complete"
                    );
                    self.prune_retained().await;
                    return Ok(completed);
                }
                Err(e) => {
                    last_err = format!("{e:#}");
                    warn!(
                        checkpoint_id,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %last_err,
                        "checkpoint attempt failed"
                    );
                    if attempt < self.config.max_attempts {
                        self.stats.write().retried_attempts += 1;
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        // Leave any partial attempt on disk out of the manifest listing by
        // removing its directory; restore only ever sees completed manifests.
        let _ = self.storage.delete(checkpoint_id).await;
        self.healthy.store(false, Ordering::Release);
        self.stats.write().failed_checkpoints += 1;
        error!(checkpoint_id, attempts = self.config.max_attempts, "checkpoint failed, coordinator unhealthy");
        Err(EngineError::CheckpointWrite {
            checkpoint_id,
            attempts: self.config.max_attempts,
            reason: last_err,
        }
        .into())
    }

    async fn write_checkpoint(
        &self,
        checkpoint_id: u64,
        source_offset: u64,
    ) -> Result<CompletedCheckpoint> {
        let dir = self.storage.prepare_dir(checkpoint_id).await?;
        let state = self.backend.snapshot(checkpoint_id, &dir).await?;
        let timestamp = now_millis();
        let manifest = CheckpointManifest {
            checkpoint_id,
            timestamp,
            source_offset,
            backend: self.backend.name().to_string(),
            stores: self.backend.summaries(),
            state: state.clone(),
        };
        self.storage.write_manifest(&manifest).await?;
        Ok(CompletedCheckpoint {
            checkpoint_id,
            timestamp,
            duration: std::time::Duration::ZERO,
            state,
        })
    }

    async fn prune_retained(&self) {
        let ids = match self.storage.list_checkpoints().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list checkpoints for retention");
                return;
            }
        };
        if ids.len() <= self.config.num_retained {
            return;
        }
        let excess = ids.len() - self.config.num_retained;
        for id in &ids[..excess] {
            if let Err(e) = self.storage.delete(*id).await {
                warn!(checkpoint_id = id, error = %e, "could not prune checkpoint");
            }
        }
    }

    /// Restore state from the newest completed checkpoint, if any.
    ///
    /// Returns the manifest restored from so the host can rewind its source
    /// to `source_offset`. Checkpoint ids continue after the restored one.
    pub async fn restore_latest(&self) -> Result<Option<CheckpointManifest>> {
        let ids = self.storage.list_checkpoints().await?;
        let Some(&latest) = ids.last() else {
            info!("no checkpoint found, starting fresh");
            return Ok(None);
        };
        let manifest = self.storage.read_manifest(latest).await?;
        self.backend.restore(&manifest.state).await?;
        *self.next_checkpoint_id.write() = latest + 1;
        info!(
            checkpoint_id = latest,
            source_offset = manifest.source_offset,
            "restored from checkpoint"
        );
        Ok(Some(manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use sluice_core::{Namespace, StateHandle};
    use sluice_state::{MemoryStateBackend, RawStateStore};
    use std::path::Path;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn fast_config(dir: &Path) -> CheckpointConfig {
        CheckpointConfig::new(dir)
            .interval(Duration::from_millis(1))
            .retry_backoff(Duration::from_millis(1))
    }

    /// Backend whose snapshot fails the first `failures` times.
    struct FlakyBackend {
        inner: MemoryStateBackend,
        failures: AtomicU32,
    }

    #[async_trait]
    impl StateBackend for FlakyBackend {
        fn store(&self, operator_id: &str) -> Result<Arc<dyn RawStateStore>> {
            self.inner.store(operator_id)
        }

        async fn snapshot(&self, checkpoint_id: u64, dir: &Path) -> Result<StateHandle> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("simulated write failure");
            }
            self.inner.snapshot(checkpoint_id, dir).await
        }

        async fn restore(&self, handle: &StateHandle) -> Result<()> {
            self.inner.restore(handle).await
        }

        fn summaries(&self) -> Vec<sluice_core::StoreSummary> {
            self.inner.summaries()
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn seeded_backend() -> Arc<MemoryStateBackend> {
        let backend = Arc::new(MemoryStateBackend::new());
        let store = backend.store("op").unwrap();
        store.bind(Namespace::global(b"k".to_vec()));
        store.put("cell", Bytes::from_static(b"v")).unwrap();
        backend
    }

    #[tokio::test]
    async fn checkpoint_ids_are_monotonic() {
        let tmp = tempfile::tempdir().unwrap();
        let coord = CheckpointCoordinator::new(seeded_backend(), fast_config(tmp.path()));

        let a = coord.trigger_checkpoint(5).await.unwrap();
        let b = coord.trigger_checkpoint(9).await.unwrap();
        assert_eq!(a.checkpoint_id, 1);
        assert_eq!(b.checkpoint_id, 2);
        assert!(coord.is_healthy());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FlakyBackend {
            inner: MemoryStateBackend::new(),
            failures: AtomicU32::new(2),
        });
        let coord = CheckpointCoordinator::new(backend, fast_config(tmp.path()));

        let completed = coord.trigger_checkpoint(0).await.unwrap();
        assert_eq!(completed.checkpoint_id, 1);
        assert!(coord.is_healthy());
        assert_eq!(coord.stats().retried_attempts, 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_mark_unhealthy_and_burn_the_id() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FlakyBackend {
            inner: MemoryStateBackend::new(),
            failures: AtomicU32::new(3),
        });
        let coord = CheckpointCoordinator::new(backend, fast_config(tmp.path()));

        let err = coord.trigger_checkpoint(0).await.unwrap_err();
        let engine_err = err.downcast::<EngineError>().unwrap();
        match engine_err {
            EngineError::CheckpointWrite { checkpoint_id, attempts, .. } => {
                assert_eq!(checkpoint_id, 1);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!coord.is_healthy());

        // The failed id is never reused and no manifest was left behind.
        let next = coord.trigger_checkpoint(1).await.unwrap();
        assert_eq!(next.checkpoint_id, 2);
        assert!(coord.is_healthy());
        let storage = FsCheckpointStorage::new(tmp.path());
        assert_eq!(storage.list_checkpoints().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn retention_keeps_newest_n() {
        let tmp = tempfile::tempdir().unwrap();
        let config = fast_config(tmp.path()).num_retained(2);
        let coord = CheckpointCoordinator::new(seeded_backend(), config);

        for offset in 0..4 {
            coord.trigger_checkpoint(offset).await.unwrap();
        }
        let storage = FsCheckpointStorage::new(tmp.path());
        assert_eq!(storage.list_checkpoints().await.unwrap(), vec![3, 4]);
    }

    #[tokio::test]
    async fn restore_latest_picks_highest_id_and_continues_numbering() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = seeded_backend();
        let coord = CheckpointCoordinator::new(backend, fast_config(tmp.path()));
        coord.trigger_checkpoint(10).await.unwrap();
        coord.trigger_checkpoint(20).await.unwrap();

        // Fresh backend and coordinator over the same directory.
        let backend2 = Arc::new(MemoryStateBackend::new());
        let coord2 = CheckpointCoordinator::new(backend2.clone(), fast_config(tmp.path()));
        let manifest = coord2.restore_latest().await.unwrap().unwrap();
        assert_eq!(manifest.checkpoint_id, 2);
        assert_eq!(manifest.source_offset, 20);
        assert_eq!(
            manifest.stores,
            vec![sluice_core::StoreSummary { operator_id: "op".into(), namespaces: 1 }]
        );

        let store = backend2.store("op").unwrap();
        store.bind(Namespace::global(b"k".to_vec()));
        assert_eq!(store.get("cell").unwrap(), Some(Bytes::from_static(b"v")));

        let next = coord2.trigger_checkpoint(30).await.unwrap();
        assert_eq!(next.checkpoint_id, 3);
    }

    #[tokio::test]
    async fn restore_with_no_checkpoints_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let coord = CheckpointCoordinator::new(seeded_backend(), fast_config(tmp.path()));
        assert!(coord.restore_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn maybe_checkpoint_respects_interval() {
        let tmp = tempfile::tempdir().unwrap();
        let config = CheckpointConfig::new(tmp.path()).interval(Duration::from_secs(3600));
        let coord = CheckpointCoordinator::new(seeded_backend(), config);

        // The interval starts counting at construction, so nothing is due
        // on the first record.
        assert!(coord.maybe_checkpoint(0).await.unwrap().is_none());
        assert!(coord.maybe_checkpoint(1).await.unwrap().is_none());

        let tmp = tempfile::tempdir().unwrap();
        let config = CheckpointConfig::new(tmp.path()).interval(Duration::ZERO);
        let coord = CheckpointCoordinator::new(seeded_backend(), config);
        assert!(coord.maybe_checkpoint(0).await.unwrap().is_some());
        assert!(coord.maybe_checkpoint(1).await.unwrap().is_some());
    }
}
