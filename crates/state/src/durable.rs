//! Durable state backend: in-memory stores with filesystem recovery.
//!
//! State lives in memory between snapshots; `open` scans the snapshot
//! directory and restores the newest snapshot if one exists. Snapshot
//! files are the ones written by `snapshot`, usually on behalf of the
//! checkpoint coordinator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sluice_core::{StateHandle, StoreSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::memory::MemoryStateBackend;
use crate::traits::{RawStateStore, StateBackend};

pub struct DurableStateBackend {
    inner: MemoryStateBackend,
    dir: PathBuf,
}

impl DurableStateBackend {
    /// Open the backend rooted at `dir`, restoring the newest snapshot
    /// found beneath it (searching one level of `chk-*` subdirectories).
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .context("create state directory")?;

        let backend = Self {
            inner: MemoryStateBackend::new(),
            dir: dir.clone(),
        };

        match newest_snapshot(&dir).await? {
            Some((id, path)) => {
                let data = tokio::fs::read(&path).await.context("read state snapshot")?;
                backend.inner.restore_stores(&data)?;
                info!(snapshot_id = id, path = %path.display(), "durable state restored");
            }
            None => {
                debug!(dir = %dir.display(), "no snapshot found, starting empty");
            }
        }

        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Locate the highest-id `state-<id>.bin` under `dir` or its `chk-*` children.
async fn newest_snapshot(dir: &Path) -> Result<Option<(u64, PathBuf)>> {
    let mut newest: Option<(u64, PathBuf)> = None;
    let mut dirs = vec![dir.to_path_buf()];

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if entry.file_type().await?.is_dir() && name.to_string_lossy().starts_with("chk-") {
            dirs.push(entry.path());
        }
    }

    for d in dirs {
        let mut entries = tokio::fs::read_dir(&d).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name
                .strip_prefix("state-")
                .and_then(|rest| rest.strip_suffix(".bin"))
                .and_then(|id| id.parse::<u64>().ok())
            {
                if newest.as_ref().map_or(true, |(best, _)| id > *best) {
                    newest = Some((id, entry.path()));
                }
            }
        }
    }

    Ok(newest)
}

#[async_trait]
impl StateBackend for DurableStateBackend {
    fn store(&self, operator_id: &str) -> Result<Arc<dyn RawStateStore>> {
        self.inner.store(operator_id)
    }

    async fn snapshot(&self, checkpoint_id: u64, dir: &Path) -> Result<StateHandle> {
        self.inner.snapshot(checkpoint_id, dir).await
    }

    async fn restore(&self, handle: &StateHandle) -> Result<()> {
        self.inner.restore(handle).await
    }

    fn summaries(&self) -> Vec<StoreSummary> {
        self.inner.summaries()
    }

    fn name(&self) -> &'static str {
        "durable"
    }
}
