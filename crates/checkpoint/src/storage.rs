//! Filesystem layout for checkpoints: one `chk-<id>` directory per
//! checkpoint, holding the backend's snapshot files plus `manifest.json`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::types::CheckpointManifest;

const MANIFEST_FILE: &str = "manifest.json";
const DIR_PREFIX: &str = "chk-";

/// Checkpoint storage rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FsCheckpointStorage {
    base: PathBuf,
}

impl FsCheckpointStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory for a checkpoint id, e.g. `<base>/chk-42`.
    pub fn checkpoint_dir(&self, checkpoint_id: u64) -> PathBuf {
        self.base.join(format!("{DIR_PREFIX}{checkpoint_id}"))
    }

    /// Create the directory for a checkpoint, including parents.
    pub async fn prepare_dir(&self, checkpoint_id: u64) -> Result<PathBuf> {
        let dir = self.checkpoint_dir(checkpoint_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating checkpoint dir {}", dir.display()))?;
        Ok(dir)
    }

    pub async fn write_manifest(&self, manifest: &CheckpointManifest) -> Result<()> {
        let dir = self.checkpoint_dir(manifest.checkpoint_id);
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(manifest)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing manifest {}", path.display()))?;
        Ok(())
    }

    pub async fn read_manifest(&self, checkpoint_id: u64) -> Result<CheckpointManifest> {
        let path = self.checkpoint_dir(checkpoint_id).join(MANIFEST_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let manifest = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Ids of checkpoints present on disk with a readable manifest, ascending.
    pub async fn list_checkpoints(&self) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("listing checkpoints in {}", self.base.display()))
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id) = name.strip_prefix(DIR_PREFIX).and_then(|s| s.parse().ok()) else {
                continue;
            };
            if entry.path().join(MANIFEST_FILE).is_file() {
                ids.push(id);
            } else {
                warn!(checkpoint_id = id, "checkpoint dir without manifest, skipping");
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Remove a checkpoint directory. Missing directories are not an error.
    pub async fn delete(&self, checkpoint_id: u64) -> Result<()> {
        let dir = self.checkpoint_dir(checkpoint_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("deleting checkpoint {}", dir.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{StateHandle, StoreSummary};

    fn manifest(id: u64) -> CheckpointManifest {
        CheckpointManifest {
            checkpoint_id: id,
            timestamp: 1_000 + id,
            source_offset: id * 10,
            backend: "memory".into(),
            stores: vec![
                StoreSummary { operator_id: "windowed".into(), namespaces: 3 },
                StoreSummary { operator_id: "join".into(), namespaces: 1 },
            ],
            state: StateHandle { path: format!("chk-{id}/state.bin"), size: 64 },
        }
    }

    #[tokio::test]
    async fn manifest_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FsCheckpointStorage::new(tmp.path());

        storage.prepare_dir(7).await.unwrap();
        storage.write_manifest(&manifest(7)).await.unwrap();

        let read = storage.read_manifest(7).await.unwrap();
        assert_eq!(read.checkpoint_id, 7);
        assert_eq!(read.source_offset, 70);
        assert_eq!(read.backend, "memory");
        assert_eq!(read.stores, manifest(7).stores);
    }

    #[tokio::test]
    async fn listing_skips_foreign_and_manifestless_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FsCheckpointStorage::new(tmp.path());

        for id in [3, 1, 2] {
            storage.prepare_dir(id).await.unwrap();
            storage.write_manifest(&manifest(id)).await.unwrap();
        }
        // A dir without a manifest and one that is not ours at all.
        tokio::fs::create_dir(tmp.path().join("chk-9")).await.unwrap();
        tokio::fs::create_dir(tmp.path().join("scratch")).await.unwrap();

        assert_eq!(storage.list_checkpoints().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FsCheckpointStorage::new(tmp.path());

        storage.prepare_dir(1).await.unwrap();
        storage.write_manifest(&manifest(1)).await.unwrap();
        storage.delete(1).await.unwrap();
        storage.delete(1).await.unwrap();
        assert!(storage.list_checkpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_base_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FsCheckpointStorage::new(tmp.path().join("never-created"));
        assert!(storage.list_checkpoints().await.unwrap().is_empty());
    }
}
