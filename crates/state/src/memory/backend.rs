//! Memory state backend implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sluice_core::{StateHandle, StoreSummary};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::traits::{RawStateStore, StateBackend};

use super::NamespacedMemoryStore;

/// In-memory state backend.
///
/// Fast but not durable across restarts on its own; durability comes from
/// checkpoints written through `snapshot`. Suitable for tests, development,
/// and state that fits in memory.
pub struct MemoryStateBackend {
    stores: DashMap<String, Arc<NamespacedMemoryStore>>,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self { stores: DashMap::new() }
    }

    pub(crate) fn snapshot_stores(&self) -> Result<Vec<u8>> {
        let mut all_state: HashMap<String, Bytes> = HashMap::new();
        for entry in self.stores.iter() {
            all_state.insert(entry.key().clone(), entry.value().snapshot()?);
        }
        bincode::serialize(&all_state).context("serialize state snapshot")
    }

    pub(crate) fn restore_stores(&self, data: &[u8]) -> Result<()> {
        let all_state: HashMap<String, Bytes> =
            bincode::deserialize(data).context("deserialize state snapshot")?;
        for (op_id, state) in all_state {
            let store = self
                .stores
                .entry(op_id)
                .or_insert_with(|| Arc::new(NamespacedMemoryStore::new()))
                .clone();
            store.restore(&state)?;
        }
        Ok(())
    }
}

impl Default for MemoryStateBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    fn store(&self, operator_id: &str) -> Result<Arc<dyn RawStateStore>> {
        let store = self
            .stores
            .entry(operator_id.to_string())
            .or_insert_with(|| Arc::new(NamespacedMemoryStore::new()))
            .clone();
        Ok(store)
    }

    async fn snapshot(&self, checkpoint_id: u64, dir: &Path) -> Result<StateHandle> {
        let serialized = self.snapshot_stores()?;
        let snapshot_path = dir.join(format!("state-{}.bin", checkpoint_id));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&snapshot_path, &serialized)
            .await
            .context("write state snapshot")?;

        info!(checkpoint_id, path = %snapshot_path.display(), "state snapshot written");

        Ok(StateHandle {
            path: snapshot_path.to_string_lossy().to_string(),
            size: serialized.len() as u64,
        })
    }

    async fn restore(&self, handle: &StateHandle) -> Result<()> {
        let data = tokio::fs::read(&handle.path)
            .await
            .context("read state snapshot")?;
        self.restore_stores(&data)?;
        info!(path = %handle.path, "state restored from snapshot");
        Ok(())
    }

    fn summaries(&self) -> Vec<StoreSummary> {
        let mut summaries: Vec<StoreSummary> = self
            .stores
            .iter()
            .map(|entry| StoreSummary {
                operator_id: entry.key().clone(),
                namespaces: entry.value().namespaces().len() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| a.operator_id.cmp(&b.operator_id));
        summaries
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::Namespace;

    #[tokio::test]
    async fn snapshot_restore_across_backends() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryStateBackend::new();
        let store = backend.store("op").unwrap();
        store.bind(Namespace::global(b"k1".to_vec()));
        store.put("v", Bytes::from_static(b"payload")).unwrap();

        let handle = backend.snapshot(1, dir.path()).await.unwrap();
        assert!(handle.size > 0);

        let restored = MemoryStateBackend::new();
        restored.restore(&handle).await.unwrap();
        let store = restored.store("op").unwrap();
        store.bind(Namespace::global(b"k1".to_vec()));
        assert_eq!(store.get("v").unwrap(), Some(Bytes::from_static(b"payload")));
    }

    #[test]
    fn store_is_shared_per_operator_id() {
        let backend = MemoryStateBackend::new();
        let a = backend.store("op").unwrap();
        let b = backend.store("op").unwrap();
        a.bind(Namespace::global(b"k".to_vec()));
        a.put("v", Bytes::from_static(b"x")).unwrap();
        b.bind(Namespace::global(b"k".to_vec()));
        assert_eq!(b.get("v").unwrap(), Some(Bytes::from_static(b"x")));
    }
}
