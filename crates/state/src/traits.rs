//! Core traits and interfaces for state management.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use sluice_core::{Namespace, StateHandle, StoreSummary};
use std::path::Path;
use std::sync::Arc;

/// Trait bound for types that can be used as partition keys.
pub trait StateKey:
    Serialize + DeserializeOwned + Clone + Eq + std::hash::Hash + Send + Sync + 'static
{
}

/// Trait bound for types that can be stored in state cells.
pub trait StateValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> StateKey for T where
    T: Serialize + DeserializeOwned + Clone + Eq + std::hash::Hash + Send + Sync + 'static
{
}

impl<T> StateValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Untyped, object-safe view of a namespaced state store.
///
/// Cell contents are opaque `Bytes`; the typed [`crate::cells`] wrappers
/// layer bincode on top. Reads and writes target the currently bound
/// namespace, which the runtime sets once per (event, window) before any
/// cell access.
pub trait RawStateStore: Send + Sync {
    /// Bind the namespace for subsequent cell operations.
    fn bind(&self, ns: Namespace);

    /// The currently bound namespace.
    fn current(&self) -> Option<Namespace>;

    /// Read a value cell. Absent cells read as `None`.
    fn get(&self, cell: &str) -> Result<Option<Bytes>>;

    /// Overwrite a value cell; visible to subsequent reads immediately.
    fn put(&self, cell: &str, value: Bytes) -> Result<()>;

    /// Append to a list cell. List order is append order.
    fn push(&self, cell: &str, value: Bytes) -> Result<()>;

    /// Snapshot a list cell's contents.
    fn read_list(&self, cell: &str) -> Result<Vec<Bytes>>;

    /// Remove a cell from the bound namespace. Idempotent.
    fn clear(&self, cell: &str) -> Result<()>;

    /// Drop every cell under `ns`. Runs in O(cells-in-namespace); safe to
    /// call for a namespace that was never written.
    fn purge_namespace(&self, ns: &Namespace) -> Result<()>;

    /// Enumerate namespaces that currently hold at least one cell.
    fn namespaces(&self) -> Vec<Namespace>;

    /// Serialize the entire store.
    fn snapshot(&self) -> Result<Bytes>;

    /// Replace the store's contents from a snapshot.
    fn restore(&self, data: &[u8]) -> Result<()>;
}

/// A state backend owns stores and can persist them for checkpoints.
#[async_trait]
pub trait StateBackend: Send + Sync + 'static {
    /// Get or create the store for an operator.
    fn store(&self, operator_id: &str) -> Result<Arc<dyn RawStateStore>>;

    /// Snapshot every store into `dir` for the given checkpoint.
    async fn snapshot(&self, checkpoint_id: u64, dir: &Path) -> Result<StateHandle>;

    /// Per-store contents summaries, for checkpoint manifests.
    fn summaries(&self) -> Vec<StoreSummary>;

    /// Restore every store from a snapshot.
    async fn restore(&self, handle: &StateHandle) -> Result<()>;

    /// Backend name for logs and manifests.
    fn name(&self) -> &'static str;
}
