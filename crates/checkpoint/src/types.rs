//! Common types for checkpoint coordination.

use serde::{Deserialize, Serialize};
use sluice_core::{StateHandle, StoreSummary, Timestamp};
use std::time::Duration;

/// Metadata written alongside every snapshot. Read-only once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub checkpoint_id: u64,
    pub timestamp: Timestamp,
    /// Source position at snapshot time; the host resumes reading here.
    pub source_offset: u64,
    /// Name of the backend that produced the snapshot.
    pub backend: String,
    /// The snapshotted stores and how many namespaces each held.
    pub stores: Vec<StoreSummary>,
    pub state: StateHandle,
}

/// A successfully completed checkpoint.
#[derive(Debug, Clone)]
pub struct CompletedCheckpoint {
    pub checkpoint_id: u64,
    pub timestamp: Timestamp,
    pub duration: Duration,
    pub state: StateHandle,
}

/// Statistics about checkpointing.
#[derive(Debug, Default, Clone)]
pub struct CheckpointStats {
    pub total_checkpoints: u64,
    pub completed_checkpoints: u64,
    pub failed_checkpoints: u64,
    pub retried_attempts: u64,
    pub total_size_bytes: u64,
    pub last_checkpoint_id: Option<u64>,
    pub last_checkpoint_duration: Option<Duration>,
}

pub(crate) fn now_millis() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}
