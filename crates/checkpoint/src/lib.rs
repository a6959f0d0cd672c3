//! Periodic state snapshots with restore-on-restart.
//!
//! The coordinator snapshots the whole state backend into numbered
//! `chk-<id>` directories, each carrying a JSON manifest with enough
//! metadata (source offset, state handle) to resume processing. Writes
//! are retried with bounded backoff; a checkpoint is never silently
//! skipped and claimed successful.

mod config;
mod coordinator;
mod storage;
mod types;

pub use config::CheckpointConfig;
pub use coordinator::CheckpointCoordinator;
pub use storage::FsCheckpointStorage;
pub use types::{CheckpointManifest, CheckpointStats, CompletedCheckpoint};
