//! Core types shared across the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds since Unix epoch (or any monotonic-ish reference; up to the source).
pub type Timestamp = u64;

/// An event as handed to the engine by a source: an immutable payload plus
/// the timestamp it carries (event time or ingestion time, per the source).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    pub ts: Timestamp,
    pub payload: T,
}

impl<T> Event<T> {
    pub fn new(ts: Timestamp, payload: T) -> Self {
        Self { ts, payload }
    }
}

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Whether `ts` falls inside this window.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Whether two windows overlap (used for session merging).
    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The union of two windows: earliest start, latest end.
    pub fn cover(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Identity of one window instance for a key.
///
/// `Global` is the single never-closing window, also used to scope keyed
/// state that is not windowed at all (e.g. join buffers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WindowId {
    Global,
    Time(TimeWindow),
}

impl WindowId {
    /// Window boundaries as reported in emitted results.
    pub fn bounds(&self) -> (Timestamp, Timestamp) {
        match self {
            WindowId::Global => (0, Timestamp::MAX),
            WindowId::Time(w) => (w.start, w.end),
        }
    }
}

/// Scope of a single unit of per-window, per-key state: (key, window).
///
/// The key is stored in serialized form so the store never needs to know the
/// user's key type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub key: Vec<u8>,
    pub window: WindowId,
}

impl Namespace {
    pub fn new(key: Vec<u8>, window: WindowId) -> Self {
        Self { key, window }
    }

    /// Namespace for unwindowed keyed state.
    pub fn global(key: Vec<u8>) -> Self {
        Self { key, window: WindowId::Global }
    }
}

/// A record emitted when a window fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult<K, V> {
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub key: K,
    pub value: V,
}

impl<K, V> WindowResult<K, V> {
    pub fn new(window_start: Timestamp, window_end: Timestamp, key: K, value: V) -> Self {
        Self { window_start, window_end, key, value }
    }
}

/// Pointer to snapshotted state written by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHandle {
    pub path: String,
    pub size: u64,
}

/// Contents summary for one operator store, as listed in checkpoint
/// manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub operator_id: String,
    /// Number of live (key, window) namespaces at snapshot time.
    pub namespaces: u64,
}

/// Failure classes the engine distinguishes.
///
/// Per-record failures (`Malformed`, `KeyExtraction`) drop the record and
/// are counted; they never terminate the job. `Misconfigured` is rejected
/// at job construction. The remaining variants fail the enclosing
/// operation loudly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("key extraction failed: {0}")]
    KeyExtraction(String),

    #[error("state backend failure: {0}")]
    StateBackend(String),

    #[error("invalid configuration: {0}")]
    Misconfigured(String),

    #[error("checkpoint {checkpoint_id} failed after {attempts} attempts: {reason}")]
    CheckpointWrite {
        checkpoint_id: u64,
        attempts: u32,
        reason: String,
    },
}

/// Structured notifications the engine pushes to the host instead of
/// terminating on per-record errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeIssue {
    DroppedMalformed { detail: String },
    DroppedKeyExtraction { detail: String },
    /// Event was assigned zero retained windows and discarded.
    DroppedLate { ts: Timestamp },
    CheckpointFailed { checkpoint_id: u64, attempts: u32 },
}

/// Per-job counters exposed to the host.
#[derive(Debug, Default, Clone)]
pub struct RuntimeMetrics {
    pub records_in: u64,
    pub records_out: u64,
    pub fires: u64,
    pub purges: u64,
    pub merged_sessions: u64,
    pub dropped_malformed: u64,
    pub dropped_key_errors: u64,
    pub dropped_late: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_window_contains_is_half_open() {
        let w = TimeWindow::new(1000, 2000);
        assert!(w.contains(1000));
        assert!(w.contains(1999));
        assert!(!w.contains(2000));
    }

    #[test]
    fn time_window_cover_unions_bounds() {
        let a = TimeWindow::new(1000, 2000);
        let b = TimeWindow::new(1500, 3000);
        assert!(a.intersects(&b));
        assert_eq!(a.cover(&b), TimeWindow::new(1000, 3000));
    }

    #[test]
    fn disjoint_windows_do_not_intersect() {
        let a = TimeWindow::new(0, 1000);
        let b = TimeWindow::new(1000, 2000);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn global_window_bounds() {
        assert_eq!(WindowId::Global.bounds(), (0, Timestamp::MAX));
    }
}
