//! Checkpoint configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for checkpoint behavior.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Directory receiving `chk-<id>` snapshot directories.
    pub dir: PathBuf,
    /// Interval between periodic checkpoints.
    pub interval: Duration,
    /// Write attempts per checkpoint before giving up.
    pub max_attempts: u32,
    /// Initial backoff between attempts; doubles per retry.
    pub retry_backoff: Duration,
    /// Number of completed checkpoints to retain.
    pub num_retained: usize,
}

impl CheckpointConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            interval: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            num_retained: 3,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn num_retained(mut self, n: usize) -> Self {
        self.num_retained = n.max(1);
        self
    }
}
