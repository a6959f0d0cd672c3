//! Window assignment policies.

use serde::{Deserialize, Serialize};
use sluice_core::{EngineError, TimeWindow, Timestamp, WindowId};

/// Maps an event's timestamp to the window instances it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowAssigner {
    /// Fixed-size, non-overlapping windows. `window = floor(ts / size)`.
    Tumbling { size_ms: Timestamp },
    /// Overlapping windows of `size_ms`, one starting every `slide_ms`.
    Sliding { size_ms: Timestamp, slide_ms: Timestamp },
    /// Activity windows separated by inactivity gaps. `assign` yields a
    /// proto-window `[ts, ts + gap)`; the runtime merges it with
    /// overlapping live sessions for the same key.
    Session { gap_ms: Timestamp },
    /// One never-closing window per key; firing is trigger-driven only.
    Global,
}

impl WindowAssigner {
    /// Reject structurally invalid parameters at job construction.
    pub fn validate(&self) -> Result<(), EngineError> {
        match *self {
            WindowAssigner::Tumbling { size_ms } if size_ms == 0 => Err(
                EngineError::Misconfigured("tumbling window size must be positive".into()),
            ),
            WindowAssigner::Sliding { size_ms, slide_ms } if size_ms == 0 || slide_ms == 0 => {
                Err(EngineError::Misconfigured(
                    "sliding window size and slide must be positive".into(),
                ))
            }
            WindowAssigner::Sliding { size_ms, slide_ms } if slide_ms > size_ms => {
                Err(EngineError::Misconfigured(format!(
                    "slide ({slide_ms}ms) must not exceed window size ({size_ms}ms)"
                )))
            }
            WindowAssigner::Session { gap_ms } if gap_ms == 0 => Err(EngineError::Misconfigured(
                "session gap must be positive".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Windows containing `ts`.
    pub fn assign(&self, ts: Timestamp) -> Vec<WindowId> {
        match *self {
            WindowAssigner::Tumbling { size_ms } => {
                let start = (ts / size_ms) * size_ms;
                vec![WindowId::Time(TimeWindow::new(start, start + size_ms))]
            }
            WindowAssigner::Sliding { size_ms, slide_ms } => {
                let mut windows = Vec::new();
                let mut start = (ts / slide_ms) * slide_ms;
                loop {
                    let window = TimeWindow::new(start, start + size_ms);
                    if window.contains(ts) {
                        windows.push(WindowId::Time(window));
                    }
                    if start < slide_ms || window.end <= ts {
                        break;
                    }
                    start -= slide_ms;
                }
                windows
            }
            WindowAssigner::Session { gap_ms } => {
                vec![WindowId::Time(TimeWindow::new(ts, ts + gap_ms))]
            }
            WindowAssigner::Global => vec![WindowId::Global],
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, WindowAssigner::Session { .. })
    }

    pub fn session_gap(&self) -> Option<Timestamp> {
        match *self {
            WindowAssigner::Session { gap_ms } => Some(gap_ms),
            _ => None,
        }
    }
}
