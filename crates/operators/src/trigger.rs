//! Trigger policies: when a window's accumulated state is evaluated.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sluice_state::{RawStateStore, ValueCell};
use std::sync::Arc;

use sluice_core::{EngineError, Timestamp, WindowId};

/// Reserved cell holding the per-window element counter of `Trigger::Count`.
pub const COUNT_CELL: &str = "trigger.count";

/// Verdict for one (event, window) pair or one expired timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Keep accumulating.
    Continue,
    /// Evaluate and emit; the window lives on.
    Fire,
    /// Evaluate, emit, then discard the window's state.
    FireAndPurge,
    /// Discard the window's state without emitting.
    Purge,
}

impl TriggerDecision {
    pub fn fires(self) -> bool {
        matches!(self, TriggerDecision::Fire | TriggerDecision::FireAndPurge)
    }

    pub fn purges(self) -> bool {
        matches!(self, TriggerDecision::FireAndPurge | TriggerDecision::Purge)
    }
}

/// Decides when a window instance fires and whether it is purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    /// Fire every `n`-th element in the window; the counter then resets.
    /// Never purges on its own.
    Count { n: u64 },
    /// Fire-and-purge once the window's end boundary passes wall time.
    ProcessingTime,
    /// Fire-and-purge once no event has extended the session for its gap.
    /// The deadline is the window's end, which session merging keeps at
    /// `last_event + gap`.
    SessionGap,
}

impl Trigger {
    /// Reject structurally invalid parameters at job construction.
    pub fn validate(&self) -> Result<(), EngineError> {
        match *self {
            Trigger::Count { n } if n == 0 => Err(EngineError::Misconfigured(
                "count trigger requires n >= 1".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Evaluate after the state store has been updated for this window.
    /// The store must be bound to the window's namespace.
    pub fn on_element(&self, store: &Arc<dyn RawStateStore>) -> Result<TriggerDecision> {
        match *self {
            Trigger::Count { n } => {
                let cell: ValueCell<u64> = ValueCell::new(store.clone(), COUNT_CELL);
                let seen = cell.get()?.unwrap_or(0) + 1;
                if seen >= n {
                    cell.set(&0)?;
                    Ok(TriggerDecision::Fire)
                } else {
                    cell.set(&seen)?;
                    Ok(TriggerDecision::Continue)
                }
            }
            Trigger::ProcessingTime | Trigger::SessionGap => Ok(TriggerDecision::Continue),
        }
    }

    /// Evaluate when a registered timer for the window expires.
    pub fn on_timer(&self) -> TriggerDecision {
        match *self {
            Trigger::Count { .. } => TriggerDecision::Continue,
            Trigger::ProcessingTime | Trigger::SessionGap => TriggerDecision::FireAndPurge,
        }
    }

    /// Wall-clock deadline to register for a window, if this trigger is
    /// timer-driven.
    pub fn timer_deadline(&self, window: &WindowId) -> Option<Timestamp> {
        match (self, window) {
            (Trigger::ProcessingTime | Trigger::SessionGap, WindowId::Time(w)) => Some(w.end),
            _ => None,
        }
    }
}
