//! Window assignment and trigger policies.
//!
//! Both are closed sets of tagged variants selected by configuration; the
//! runtime pairs one assigner with one trigger per job.

mod assigner;
mod trigger;

pub use assigner::WindowAssigner;
pub use trigger::{Trigger, TriggerDecision, COUNT_CELL};

use sluice_core::EngineError;

/// Reject assigner/trigger pairings that can never behave sensibly.
///
/// Session windows carry their gap in the window bounds, so only the
/// session-gap trigger understands them, and that trigger is meaningless
/// anywhere else. A processing-time trigger on the global window would
/// wait on a boundary that never comes.
pub fn validate_pairing(assigner: &WindowAssigner, trigger: &Trigger) -> Result<(), EngineError> {
    match (assigner, trigger) {
        (WindowAssigner::Session { .. }, Trigger::SessionGap) => Ok(()),
        (WindowAssigner::Session { .. }, other) => Err(EngineError::Misconfigured(format!(
            "session windows require the session-gap trigger, got {other:?}"
        ))),
        (_, Trigger::SessionGap) => Err(EngineError::Misconfigured(
            "session-gap trigger requires session windows".into(),
        )),
        (WindowAssigner::Global, Trigger::ProcessingTime) => Err(EngineError::Misconfigured(
            "processing-time trigger never fires on the global window".into(),
        )),
        _ => Ok(()),
    }
}
