//! Job configuration with fail-fast validation.

use sluice_core::EngineError;
use sluice_operators::{validate_pairing, Trigger, WindowAssigner};
use std::path::PathBuf;

use sluice_checkpoint::CheckpointConfig;

/// Which state backend a job runs on.
#[derive(Debug, Clone)]
pub enum BackendKind {
    /// Volatile, process-local state.
    InMemory,
    /// In-memory state persisted to `dir` on checkpoints and reloaded on
    /// startup.
    Durable { dir: PathBuf },
}

/// Everything the driver needs to run one keyed windowed job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub assigner: WindowAssigner,
    pub trigger: Trigger,
    pub backend: BackendKind,
    pub checkpoint: Option<CheckpointConfig>,
}

impl JobConfig {
    pub fn new(assigner: WindowAssigner, trigger: Trigger) -> Self {
        Self {
            assigner,
            trigger,
            backend: BackendKind::InMemory,
            checkpoint: None,
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn checkpoint(mut self, config: CheckpointConfig) -> Self {
        self.checkpoint = Some(config);
        self
    }

    /// Reject invalid parameters and incoherent window/trigger pairings
    /// before any event is processed.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.assigner.validate()?;
        self.trigger.validate()?;
        validate_pairing(&self.assigner, &self.trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coherent_pairings_pass() {
        for (assigner, trigger) in [
            (WindowAssigner::Global, Trigger::Count { n: 5 }),
            (WindowAssigner::Tumbling { size_ms: 5000 }, Trigger::ProcessingTime),
            (WindowAssigner::Tumbling { size_ms: 5000 }, Trigger::Count { n: 5 }),
            (
                WindowAssigner::Sliding { size_ms: 10_000, slide_ms: 5_000 },
                Trigger::ProcessingTime,
            ),
            (WindowAssigner::Session { gap_ms: 15_000 }, Trigger::SessionGap),
        ] {
            assert!(JobConfig::new(assigner, trigger).validate().is_ok());
        }
    }

    #[test]
    fn incoherent_pairings_are_rejected_up_front() {
        for (assigner, trigger) in [
            (WindowAssigner::Session { gap_ms: 15_000 }, Trigger::Count { n: 5 }),
            (WindowAssigner::Tumbling { size_ms: 5000 }, Trigger::SessionGap),
            (WindowAssigner::Global, Trigger::ProcessingTime),
        ] {
            assert!(JobConfig::new(assigner, trigger).validate().is_err());
        }
    }

    #[test]
    fn degenerate_parameters_are_rejected() {
        let config = JobConfig::new(WindowAssigner::Tumbling { size_ms: 0 }, Trigger::Count { n: 5 });
        assert!(config.validate().is_err());
        let config = JobConfig::new(WindowAssigner::Global, Trigger::Count { n: 0 });
        assert!(config.validate().is_err());
    }
}
