//! Job driver: the single loop that pulls events, runs the operator, and
//! coordinates checkpoints between records.
//!
//! Checkpoints run only at record boundaries, so a snapshot always captures
//! a state in which every consumed event has fully taken effect.

use anyhow::Result;
use tracing::error;

use sluice_checkpoint::CheckpointCoordinator;
use sluice_core::{EngineError, RuntimeIssue, RuntimeMetrics, WindowResult};
use sluice_state::{StateKey, StateValue};

use crate::io::{Sink, Source};
use crate::keyed::KeyedWindowRuntime;

/// Restore the newest checkpoint into `runtime`, returning the source
/// offset to resume from. `None` means a fresh start.
pub async fn restore_job<T, K: StateKey, V: StateValue>(
    coordinator: &CheckpointCoordinator,
    runtime: &mut KeyedWindowRuntime<T, K, V>,
) -> Result<Option<u64>> {
    match coordinator.restore_latest().await? {
        Some(manifest) => {
            runtime.rehydrate()?;
            Ok(Some(manifest.source_offset))
        }
        None => Ok(None),
    }
}

/// Run the job to source exhaustion.
///
/// A failed checkpoint is reported as an issue and leaves the coordinator
/// unhealthy but does not stop event processing.
pub async fn run_job<T, K: StateKey, V: StateValue>(
    source: &mut dyn Source<T>,
    sink: &mut dyn Sink<WindowResult<K, V>>,
    runtime: &mut KeyedWindowRuntime<T, K, V>,
    coordinator: Option<&CheckpointCoordinator>,
) -> Result<RuntimeMetrics> {
    while let Some(event) = source.next()? {
        for record in runtime.process(event)? {
            sink.emit(record)?;
        }
        for record in runtime.poll_timers()? {
            sink.emit(record)?;
        }
        if let Some(coordinator) = coordinator {
            if let Err(e) = coordinator.maybe_checkpoint(source.offset()).await {
                report_checkpoint_failure(runtime, &e);
            }
        }
    }

    for record in runtime.finish()? {
        sink.emit(record)?;
    }
    if let Some(coordinator) = coordinator {
        // Final snapshot so a restart resumes past everything consumed.
        if let Err(e) = coordinator.trigger_checkpoint(source.offset()).await {
            report_checkpoint_failure(runtime, &e);
        }
    }
    Ok(runtime.metrics().clone())
}

fn report_checkpoint_failure<T, K: StateKey, V: StateValue>(
    runtime: &mut KeyedWindowRuntime<T, K, V>,
    e: &anyhow::Error,
) {
    error!(error = %e, "checkpoint failed");
    if let Some(EngineError::CheckpointWrite { checkpoint_id, attempts, .. }) = e.downcast_ref() {
        runtime.report(RuntimeIssue::CheckpointFailed {
            checkpoint_id: *checkpoint_id,
            attempts: *attempts,
        });
    }
}
