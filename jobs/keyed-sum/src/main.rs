//! Reads `key,value` lines, sums values per key, and emits each key's
//! partial sum every N events. With `--state-dir` the job checkpoints its
//! state and resumes from the last checkpoint on restart.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sluice_checkpoint::{CheckpointConfig, CheckpointCoordinator};
use sluice_core::{EngineError, Event, RuntimeIssue, WindowResult};
use sluice_operators::{Trigger, WindowAssigner};
use sluice_runtime::{
    restore_job, run_job, BackendKind, JobConfig, KeyedWindowRuntime, Sink, SystemClock,
    VecSource,
};
use sluice_state::{DurableStateBackend, MemoryStateBackend, StateBackend};

#[derive(Parser, Debug)]
#[command(name = "keyed-sum", about = "Per-key running sums over a keyed event stream")]
struct Args {
    /// Input file of `key,value` lines; reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Emit a partial sum after every N events per key.
    #[arg(long, default_value_t = 5)]
    every: u64,

    /// Directory for durable state and checkpoints; state is volatile
    /// when omitted.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Seconds between periodic checkpoints.
    #[arg(long, default_value_t = 10)]
    checkpoint_interval_secs: u64,
}

type Payload = (String, i64);

fn parse_line(line: &str) -> Result<Payload, EngineError> {
    let (key, value) = line
        .split_once(',')
        .ok_or_else(|| EngineError::Malformed(format!("expected `key,value`, got {line:?}")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(EngineError::Malformed("empty key".into()));
    }
    let value = value
        .trim()
        .parse()
        .map_err(|e| EngineError::Malformed(format!("bad value in {line:?}: {e}")))?;
    Ok((key.to_string(), value))
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let text = read_input(args.input.as_ref())?;
    let mut events = Vec::new();
    let mut malformed = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(payload) => events.push(Event::new(i as u64, payload)),
            Err(e) => malformed.push(format!("line {}: {e}", i + 1)),
        }
    }

    let mut config = JobConfig::new(WindowAssigner::Global, Trigger::Count { n: args.every });
    if let Some(dir) = &args.state_dir {
        config = config
            .backend(BackendKind::Durable { dir: dir.clone() })
            .checkpoint(
                CheckpointConfig::new(dir)
                    .interval(Duration::from_secs(args.checkpoint_interval_secs)),
            );
    }
    config.validate()?;

    let backend: Arc<dyn StateBackend> = match &config.backend {
        BackendKind::Durable { dir } => Arc::new(DurableStateBackend::open(dir).await?),
        BackendKind::InMemory => Arc::new(MemoryStateBackend::new()),
    };

    let mut runtime: KeyedWindowRuntime<Payload, String, i64> = KeyedWindowRuntime::new(
        backend.store("keyed-sum")?,
        config.assigner.clone(),
        config.trigger.clone(),
        Arc::new(SystemClock),
        |p: &Payload| Ok(p.0.clone()),
        |e: &Event<Payload>| e.payload.1,
        |a: &i64, b: &i64| a + b,
    )?;
    for detail in malformed {
        runtime.report(RuntimeIssue::DroppedMalformed { detail });
    }

    let coordinator = config
        .checkpoint
        .clone()
        .map(|cfg| CheckpointCoordinator::new(backend.clone(), cfg));

    let mut source = VecSource::new(events);
    if let Some(coordinator) = &coordinator {
        if let Some(offset) = restore_job(coordinator, &mut runtime).await? {
            info!(offset, "resuming from checkpoint");
            source.seek(offset);
        }
    }

    let mut sink = |r: WindowResult<String, i64>| -> Result<()> {
        println!("{}\t{}", r.key, r.value);
        Ok(())
    };
    let metrics = run_job(&mut source, &mut sink as &mut dyn Sink<_>, &mut runtime, coordinator.as_ref()).await?;

    info!(
        records_in = metrics.records_in,
        records_out = metrics.records_out,
        dropped_malformed = metrics.dropped_malformed,
        "job complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        assert_eq!(parse_line("a,5").unwrap(), ("a".to_string(), 5));
        assert_eq!(parse_line(" user , -3 ").unwrap(), ("user".to_string(), -3));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_line("no-comma").is_err());
        assert!(parse_line(",5").is_err());
        assert!(parse_line("a,not-a-number").is_err());
        assert!(parse_line("a,1,extra").is_err());
    }
}
