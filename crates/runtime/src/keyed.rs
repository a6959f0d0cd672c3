//! The keyed window operator: routes events through per-(key, window)
//! state, evaluates the trigger, and emits window results.
//!
//! Events for one key flow through here strictly in arrival order; state for
//! a key is only ever touched while that key's event or timer is being
//! handled, so operator logic needs no further synchronization.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use sluice_core::{
    EngineError, Event, Namespace, RuntimeIssue, RuntimeMetrics, TimeWindow, Timestamp, WindowId,
    WindowResult,
};
use sluice_operators::{validate_pairing, Trigger, TriggerDecision, WindowAssigner};
use sluice_state::{RawStateStore, ReducingCell, StateKey, StateValue, ValueCell};

use crate::timer::{Clock, TimerKey, TimerService};

/// Cell holding each window's running accumulator.
pub const ACC_CELL: &str = "window.acc";

/// Cell under the key's global namespace holding its lateness horizon,
/// so late-event dropping survives a checkpoint restore.
const HORIZON_CELL: &str = "window.horizon";

type KeyFn<T, K> = Arc<dyn Fn(&T) -> Result<K> + Send + Sync>;
type ValueFn<T, V> = Arc<dyn Fn(&Event<T>) -> V + Send + Sync>;
type MergeFn<V> = Arc<dyn Fn(&V, &V) -> V + Send + Sync>;

/// Runs one keyed, windowed aggregation.
///
/// `T` is the event payload, `K` the partition key, `V` the accumulator.
/// Each event is keyed, assigned to windows, folded into the per-window
/// accumulator cell, and then the trigger decides whether to emit.
pub struct KeyedWindowRuntime<T, K, V> {
    store: Arc<dyn RawStateStore>,
    assigner: WindowAssigner,
    trigger: Trigger,
    key_fn: KeyFn<T, K>,
    value_fn: ValueFn<T, V>,
    merge: MergeFn<V>,
    timers: TimerService,
    /// Live session windows per key; only populated for session assigners.
    sessions: HashMap<Vec<u8>, Vec<TimeWindow>>,
    /// Highest purged window end per key; events entirely below it are late.
    /// Mirrored into the key's horizon cell and rebuilt from it on restore.
    purge_horizon: HashMap<Vec<u8>, Timestamp>,
    /// Decoded keys by their serialized form, for emission.
    keys: HashMap<Vec<u8>, K>,
    issues: Vec<RuntimeIssue>,
    metrics: RuntimeMetrics,
}

impl<T, K: StateKey, V: StateValue> KeyedWindowRuntime<T, K, V> {
    pub fn new(
        store: Arc<dyn RawStateStore>,
        assigner: WindowAssigner,
        trigger: Trigger,
        clock: Arc<dyn Clock>,
        key_fn: impl Fn(&T) -> Result<K> + Send + Sync + 'static,
        value_fn: impl Fn(&Event<T>) -> V + Send + Sync + 'static,
        merge: impl Fn(&V, &V) -> V + Send + Sync + 'static,
    ) -> Result<Self, EngineError> {
        assigner.validate()?;
        trigger.validate()?;
        validate_pairing(&assigner, &trigger)?;
        Ok(Self {
            store,
            assigner,
            trigger,
            key_fn: Arc::new(key_fn),
            value_fn: Arc::new(value_fn),
            merge: Arc::new(merge),
            timers: TimerService::new(clock),
            sessions: HashMap::new(),
            purge_horizon: HashMap::new(),
            keys: HashMap::new(),
            issues: Vec::new(),
            metrics: RuntimeMetrics::default(),
        })
    }

    /// Route one event: key it, assign windows, fold state, run the trigger.
    /// Per-record failures drop the event and are reported as issues.
    pub fn process(&mut self, event: Event<T>) -> Result<Vec<WindowResult<K, V>>> {
        self.metrics.records_in += 1;

        let key = match (self.key_fn)(&event.payload) {
            Ok(key) => key,
            Err(e) => {
                warn!(ts = event.ts, error = %e, "key extraction failed, dropping record");
                self.report(RuntimeIssue::DroppedKeyExtraction { detail: format!("{e:#}") });
                return Ok(Vec::new());
            }
        };
        let key_bytes = bincode::serialize(&key)?;
        self.keys.entry(key_bytes.clone()).or_insert_with(|| key.clone());

        let mut windows = self.assigner.assign(event.ts);
        if self.assigner.is_session() {
            let WindowId::Time(proto) = windows[0] else {
                return Err(EngineError::StateBackend("session assigner yielded global window".into()).into());
            };
            windows = vec![WindowId::Time(self.merge_sessions(&key_bytes, proto)?)];
        }

        let horizon = self.purge_horizon.get(&key_bytes).copied().unwrap_or(0);
        let assigned = windows.len();
        windows.retain(|w| match w {
            WindowId::Global => true,
            WindowId::Time(t) => t.end > horizon,
        });
        if windows.is_empty() && assigned > 0 {
            debug!(ts = event.ts, horizon, "event late for every assigned window, dropping");
            self.report(RuntimeIssue::DroppedLate { ts: event.ts });
            return Ok(Vec::new());
        }

        let value = (self.value_fn)(&event);
        let mut out = Vec::new();
        for window in windows {
            self.store.bind(Namespace::new(key_bytes.clone(), window));
            let acc = ReducingCell::new(self.store.clone(), ACC_CELL, self.merge.clone());
            acc.add(&value)?;
            if let Some(deadline) = self.trigger.timer_deadline(&window) {
                self.timers
                    .register(TimerKey { key: key_bytes.clone(), window }, deadline);
            }
            let decision = self.trigger.on_element(&self.store)?;
            self.apply_decision(decision, &key_bytes, window, &mut out)?;
        }
        Ok(out)
    }

    /// Fire every timer whose deadline has passed.
    pub fn poll_timers(&mut self) -> Result<Vec<WindowResult<K, V>>> {
        let mut out = Vec::new();
        for timer in self.timers.poll_expired() {
            self.store
                .bind(Namespace::new(timer.key.clone(), timer.window));
            let decision = self.trigger.on_timer();
            self.apply_decision(decision, &timer.key, timer.window, &mut out)?;
        }
        Ok(out)
    }

    /// Drain due timers at end of input and log a job summary.
    pub fn finish(&mut self) -> Result<Vec<WindowResult<K, V>>> {
        let out = self.poll_timers()?;
        let m = &self.metrics;
        info!(
            records_in = m.records_in,
            records_out = m.records_out,
            fires = m.fires,
            purges = m.purges,
            merged_sessions = m.merged_sessions,
            dropped_malformed = m.dropped_malformed,
            dropped_key_errors = m.dropped_key_errors,
            dropped_late = m.dropped_late,
            "input exhausted"
        );
        Ok(out)
    }

    /// Record a dropped or failed record the host detected before keying
    /// (or a checkpoint failure the driver observed).
    pub fn report(&mut self, issue: RuntimeIssue) {
        match &issue {
            RuntimeIssue::DroppedMalformed { .. } => self.metrics.dropped_malformed += 1,
            RuntimeIssue::DroppedKeyExtraction { .. } => self.metrics.dropped_key_errors += 1,
            RuntimeIssue::DroppedLate { .. } => self.metrics.dropped_late += 1,
            RuntimeIssue::CheckpointFailed { .. } => {}
        }
        self.issues.push(issue);
    }

    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.metrics
    }

    /// Hand accumulated issues to the host, clearing the buffer.
    pub fn drain_issues(&mut self) -> Vec<RuntimeIssue> {
        std::mem::take(&mut self.issues)
    }

    /// Rebuild in-memory indexes (key registry, live sessions, timers,
    /// lateness horizons) from restored store contents. Call once after a
    /// checkpoint restore.
    pub fn rehydrate(&mut self) -> Result<()> {
        self.sessions.clear();
        self.keys.clear();
        self.purge_horizon.clear();
        let mut namespaces = 0usize;
        for ns in self.store.namespaces() {
            namespaces += 1;
            let key: K = bincode::deserialize(&ns.key)
                .context("decoding restored namespace key")?;
            self.keys.insert(ns.key.clone(), key);
            match ns.window {
                WindowId::Global => {
                    self.store.bind(ns.clone());
                    let cell: ValueCell<Timestamp> =
                        ValueCell::new(self.store.clone(), HORIZON_CELL);
                    if let Some(horizon) = cell.get()? {
                        self.purge_horizon.insert(ns.key.clone(), horizon);
                    }
                }
                WindowId::Time(w) => {
                    if self.assigner.is_session() {
                        self.sessions.entry(ns.key.clone()).or_default().push(w);
                    }
                    if let Some(deadline) = self.trigger.timer_deadline(&ns.window) {
                        self.timers
                            .register(TimerKey { key: ns.key.clone(), window: ns.window }, deadline);
                    }
                }
            }
        }
        info!(namespaces, "rehydrated from restored state");
        Ok(())
    }

    /// Merge the proto-window `[ts, ts + gap)` with every live session it
    /// touches, folding absorbed accumulators into the merged window.
    fn merge_sessions(&mut self, key_bytes: &[u8], proto: TimeWindow) -> Result<TimeWindow> {
        let live = self.sessions.get(key_bytes).cloned().unwrap_or_default();
        let overlapping: Vec<TimeWindow> =
            live.iter().copied().filter(|w| w.intersects(&proto)).collect();

        let mut merged = proto;
        for w in &overlapping {
            merged = merged.cover(w);
        }

        for old in &overlapping {
            if *old == merged {
                continue;
            }
            let old_id = WindowId::Time(*old);
            let old_ns = Namespace::new(key_bytes.to_vec(), old_id);
            self.store.bind(old_ns.clone());
            let carried =
                ReducingCell::<V>::new(self.store.clone(), ACC_CELL, self.merge.clone()).get()?;
            self.store.purge_namespace(&old_ns)?;
            self.timers
                .cancel(&TimerKey { key: key_bytes.to_vec(), window: old_id });
            if let Some(value) = carried {
                self.store
                    .bind(Namespace::new(key_bytes.to_vec(), WindowId::Time(merged)));
                ReducingCell::new(self.store.clone(), ACC_CELL, self.merge.clone()).add(&value)?;
            }
            self.metrics.merged_sessions += 1;
            debug!(
                old_start = old.start,
                old_end = old.end,
                merged_start = merged.start,
                merged_end = merged.end,
                "absorbed session window"
            );
        }

        let live = self.sessions.entry(key_bytes.to_vec()).or_default();
        live.retain(|w| !w.intersects(&merged));
        live.push(merged);
        Ok(merged)
    }

    fn apply_decision(
        &mut self,
        decision: TriggerDecision,
        key_bytes: &[u8],
        window: WindowId,
        out: &mut Vec<WindowResult<K, V>>,
    ) -> Result<()> {
        if decision == TriggerDecision::Continue {
            return Ok(());
        }
        if decision.fires() {
            let acc = ReducingCell::new(self.store.clone(), ACC_CELL, self.merge.clone());
            if let Some(value) = acc.get()? {
                let key = self
                    .keys
                    .get(key_bytes)
                    .cloned()
                    .context("firing window for unregistered key")?;
                let (start, end) = window.bounds();
                out.push(WindowResult::new(start, end, key, value));
                self.metrics.records_out += 1;
                self.metrics.fires += 1;
                if decision == TriggerDecision::Fire {
                    // The window lives on but the next fire accumulates
                    // from scratch.
                    acc.clear()?;
                }
            }
        }
        if decision.purges() {
            self.purge(key_bytes, window)?;
        }
        Ok(())
    }

    /// Drop all state for a window instance and remember its end as the
    /// key's lateness horizon.
    fn purge(&mut self, key_bytes: &[u8], window: WindowId) -> Result<()> {
        self.store
            .purge_namespace(&Namespace::new(key_bytes.to_vec(), window))?;
        self.timers
            .cancel(&TimerKey { key: key_bytes.to_vec(), window });
        self.metrics.purges += 1;
        if let WindowId::Time(w) = window {
            let horizon = self.purge_horizon.entry(key_bytes.to_vec()).or_insert(0);
            *horizon = (*horizon).max(w.end);
            let horizon = *horizon;
            self.store.bind(Namespace::global(key_bytes.to_vec()));
            ValueCell::new(self.store.clone(), HORIZON_CELL).set(&horizon)?;
            if let Some(live) = self.sessions.get_mut(key_bytes) {
                live.retain(|s| *s != w);
            }
        }
        Ok(())
    }
}
