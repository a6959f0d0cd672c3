//! Wall-clock timers for window firing.
//!
//! Deadlines come from a [`Clock`] so tests can drive time by hand. The
//! service keeps one active deadline per (key, window); re-registering moves
//! the deadline and the superseded heap entry is dropped lazily on poll.

use sluice_core::{Timestamp, WindowId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current wall-clock time in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn advance(&self, delta: Timestamp) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Identity of a pending timer: the window instance it will fire for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    pub key: Vec<u8>,
    pub window: WindowId,
}

/// Min-heap of pending deadlines with per-key deduplication.
pub struct TimerService {
    clock: Arc<dyn Clock>,
    heap: BinaryHeap<Reverse<(Timestamp, TimerKey)>>,
    active: HashMap<TimerKey, Timestamp>,
}

impl TimerService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, heap: BinaryHeap::new(), active: HashMap::new() }
    }

    pub fn now_ms(&self) -> Timestamp {
        self.clock.now_ms()
    }

    /// Register or move the deadline for a timer key.
    pub fn register(&mut self, key: TimerKey, deadline: Timestamp) {
        self.active.insert(key.clone(), deadline);
        self.heap.push(Reverse((deadline, key)));
    }

    /// Drop a pending timer. Idempotent.
    pub fn cancel(&mut self, key: &TimerKey) {
        self.active.remove(key);
    }

    pub fn pending(&self) -> usize {
        self.active.len()
    }

    /// Pop every timer whose deadline has passed, in deadline order.
    /// Cancelled and superseded entries are skipped.
    pub fn poll_expired(&mut self) -> Vec<TimerKey> {
        let now = self.clock.now_ms();
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, _))) = self.heap.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((deadline, key))) = self.heap.pop() else { break };
            if self.active.get(&key) == Some(&deadline) {
                self.active.remove(&key);
                expired.push(key);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &[u8]) -> TimerKey {
        TimerKey { key: name.to_vec(), window: WindowId::Global }
    }

    #[test]
    fn expires_in_deadline_order() {
        let clock = Arc::new(ManualClock::new(0));
        let mut timers = TimerService::new(clock.clone());
        timers.register(key(b"b"), 200);
        timers.register(key(b"a"), 100);

        assert!(timers.poll_expired().is_empty());
        clock.set(150);
        assert_eq!(timers.poll_expired(), vec![key(b"a")]);
        clock.set(250);
        assert_eq!(timers.poll_expired(), vec![key(b"b")]);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn reregistration_moves_the_deadline() {
        let clock = Arc::new(ManualClock::new(0));
        let mut timers = TimerService::new(clock.clone());
        timers.register(key(b"a"), 100);
        timers.register(key(b"a"), 300);

        clock.set(200);
        assert!(timers.poll_expired().is_empty(), "old deadline superseded");
        clock.set(300);
        assert_eq!(timers.poll_expired(), vec![key(b"a")]);
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let clock = Arc::new(ManualClock::new(0));
        let mut timers = TimerService::new(clock.clone());
        timers.register(key(b"a"), 100);
        timers.cancel(&key(b"a"));
        clock.set(500);
        assert!(timers.poll_expired().is_empty());
    }
}
