//! Source and sink seams for the job driver.

use anyhow::Result;
use parking_lot::Mutex;
use sluice_core::Event;
use std::collections::VecDeque;
use std::sync::Arc;

/// Pull-based event source.
///
/// `offset` is the number of events already handed out; checkpoints record
/// it so a restore can resume reading at the right position.
pub trait Source<T>: Send {
    /// Next event, or `None` when the source is exhausted.
    fn next(&mut self) -> Result<Option<Event<T>>>;

    /// Current read position.
    fn offset(&self) -> u64;
}

/// Receives records emitted by operators.
pub trait Sink<R>: Send {
    fn emit(&mut self, record: R) -> Result<()>;
}

/// In-memory source over a fixed event sequence.
pub struct VecSource<T> {
    events: VecDeque<Event<T>>,
    offset: u64,
}

impl<T> VecSource<T> {
    pub fn new(events: impl IntoIterator<Item = Event<T>>) -> Self {
        Self { events: events.into_iter().collect(), offset: 0 }
    }

    /// Drop events that a restored checkpoint already covers.
    pub fn seek(&mut self, offset: u64) {
        while self.offset < offset && self.events.pop_front().is_some() {
            self.offset += 1;
        }
    }
}

impl<T: Send> Source<T> for VecSource<T> {
    fn next(&mut self) -> Result<Option<Event<T>>> {
        match self.events.pop_front() {
            Some(event) => {
                self.offset += 1;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }
}

/// Sink that collects records behind a shared handle, for tests and the
/// sample jobs.
pub struct CollectingSink<R> {
    records: Arc<Mutex<Vec<R>>>,
}

impl<R> CollectingSink<R> {
    pub fn new() -> Self {
        Self { records: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Handle to the collected records, valid after the sink is consumed.
    pub fn handle(&self) -> Arc<Mutex<Vec<R>>> {
        self.records.clone()
    }
}

impl<R> Default for CollectingSink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send> Sink<R> for CollectingSink<R> {
    fn emit(&mut self, record: R) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}

impl<R, F> Sink<R> for F
where
    F: FnMut(R) -> Result<()> + Send,
{
    fn emit(&mut self, record: R) -> Result<()> {
        self(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_tracks_offset() {
        let mut source = VecSource::new([Event::new(1, "a"), Event::new(2, "b")]);
        assert_eq!(source.offset(), 0);
        assert_eq!(source.next().unwrap().unwrap().payload, "a");
        assert_eq!(source.offset(), 1);
        assert_eq!(source.next().unwrap().unwrap().payload, "b");
        assert!(source.next().unwrap().is_none());
        assert_eq!(source.offset(), 2);
    }

    #[test]
    fn seek_skips_consumed_prefix() {
        let mut source = VecSource::new([Event::new(1, "a"), Event::new(2, "b"), Event::new(3, "c")]);
        source.seek(2);
        assert_eq!(source.offset(), 2);
        assert_eq!(source.next().unwrap().unwrap().payload, "c");
    }

    #[test]
    fn collecting_sink_shares_records() {
        let mut sink = CollectingSink::new();
        let handle = sink.handle();
        sink.emit(7).unwrap();
        sink.emit(8).unwrap();
        assert_eq!(*handle.lock(), vec![7, 8]);
    }
}
