//! Two-input rendezvous join on a shared key.
//!
//! An arrival that finds the other side buffered emits the pair and clears
//! that buffer; the pair is consumed, so the next arrival on either side
//! starts a fresh rendezvous. An arrival with no counterpart is buffered,
//! overwriting any earlier unmatched value from its own side. Unmatched
//! state never expires: a key whose counterpart never shows up stays
//! buffered for the life of the job (and through checkpoints), so an
//! eventual match is never missed.

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use sluice_core::Namespace;
use sluice_state::{RawStateStore, StateKey, StateValue, ValueCell};

const LEFT_CELL: &str = "join.left";
const RIGHT_CELL: &str = "join.right";

pub struct RendezvousJoin<K, A, B> {
    store: Arc<dyn RawStateStore>,
    pairs_emitted: u64,
    _phantom: std::marker::PhantomData<(K, A, B)>,
}

impl<K: StateKey, A: StateValue, B: StateValue> RendezvousJoin<K, A, B> {
    pub fn new(store: Arc<dyn RawStateStore>) -> Self {
        Self {
            store,
            pairs_emitted: 0,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Emit `(left, right)` and consume the buffered right value if one is
    /// waiting under the same key; otherwise buffer the left value.
    pub fn on_left(&mut self, key: &K, value: &A) -> Result<Option<(A, B)>> {
        self.bind(key)?;
        let right = ValueCell::<B>::new(self.store.clone(), RIGHT_CELL);
        match right.get()? {
            Some(matched) => {
                right.clear()?;
                self.pairs_emitted += 1;
                debug!(pairs = self.pairs_emitted, "rendezvous matched on left arrival");
                Ok(Some((value.clone(), matched)))
            }
            None => {
                ValueCell::new(self.store.clone(), LEFT_CELL).set(value)?;
                Ok(None)
            }
        }
    }

    /// Emit `(left, right)` and consume the buffered left value if one is
    /// waiting under the same key; otherwise buffer the right value.
    pub fn on_right(&mut self, key: &K, value: &B) -> Result<Option<(A, B)>> {
        self.bind(key)?;
        let left = ValueCell::<A>::new(self.store.clone(), LEFT_CELL);
        match left.get()? {
            Some(matched) => {
                left.clear()?;
                self.pairs_emitted += 1;
                debug!(pairs = self.pairs_emitted, "rendezvous matched on right arrival");
                Ok(Some((matched, value.clone())))
            }
            None => {
                ValueCell::new(self.store.clone(), RIGHT_CELL).set(value)?;
                Ok(None)
            }
        }
    }

    pub fn pairs_emitted(&self) -> u64 {
        self.pairs_emitted
    }

    fn bind(&self, key: &K) -> Result<()> {
        let key_bytes = bincode::serialize(key)?;
        self.store.bind(Namespace::global(key_bytes));
        Ok(())
    }
}
