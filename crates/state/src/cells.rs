//! Typed state cells layered over a raw store.
//!
//! A cell is a name plus a handle to the store; it reads and writes
//! whatever namespace the runtime has bound. Values are bincode-encoded.

use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;

use crate::traits::{RawStateStore, StateValue};

/// Holds at most one typed value per namespace.
pub struct ValueCell<V> {
    store: Arc<dyn RawStateStore>,
    name: String,
    _phantom: std::marker::PhantomData<V>,
}

impl<V: StateValue> ValueCell<V> {
    pub fn new(store: Arc<dyn RawStateStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn get(&self) -> Result<Option<V>> {
        match self.store.get(&self.name)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn set(&self, value: &V) -> Result<()> {
        let data = Bytes::from(bincode::serialize(value)?);
        self.store.put(&self.name, data)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear(&self.name)
    }
}

/// An ordered, append-only sequence of typed values per namespace.
pub struct ListCell<V> {
    store: Arc<dyn RawStateStore>,
    name: String,
    _phantom: std::marker::PhantomData<V>,
}

impl<V: StateValue> ListCell<V> {
    pub fn new(store: Arc<dyn RawStateStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn append(&self, value: &V) -> Result<()> {
        let data = Bytes::from(bincode::serialize(value)?);
        self.store.push(&self.name, data)
    }

    /// Snapshot the list for iteration. The snapshot is restartable:
    /// `iter()` may be called any number of times, decoding lazily.
    pub fn read(&self) -> Result<ListSnapshot<V>> {
        Ok(ListSnapshot {
            items: self.store.read_list(&self.name)?,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear(&self.name)
    }
}

/// A point-in-time copy of a list cell's contents.
pub struct ListSnapshot<V> {
    items: Vec<Bytes>,
    _phantom: std::marker::PhantomData<V>,
}

impl<V: StateValue> ListSnapshot<V> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate the snapshot, decoding each element on demand.
    pub fn iter(&self) -> impl Iterator<Item = Result<V>> + '_ {
        self.items
            .iter()
            .map(|data| bincode::deserialize(data).map_err(Into::into))
    }
}

/// Holds one accumulated value per namespace, folded via a merge function.
pub struct ReducingCell<V> {
    store: Arc<dyn RawStateStore>,
    name: String,
    merge: Arc<dyn Fn(&V, &V) -> V + Send + Sync>,
}

impl<V: StateValue> ReducingCell<V> {
    pub fn new(
        store: Arc<dyn RawStateStore>,
        name: impl Into<String>,
        merge: Arc<dyn Fn(&V, &V) -> V + Send + Sync>,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            merge,
        }
    }

    pub fn get(&self) -> Result<Option<V>> {
        match self.store.get(&self.name)? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Fold `value` into the accumulator, seeding with `value` when absent.
    pub fn add(&self, value: &V) -> Result<()> {
        let next = match self.get()? {
            Some(current) => (self.merge)(&current, value),
            None => value.clone(),
        };
        let data = Bytes::from(bincode::serialize(&next)?);
        self.store.put(&self.name, data)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NamespacedMemoryStore;
    use sluice_core::Namespace;

    fn bound_store() -> Arc<dyn RawStateStore> {
        let store: Arc<dyn RawStateStore> = Arc::new(NamespacedMemoryStore::new());
        store.bind(Namespace::global(b"k1".to_vec()));
        store
    }

    #[test]
    fn value_cell_get_set_clear() {
        let store = bound_store();
        let cell: ValueCell<i64> = ValueCell::new(store, "counter");
        assert_eq!(cell.get().unwrap(), None);
        cell.set(&42).unwrap();
        assert_eq!(cell.get().unwrap(), Some(42));
        cell.clear().unwrap();
        assert_eq!(cell.get().unwrap(), None);
    }

    #[test]
    fn list_cell_snapshot_is_restartable() {
        let store = bound_store();
        let cell: ListCell<String> = ListCell::new(store, "users");
        cell.append(&"a".to_string()).unwrap();
        cell.append(&"b".to_string()).unwrap();

        let snap = cell.read().unwrap();
        let first: Vec<String> = snap.iter().map(|r| r.unwrap()).collect();
        let second: Vec<String> = snap.iter().map(|r| r.unwrap()).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(first, second);

        // Appends after the snapshot do not mutate it.
        cell.append(&"c".to_string()).unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(cell.read().unwrap().len(), 3);
    }

    #[test]
    fn reducing_cell_merges_in_addition_order() {
        let store = bound_store();
        let cell: ReducingCell<i64> =
            ReducingCell::new(store, "sum", Arc::new(|a: &i64, b: &i64| a + b));
        cell.add(&10).unwrap();
        cell.add(&5).unwrap();
        assert_eq!(cell.get().unwrap(), Some(15));
        cell.clear().unwrap();
        assert_eq!(cell.get().unwrap(), None);
        // Seeds again after clear.
        cell.add(&7).unwrap();
        assert_eq!(cell.get().unwrap(), Some(7));
    }
}
