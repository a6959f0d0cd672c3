//! In-memory namespaced state store.

use anyhow::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sluice_core::Namespace;
use std::collections::HashMap;

/// One cell's payload: a single value or an append-only list.
///
/// Reducing cells share the `Value` representation; the merge happens in
/// the typed layer before the write lands here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum CellData {
    Value(Bytes),
    List(Vec<Bytes>),
}

/// In-memory store, indexed namespace-first so purging a window instance
/// removes one outer entry instead of scanning all state.
pub struct NamespacedMemoryStore {
    current: RwLock<Option<Namespace>>,
    cells: RwLock<HashMap<Namespace, HashMap<String, CellData>>>,
}

impl NamespacedMemoryStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            cells: RwLock::new(HashMap::new()),
        }
    }

    fn bound(&self) -> Result<Namespace> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no namespace bound"))
    }
}

impl Default for NamespacedMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::traits::RawStateStore for NamespacedMemoryStore {
    fn bind(&self, ns: Namespace) {
        *self.current.write() = Some(ns);
    }

    fn current(&self) -> Option<Namespace> {
        self.current.read().clone()
    }

    fn get(&self, cell: &str) -> Result<Option<Bytes>> {
        let ns = self.bound()?;
        let cells = self.cells.read();
        match cells.get(&ns).and_then(|c| c.get(cell)) {
            Some(CellData::Value(data)) => Ok(Some(data.clone())),
            Some(CellData::List(_)) => {
                anyhow::bail!("cell {cell:?} holds a list, not a value")
            }
            None => Ok(None),
        }
    }

    fn put(&self, cell: &str, value: Bytes) -> Result<()> {
        let ns = self.bound()?;
        self.cells
            .write()
            .entry(ns)
            .or_default()
            .insert(cell.to_string(), CellData::Value(value));
        Ok(())
    }

    fn push(&self, cell: &str, value: Bytes) -> Result<()> {
        let ns = self.bound()?;
        let mut cells = self.cells.write();
        let entry = cells
            .entry(ns)
            .or_default()
            .entry(cell.to_string())
            .or_insert_with(|| CellData::List(Vec::new()));
        match entry {
            CellData::List(items) => items.push(value),
            CellData::Value(_) => {
                anyhow::bail!("cell {cell:?} holds a value, not a list")
            }
        }
        Ok(())
    }

    fn read_list(&self, cell: &str) -> Result<Vec<Bytes>> {
        let ns = self.bound()?;
        let cells = self.cells.read();
        match cells.get(&ns).and_then(|c| c.get(cell)) {
            Some(CellData::List(items)) => Ok(items.clone()),
            Some(CellData::Value(_)) => {
                anyhow::bail!("cell {cell:?} holds a value, not a list")
            }
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self, cell: &str) -> Result<()> {
        let ns = self.bound()?;
        let mut cells = self.cells.write();
        if let Some(c) = cells.get_mut(&ns) {
            c.remove(cell);
            if c.is_empty() {
                cells.remove(&ns);
            }
        }
        Ok(())
    }

    fn purge_namespace(&self, ns: &Namespace) -> Result<()> {
        self.cells.write().remove(ns);
        Ok(())
    }

    fn namespaces(&self) -> Vec<Namespace> {
        self.cells.read().keys().cloned().collect()
    }

    fn snapshot(&self) -> Result<Bytes> {
        let cells = self.cells.read();
        let serialized = bincode::serialize(&*cells)?;
        Ok(Bytes::from(serialized))
    }

    fn restore(&self, data: &[u8]) -> Result<()> {
        let cells: HashMap<Namespace, HashMap<String, CellData>> = bincode::deserialize(data)?;
        *self.cells.write() = cells;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RawStateStore;
    use sluice_core::{TimeWindow, WindowId};

    fn ns(key: &[u8], window: WindowId) -> Namespace {
        Namespace::new(key.to_vec(), window)
    }

    #[test]
    fn reads_before_first_write_are_absent() {
        let store = NamespacedMemoryStore::new();
        store.bind(ns(b"k1", WindowId::Global));
        assert!(store.get("v").unwrap().is_none());
        assert!(store.read_list("l").unwrap().is_empty());
    }

    #[test]
    fn unbound_access_is_an_error() {
        let store = NamespacedMemoryStore::new();
        assert!(store.get("v").is_err());
    }

    #[test]
    fn namespaces_isolate_state() {
        let store = NamespacedMemoryStore::new();
        let w = WindowId::Time(TimeWindow::new(0, 1000));

        store.bind(ns(b"k1", w));
        store.put("v", Bytes::from_static(b"a")).unwrap();

        store.bind(ns(b"k2", w));
        assert!(store.get("v").unwrap().is_none());

        store.bind(ns(b"k1", WindowId::Global));
        assert!(store.get("v").unwrap().is_none());
    }

    #[test]
    fn purge_removes_every_cell_in_namespace_only() {
        let store = NamespacedMemoryStore::new();
        let target = ns(b"k1", WindowId::Time(TimeWindow::new(0, 1000)));
        let other = ns(b"k1", WindowId::Time(TimeWindow::new(1000, 2000)));

        store.bind(target.clone());
        store.put("v", Bytes::from_static(b"a")).unwrap();
        store.push("l", Bytes::from_static(b"b")).unwrap();

        store.bind(other.clone());
        store.put("v", Bytes::from_static(b"c")).unwrap();

        store.purge_namespace(&target).unwrap();

        store.bind(target);
        assert!(store.get("v").unwrap().is_none());
        assert!(store.read_list("l").unwrap().is_empty());

        store.bind(other);
        assert_eq!(store.get("v").unwrap(), Some(Bytes::from_static(b"c")));
    }

    #[test]
    fn clear_is_idempotent() {
        let store = NamespacedMemoryStore::new();
        store.bind(ns(b"k1", WindowId::Global));
        store.clear("missing").unwrap();
        store.put("v", Bytes::from_static(b"a")).unwrap();
        store.clear("v").unwrap();
        store.clear("v").unwrap();
        assert!(store.get("v").unwrap().is_none());
    }

    #[test]
    fn list_preserves_append_order() {
        let store = NamespacedMemoryStore::new();
        store.bind(ns(b"k1", WindowId::Global));
        for b in [b"1", b"2", b"3"] {
            store.push("l", Bytes::from_static(b)).unwrap();
        }
        let items = store.read_list("l").unwrap();
        assert_eq!(items, vec![
            Bytes::from_static(b"1"),
            Bytes::from_static(b"2"),
            Bytes::from_static(b"3"),
        ]);
    }

    #[test]
    fn snapshot_restore_roundtrip() {
        let store = NamespacedMemoryStore::new();
        store.bind(ns(b"k1", WindowId::Global));
        store.put("v", Bytes::from_static(b"a")).unwrap();
        store.push("l", Bytes::from_static(b"b")).unwrap();

        let snap = store.snapshot().unwrap();

        let fresh = NamespacedMemoryStore::new();
        fresh.restore(&snap).unwrap();
        fresh.bind(ns(b"k1", WindowId::Global));
        assert_eq!(fresh.get("v").unwrap(), Some(Bytes::from_static(b"a")));
        assert_eq!(fresh.read_list("l").unwrap(), vec![Bytes::from_static(b"b")]);
    }

    #[test]
    fn mismatched_cell_kind_is_an_error() {
        let store = NamespacedMemoryStore::new();
        store.bind(ns(b"k1", WindowId::Global));
        store.put("v", Bytes::from_static(b"a")).unwrap();
        assert!(store.push("v", Bytes::from_static(b"b")).is_err());
        assert!(store.read_list("v").is_err());
    }
}
