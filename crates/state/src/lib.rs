//! Per-key, per-namespace state storage.
//!
//! Every unit of state lives in a [`Namespace`](sluice_core::Namespace) —
//! one key's one window instance — and is reached through a typed cell:
//! a single value, an append-only list, or a reducing accumulator. The
//! runtime binds a namespace before touching cells and never caches cell
//! values across events, so snapshots stay consistent.

pub mod cells;
pub mod durable;
pub mod memory;
pub mod traits;

pub use cells::{ListCell, ListSnapshot, ReducingCell, ValueCell};
pub use durable::DurableStateBackend;
pub use memory::{MemoryStateBackend, NamespacedMemoryStore};
pub use traits::{RawStateStore, StateBackend, StateKey, StateValue};
