//! In-memory state store and backend.

mod backend;
mod store;

pub use backend::MemoryStateBackend;
pub use store::NamespacedMemoryStore;
