//! Single-process execution of keyed, windowed operators.
//!
//! The runtime owns the per-key sequencing guarantee: every event is routed
//! through its key's state strictly in arrival order, so operator code never
//! sees interleaved updates for one key. Wall-clock firing goes through a
//! [`timer::TimerService`] driven by a pluggable [`timer::Clock`], which keeps
//! time-based behavior deterministic under test.

pub mod config;
pub mod driver;
pub mod io;
pub mod join;
pub mod keyed;
pub mod timer;

pub use config::{BackendKind, JobConfig};
pub use driver::{restore_job, run_job};
pub use io::{CollectingSink, Sink, Source, VecSource};
pub use join::RendezvousJoin;
pub use keyed::{KeyedWindowRuntime, ACC_CELL};
pub use timer::{Clock, ManualClock, SystemClock, TimerKey, TimerService};
