//! Object lifecycle tracking.
//!
//! `LifecycleStore` is a side table of per-object metadata keyed by tracker
//! identifier; tracked objects themselves are never mutated. The
//! `LifecycleListener` capability receives the tracker's enter/exit
//! notifications, and `EventLifecycleListener` turns them into events.

mod listener;
mod store;

pub use listener::{EventLifecycleListener, FanoutListener, LifecycleListener, LoggingListener, NoopListener};
pub use store::{LifecycleEntry, LifecycleStore};
