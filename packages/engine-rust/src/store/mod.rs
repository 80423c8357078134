//! View-state store and the observer seam its sinks plug into.

pub mod observer;
pub mod view_store;

pub use observer::{CompositeSnapshotObserver, SnapshotObserver, Transition};
pub use view_store::{restore_snapshot, ViewStateStore};
