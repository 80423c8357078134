//! Sinks fed by the view-state store.
//!
//! Each sink is a [`SnapshotObserver`](crate::store::SnapshotObserver) and
//! only ever sees the store's transitions, never another sink. A disabled
//! sink is simply not registered.

pub mod debug;
pub mod persistence;
pub mod sync;

pub use debug::{DebugSink, DEBUG_TARGET};
pub use persistence::PersistenceSink;
pub use sync::SyncSink;
