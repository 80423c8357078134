//! Snapshot observer trait and composite implementation.
//!
//! Defines [`SnapshotObserver`] for reacting to committed view-state
//! transitions within a [`ViewStateStore`](super::ViewStateStore), and
//! [`CompositeSnapshotObserver`] which fans out notifications to multiple
//! observers in registration order.

use std::sync::Arc;

use smarttable_core::{ViewState, ViewStatePatch};

/// One committed change: the snapshot before, the patch, the snapshot after.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub previous: &'a Arc<ViewState>,
    pub patch: &'a ViewStatePatch,
    pub next: &'a Arc<ViewState>,
}

impl Transition<'_> {
    /// Whether the commit changed anything outside the interaction flags.
    #[must_use]
    pub fn changes_persisted_state(&self) -> bool {
        let mut previous = (**self.previous).clone();
        previous.interaction = self.next.interaction.clone();
        previous != **self.next
    }
}

/// Observer of committed view-state transitions.
///
/// Implementations are sinks: persistence, backend sync, diagnostics. They
/// must not call back into the store and never see each other.
///
/// Used as `Arc<dyn SnapshotObserver>`.
pub trait SnapshotObserver: Send + Sync {
    /// Called after a patch has been merged and published.
    fn on_commit(&self, transition: &Transition<'_>);

    /// Called once when the owning table instance is torn down.
    fn on_teardown(&self) {}
}

/// Composite observer that fans out to multiple observers.
#[derive(Default)]
pub struct CompositeSnapshotObserver {
    observers: Vec<Arc<dyn SnapshotObserver>>,
}

impl CompositeSnapshotObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn SnapshotObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn SnapshotObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SnapshotObserver for CompositeSnapshotObserver {
    fn on_commit(&self, transition: &Transition<'_>) {
        for observer in &self.observers {
            observer.on_commit(transition);
        }
    }

    fn on_teardown(&self) {
        for observer in &self.observers {
            observer.on_teardown();
        }
    }
}
