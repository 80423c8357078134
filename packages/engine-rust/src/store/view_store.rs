//! Copy-on-write view-state store with ordered sink fan-out.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use smarttable_core::{StateStorage, ViewState, ViewStatePatch};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::observer::{CompositeSnapshotObserver, SnapshotObserver, Transition};
use crate::error::PersistenceError;

/// Owns the current [`ViewState`] snapshot of one table instance.
///
/// Every patch produces a new `Arc<ViewState>`; earlier snapshots held by
/// subscribers or sinks are never touched. Readers take the current snapshot
/// lock-free. Writers are serialized so that observers see commits in order.
pub struct ViewStateStore {
    current: ArcSwap<ViewState>,
    write_lock: Mutex<()>,
    notifier: watch::Sender<Arc<ViewState>>,
    observers: CompositeSnapshotObserver,
}

impl ViewStateStore {
    /// Creates a store holding `initial`, fanning out to `observers`.
    #[must_use]
    pub fn new(initial: ViewState, observers: CompositeSnapshotObserver) -> Self {
        let initial = Arc::new(initial.normalized());
        let (notifier, _rx) = watch::channel(Arc::clone(&initial));
        Self {
            current: ArcSwap::new(initial),
            write_lock: Mutex::new(()),
            notifier,
            observers,
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ViewState> {
        self.current.load_full()
    }

    /// Receiver that always holds the latest committed snapshot.
    ///
    /// Intermediate snapshots may be skipped by slow receivers.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewState>> {
        self.notifier.subscribe()
    }

    /// Shallow-merges `patch` into the current snapshot and publishes the
    /// result.
    ///
    /// Subscribers are notified first, then observers in registration order
    /// (persistence, sync, diagnostics). Observer failures never reach the
    /// caller. Observers must not patch the store from inside `on_commit`.
    pub fn patch(&self, patch: &ViewStatePatch) -> Arc<ViewState> {
        let _guard = self.write_lock.lock();

        let previous = self.current.load_full();
        if patch.is_empty() {
            return previous;
        }

        let next = Arc::new(previous.merged(patch));
        self.current.store(Arc::clone(&next));
        self.notifier.send_replace(Arc::clone(&next));

        self.observers.on_commit(&Transition {
            previous: &previous,
            patch,
            next: &next,
        });

        next
    }

    /// Notifies observers that the owning instance is going away.
    ///
    /// Nothing is persisted at teardown.
    pub fn teardown(&self) {
        let _guard = self.write_lock.lock();
        self.observers.on_teardown();
    }
}

impl std::fmt::Debug for ViewStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStateStore")
            .field("current", &self.current.load())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

/// Loads the persisted snapshot under `key`, falling back to `default`.
///
/// Load failures are logged and fall back to `default`. The page size of a
/// restored snapshot is normalized like any other commit.
pub fn restore_snapshot(storage: &dyn StateStorage, key: &str, default: ViewState) -> ViewState {
    match storage.load(key) {
        Ok(Some(saved)) => {
            debug!(key, "restored persisted view state");
            saved.normalized()
        }
        Ok(None) => default,
        Err(source) => {
            let err = PersistenceError::Load {
                key: key.to_string(),
                source,
            };
            warn!(error = %err, "falling back to default view state");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use smarttable_core::{ColumnFilter, InteractionState, SortingRule};

    use super::*;

    struct Recorder {
        seen: Mutex<Vec<(Arc<ViewState>, Arc<ViewState>)>>,
        teardowns: AtomicUsize,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                teardowns: AtomicUsize::new(0),
            })
        }
    }

    impl SnapshotObserver for Recorder {
        fn on_commit(&self, transition: &Transition<'_>) {
            self.seen
                .lock()
                .push((Arc::clone(transition.previous), Arc::clone(transition.next)));
        }

        fn on_teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct FailingStorage;

    impl StateStorage for FailingStorage {
        fn load(&self, _key: &str) -> anyhow::Result<Option<ViewState>> {
            anyhow::bail!("disk on fire")
        }

        fn save(&self, _key: &str, _snapshot: &ViewState) -> anyhow::Result<()> {
            anyhow::bail!("disk on fire")
        }
    }

    struct FixedStorage(ViewState);

    impl StateStorage for FixedStorage {
        fn load(&self, _key: &str) -> anyhow::Result<Option<ViewState>> {
            Ok(Some(self.0.clone()))
        }

        fn save(&self, _key: &str, _snapshot: &ViewState) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn patch_is_copy_on_write() {
        let store = ViewStateStore::new(ViewState::default(), CompositeSnapshotObserver::default());
        let before = store.snapshot();

        let after = store.patch(&ViewStatePatch::new().sorting(vec![SortingRule::desc("age")]));

        assert!(before.sorting.is_empty());
        assert_eq!(after.sorting, vec![SortingRule::desc("age")]);
        assert!(Arc::ptr_eq(&after, &store.snapshot()));
    }

    #[test]
    fn observers_see_previous_and_next() {
        let recorder = Recorder::new();
        let store = ViewStateStore::new(
            ViewState::default(),
            CompositeSnapshotObserver::new(vec![recorder.clone()]),
        );

        store.patch(&ViewStatePatch::new().global_filter("Doe"));
        store.patch(&ViewStatePatch::new().global_filter("Smith"));

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0.global_filter, "");
        assert_eq!(seen[0].1.global_filter, "Doe");
        assert!(Arc::ptr_eq(&seen[0].1, &seen[1].0));
        assert_eq!(seen[1].1.global_filter, "Smith");
    }

    #[test]
    fn empty_patch_commits_nothing() {
        let recorder = Recorder::new();
        let store = ViewStateStore::new(
            ViewState::default(),
            CompositeSnapshotObserver::new(vec![recorder.clone()]),
        );
        let before = store.snapshot();

        let after = store.patch(&ViewStatePatch::new());

        assert!(Arc::ptr_eq(&before, &after));
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_latest_snapshot() {
        let store = ViewStateStore::new(ViewState::default(), CompositeSnapshotObserver::default());
        let mut rx = store.subscribe();

        store.patch(&ViewStatePatch::new().pagination(2, 10));
        store.patch(&ViewStatePatch::new().pagination(3, 10));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().pagination.page_index, 3);
    }

    #[test]
    fn transient_flags_live_only_in_memory() {
        let store = ViewStateStore::new(ViewState::default(), CompositeSnapshotObserver::default());
        let next = store.patch(&ViewStatePatch::new().interaction(InteractionState {
            dragging_column: Some("age".to_string()),
            ..InteractionState::default()
        }));

        assert_eq!(next.interaction.dragging_column.as_deref(), Some("age"));
        assert_eq!(next.persisted().interaction, InteractionState::default());
    }

    #[test]
    fn teardown_reaches_observers() {
        let recorder = Recorder::new();
        let store = ViewStateStore::new(
            ViewState::default(),
            CompositeSnapshotObserver::new(vec![recorder.clone()]),
        );
        store.teardown();
        assert_eq!(recorder.teardowns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn restore_falls_back_on_load_error() {
        let restored = restore_snapshot(&FailingStorage, "k", ViewState::with_page_size(25));
        assert_eq!(restored, ViewState::with_page_size(25));
    }

    #[test]
    fn restore_normalizes_saved_snapshot() {
        let mut saved = ViewState::with_page_size(0);
        saved.column_filters = vec![ColumnFilter::new("dept", "Eng"), ColumnFilter::new("dept", "Ops")];

        let restored = restore_snapshot(&FixedStorage(saved), "k", ViewState::default());

        assert_eq!(restored.pagination.page_size, 1);
        assert_eq!(restored.column_filters, vec![ColumnFilter::new("dept", "Ops")]);
    }
}
