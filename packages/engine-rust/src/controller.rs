//! Table controller: one table instance wired end to end.
//!
//! Patches go to the [`ViewStateStore`], which fans out to the sinks; the
//! committed snapshot then goes to the [`FetchCoordinator`], whose fetches run
//! as spawned tasks tied to the instance lifecycle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smarttable_core::{
    clamp_page_index, page_count_for, ColumnDef, ExportRenderer, FetchRequest, FetchResult,
    FetchSource, Row, StateStorage, SyncTransport, TableDocument, TableDocumentRenderer,
    ViewState, ViewStatePatch,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TableConfig;
use crate::error::{ConfigurationError, ExportError, FetchError, SyncError};
use crate::fetch::{Evaluation, FetchCoordinator, FetchOutcome, FetchView, Ticket};
use crate::lifecycle::{InstanceState, LifecycleController};
use crate::sinks::{DebugSink, PersistenceSink, SyncSink};
use crate::store::{restore_snapshot, CompositeSnapshotObserver, ViewStateStore};
use crate::sync::{BackgroundWorker, HttpSyncTransport, SyncRunnable, SyncTask};

/// Identity of one table instance, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(Uuid);

impl TableId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything the display surface renders.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOutput {
    pub view_state: Arc<ViewState>,
    /// Last successful fetch result. Survives failed fetches.
    pub result: Option<Arc<FetchResult>>,
    pub page_count: usize,
    pub is_loading: bool,
    /// Error of the most recent fetch, if it failed.
    pub error: Option<FetchError>,
}

impl TableOutput {
    /// Rows of the visible page.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        match &self.result {
            Some(result) => &result.rows,
            None => &[],
        }
    }

    fn compose(view_state: Arc<ViewState>, fetch: FetchView, config: &TableConfig) -> Self {
        let page_count = if fetch.result.is_none() && !config.manual_pagination {
            page_count_for(config.row_count, view_state.pagination.page_size)
        } else {
            fetch.page_count
        };
        Self {
            view_state,
            result: fetch.result,
            page_count,
            is_loading: fetch.is_loading,
            error: fetch.error,
        }
    }
}

/// Result of one patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    /// Snapshot after the patch (and any page-index clamp).
    pub view_state: Arc<ViewState>,
    /// `Skipped`, `Fetching`, or `Failed` if no request could be derived.
    pub fetch: FetchOutcome,
}

/// Receives a fresh [`TableOutput`] whenever the view or the fetch side
/// changes. Bursts are coalesced.
pub struct OutputSubscription {
    view: watch::Receiver<Arc<ViewState>>,
    fetch: watch::Receiver<FetchView>,
    config: Arc<TableConfig>,
}

impl OutputSubscription {
    /// Latest output without waiting.
    #[must_use]
    pub fn current(&mut self) -> TableOutput {
        let view = Arc::clone(&self.view.borrow_and_update());
        let fetch = self.fetch.borrow_and_update().clone();
        TableOutput::compose(view, fetch, &self.config)
    }

    /// Waits for the next change. `None` once the table is gone.
    pub async fn changed(&mut self) -> Option<TableOutput> {
        tokio::select! {
            r = self.view.changed() => r.ok()?,
            r = self.fetch.changed() => r.ok()?,
        }
        Some(self.current())
    }
}

/// Builder for [`TableController`].
pub struct TableBuilder {
    columns: Vec<ColumnDef>,
    source: Arc<dyn FetchSource>,
    config: TableConfig,
    storage: Option<Arc<dyn StateStorage>>,
    sync_transport: Option<Arc<dyn SyncTransport>>,
    initial: Option<ViewState>,
}

impl TableBuilder {
    #[must_use]
    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage backend for persistence. Required when persistence is enabled.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn StateStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Transport for backend sync. Defaults to [`HttpSyncTransport`].
    #[must_use]
    pub fn sync_transport(mut self, transport: Arc<dyn SyncTransport>) -> Self {
        self.sync_transport = Some(transport);
        self
    }

    /// Initial snapshot used when nothing is persisted.
    #[must_use]
    pub fn initial_state(mut self, state: ViewState) -> Self {
        self.initial = Some(state);
        self
    }

    /// Validates the configuration, restores persisted state, starts the sync
    /// worker, and dispatches the first fetch.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for an invalid setup.
    pub fn build(self) -> Result<TableController, ConfigurationError> {
        let Self {
            columns,
            source,
            config,
            storage,
            sync_transport,
            initial,
        } = self;

        config.validate(&columns)?;

        let id = TableId::new();
        let default_view = initial.unwrap_or_else(|| ViewState::with_page_size(config.initial_page_size));
        let mut observers = CompositeSnapshotObserver::default();

        let initial = match &config.persistence {
            Some(persistence) => {
                let storage = storage.ok_or(ConfigurationError::MissingStorage)?;
                let restored = restore_snapshot(&*storage, &persistence.storage_key, default_view);
                observers.add(Arc::new(PersistenceSink::new(
                    storage,
                    persistence.storage_key.clone(),
                )));
                restored
            }
            None => default_view,
        };

        let (sync_tx, sync_worker) = match &config.backend_sync {
            Some(sync) => {
                let transport: Arc<dyn SyncTransport> = match sync_transport {
                    Some(transport) => transport,
                    None => Arc::new(HttpSyncTransport::from_config(sync)?),
                };
                let throttled = sync.is_throttled();
                let runnable = SyncRunnable::new(transport, sync.target(), throttled);
                let worker = BackgroundWorker::start(runnable, throttled.then_some(sync.sync_interval));
                let tx = worker.sender();
                if sync.enable_auto_sync {
                    if let Some(tx) = &tx {
                        observers.add(Arc::new(SyncSink::new(tx.clone())));
                    }
                }
                (tx, Some(worker))
            }
            None => (None, None),
        };

        if config.debug_mode {
            observers.add(Arc::new(DebugSink::new(id.to_string())));
        }

        let columns: Arc<[ColumnDef]> = columns.into();
        let coordinator =
            FetchCoordinator::new(source, Arc::clone(&columns), config.row_count_config());

        info!(
            table_id = %id,
            columns = columns.len(),
            sinks = observers.len(),
            persistence = config.persistence.is_some(),
            backend_sync = config.backend_sync.is_some(),
            "table created"
        );

        let inner = Arc::new(Inner {
            id,
            columns,
            store: ViewStateStore::new(initial, observers),
            coordinator,
            lifecycle: LifecycleController::new(),
            patch_lock: Mutex::new(()),
            sync_tx,
            sync_worker: Mutex::new(sync_worker),
            config: Arc::new(config),
        });

        {
            let _guard = inner.patch_lock.lock();
            let view = inner.store.snapshot();
            inner.evaluate(&view);
        }

        Ok(TableController { inner })
    }
}

/// One table instance.
///
/// Owns its view state, fetch dispatch record, and sink handles; nothing is
/// shared between instances. Call [`shutdown`](Self::shutdown) to tear down;
/// dropping the controller also stops dispatching but cannot wait.
pub struct TableController {
    inner: Arc<Inner>,
}

struct Inner {
    id: TableId,
    columns: Arc<[ColumnDef]>,
    store: ViewStateStore,
    coordinator: FetchCoordinator,
    lifecycle: LifecycleController,
    /// Serializes commit + evaluation so the coordinator always sees
    /// snapshots in commit order.
    patch_lock: Mutex<()>,
    sync_tx: Option<mpsc::Sender<SyncTask>>,
    sync_worker: Mutex<Option<BackgroundWorker<SyncRunnable>>>,
    config: Arc<TableConfig>,
}

impl TableController {
    /// Starts building a table over `columns` fed by `source`.
    #[must_use]
    pub fn builder(columns: Vec<ColumnDef>, source: Arc<dyn FetchSource>) -> TableBuilder {
        TableBuilder {
            columns,
            source,
            config: TableConfig::default(),
            storage: None,
            sync_transport: None,
            initial: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> TableId {
        self.inner.id
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.inner.columns
    }

    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.inner.config
    }

    /// Applies a partial view-state update.
    ///
    /// Sinks run synchronously; a fetch, if warranted, is dispatched in the
    /// background and this returns `Fetching` without waiting for it. After
    /// teardown patches are ignored.
    pub fn patch(&self, patch: &ViewStatePatch) -> PatchOutcome {
        if !self.inner.lifecycle.is_active() {
            return PatchOutcome {
                view_state: self.inner.store.snapshot(),
                fetch: FetchOutcome::Skipped,
            };
        }

        let _guard = self.inner.patch_lock.lock();
        let view = self.inner.store.patch(patch);
        let fetch = self.inner.evaluate(&view);
        PatchOutcome {
            view_state: self.inner.store.snapshot(),
            fetch,
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ViewState> {
        self.inner.store.snapshot()
    }

    /// Effective fetch request for the current snapshot, without dispatching.
    #[must_use]
    pub fn effective_request(&self) -> FetchRequest {
        FetchRequest::derive(
            &self.inner.store.snapshot(),
            &self.inner.columns,
            self.inner.config.row_count_config(),
            None,
        )
    }

    /// Current output.
    #[must_use]
    pub fn output(&self) -> TableOutput {
        TableOutput::compose(
            self.inner.store.snapshot(),
            self.inner.coordinator.view(),
            &self.inner.config,
        )
    }

    /// Subscribes to output changes.
    #[must_use]
    pub fn subscribe(&self) -> OutputSubscription {
        OutputSubscription {
            view: self.inner.store.subscribe(),
            fetch: self.inner.coordinator.subscribe(),
            config: Arc::clone(&self.inner.config),
        }
    }

    /// Waits until no fetch is loading and returns the output.
    pub async fn settled(&self) -> TableOutput {
        let mut rx = self.inner.coordinator.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.wait_for(|view| !view.is_loading).await;
        self.output()
    }

    /// Fetches the current request again even though nothing changed.
    pub fn refresh(&self) -> FetchOutcome {
        if !self.inner.lifecycle.is_active() {
            return FetchOutcome::Skipped;
        }
        let _guard = self.inner.patch_lock.lock();
        self.inner.coordinator.refresh();
        let view = self.inner.store.snapshot();
        self.inner.evaluate(&view)
    }

    /// Pushes the current snapshot to the backend now, bypassing the
    /// throttle.
    ///
    /// # Errors
    ///
    /// [`SyncError::Disabled`] without backend sync, [`SyncError::WorkerStopped`]
    /// after teardown, or the transport's failure.
    pub async fn sync_now(&self) -> Result<(), SyncError> {
        let tx = self.inner.sync_tx.as_ref().ok_or(SyncError::Disabled)?;
        let (reply, rx) = oneshot::channel();
        let snapshot = Arc::new(self.inner.store.snapshot().persisted());
        tx.send(SyncTask::Manual { snapshot, reply })
            .await
            .map_err(|_| SyncError::WorkerStopped)?;
        rx.await.map_err(|_| SyncError::WorkerStopped)?
    }

    /// Renders the visible page with the built-in document renderer.
    ///
    /// # Errors
    ///
    /// [`ExportError::Disabled`] without export options, or the renderer's
    /// failure.
    pub fn export(&self) -> Result<TableDocument, ExportError> {
        self.export_with(&TableDocumentRenderer)
    }

    /// Renders the visible page with `renderer`.
    ///
    /// # Errors
    ///
    /// [`ExportError::Disabled`] without export options, or the renderer's
    /// failure.
    pub fn export_with<R: ExportRenderer>(&self, renderer: &R) -> Result<R::Document, ExportError> {
        let options = self.inner.config.export.as_ref().ok_or(ExportError::Disabled)?;
        let output = self.output();
        let document = renderer.render(output.rows(), &self.inner.columns, &output.view_state, options)?;
        Ok(document)
    }

    /// Lifecycle state of this instance.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.inner.lifecycle.state()
    }

    /// Tears the instance down.
    ///
    /// Stops dispatching, drops late fetch responses, cancels the sync timer
    /// (a pending throttled sync is discarded), and waits up to the configured
    /// drain timeout for running fetch tasks to exit. Nothing is persisted.
    pub async fn shutdown(&self) {
        self.inner.begin_teardown();

        let worker = self.inner.sync_worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop().await;
        }

        if self.inner.lifecycle.wait_for_drain(self.inner.config.drain_timeout).await {
            info!(table_id = %self.inner.id, "table torn down");
        } else {
            warn!(
                table_id = %self.inner.id,
                in_flight = self.inner.lifecycle.in_flight_count(),
                "teardown timed out waiting for fetches"
            );
        }
    }
}

impl Drop for TableController {
    fn drop(&mut self) {
        self.inner.begin_teardown();
    }
}

impl fmt::Debug for TableController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableController")
            .field("id", &self.inner.id)
            .field("state", &self.inner.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Runs the coordinator on `view`. Caller holds `patch_lock`.
    fn evaluate(self: &Arc<Self>, view: &ViewState) -> FetchOutcome {
        let evaluation = match self.coordinator.begin(view) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                warn!(table_id = %self.id, error = %err, "cannot derive fetch request");
                return FetchOutcome::Failed(err);
            }
        };

        self.reconcile_page_index(view, evaluation.request());

        match evaluation {
            Evaluation::Skipped { .. } => FetchOutcome::Skipped,
            Evaluation::Dispatch(ticket) => {
                self.spawn_fetch(ticket);
                FetchOutcome::Fetching
            }
        }
    }

    /// Writes a clamped page index back into the store.
    ///
    /// The clamped request was already evaluated, so this commit does not
    /// evaluate again.
    fn reconcile_page_index(&self, view: &ViewState, request: &FetchRequest) {
        if request.page_index == view.pagination.page_index {
            return;
        }
        debug!(
            table_id = %self.id,
            from = view.pagination.page_index,
            to = request.page_index,
            "clamping page index"
        );
        self.store.patch(&ViewStatePatch::new().pagination(request.page_index, request.page_size));
    }

    fn spawn_fetch(self: &Arc<Self>, ticket: Ticket) {
        let inner = Arc::clone(self);
        let guard = self.lifecycle.in_flight_guard();
        let mut shutdown = self.lifecycle.shutdown_receiver();

        tokio::spawn(async move {
            let _guard = guard;
            let outcome = tokio::select! {
                outcome = inner.coordinator.run(ticket) => outcome,
                _ = shutdown.wait_for(|stopping| *stopping) => return,
            };
            if let FetchOutcome::Resolved(result) = outcome {
                inner.after_resolved(&result);
            }
        });
    }

    /// Pulls the page index back inside a page count that shrank under it.
    ///
    /// An empty result has no valid page but the first.
    fn after_resolved(self: &Arc<Self>, result: &FetchResult) {
        if !self.lifecycle.is_active() {
            return;
        }
        let _guard = self.patch_lock.lock();
        let view = self.store.snapshot();
        let clamped = clamp_page_index(view.pagination.page_index, result.page_count);
        if clamped == view.pagination.page_index {
            return;
        }
        debug!(
            table_id = %self.id,
            from = view.pagination.page_index,
            to = clamped,
            page_count = result.page_count,
            "page count shrank, clamping"
        );
        let view = self
            .store
            .patch(&ViewStatePatch::new().pagination(clamped, view.pagination.page_size));
        self.evaluate(&view);
    }

    /// Synchronous part of teardown. Idempotent.
    fn begin_teardown(&self) {
        if !self.lifecycle.is_active() {
            return;
        }
        self.lifecycle.trigger_shutdown();
        self.coordinator.close();
        self.store.teardown();
    }
}
