//! Fetch coordination: derive, dedup, dispatch, and apply fetch results.
//!
//! The coordinator tracks the fingerprint of the last request it actually
//! dispatched. An evaluation whose request fingerprints the same is skipped.
//! A response is applied only while its fingerprint is still the dispatched
//! one, so a slow response to a superseded request can never overwrite the
//! result of a newer one.

use std::sync::Arc;

use parking_lot::Mutex;
use smarttable_core::{
    clamp_page_index, page_count_for, ColumnDef, FetchRequest, FetchResult, FetchSource,
    Fingerprint, RowCountConfig, ViewState,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::metrics;

/// Result of evaluating (and possibly running) a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The effective request matches the one already dispatched.
    Skipped,
    /// A fetch was dispatched and is still running.
    Fetching,
    /// The fetch succeeded and its result is now visible.
    Resolved(Arc<FetchResult>),
    /// The fetch failed; the previous result stays visible.
    Failed(FetchError),
    /// The response arrived after a newer request was dispatched and was
    /// dropped.
    Superseded,
}

/// A dispatched fetch waiting for its response.
#[derive(Debug, Clone)]
pub struct Ticket {
    /// Dispatch sequence number. Only the latest ticket clears the loading
    /// flag.
    pub generation: u64,
    /// Fingerprint recorded as dispatched for this request.
    pub fingerprint: Fingerprint,
    /// The request handed to the source.
    pub request: FetchRequest,
}

/// Decision taken by [`FetchCoordinator::begin`].
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// Nothing to do. Carries the (possibly clamped) effective request.
    Skipped { request: FetchRequest },
    /// A new fetch must run.
    Dispatch(Ticket),
}

impl Evaluation {
    /// The effective request, dispatched or not.
    #[must_use]
    pub fn request(&self) -> &FetchRequest {
        match self {
            Self::Skipped { request } => request,
            Self::Dispatch(ticket) => &ticket.request,
        }
    }
}

/// What the display surface sees of the fetch side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchView {
    /// Last successful result. Kept across failures.
    pub result: Option<Arc<FetchResult>>,
    /// Page count of the visible result (0 before the first result).
    pub page_count: usize,
    /// A fetch dispatched by the latest evaluation is still running.
    pub is_loading: bool,
    /// Error of the most recent completed fetch, cleared by the next success.
    pub error: Option<FetchError>,
}

#[derive(Debug, Default)]
struct DispatchState {
    dispatched: Option<Fingerprint>,
    generation: u64,
    last_result: Option<Arc<FetchResult>>,
    resolved_request: Option<FetchRequest>,
    is_loading: bool,
    last_error: Option<FetchError>,
    closed: bool,
}

impl DispatchState {
    fn view(&self) -> FetchView {
        FetchView {
            result: self.last_result.clone(),
            page_count: self.last_result.as_ref().map_or(0, |r| r.page_count),
            is_loading: self.is_loading,
            error: self.last_error.clone(),
        }
    }
}

/// Decides when a fetch is warranted and owns the visible fetch result.
pub struct FetchCoordinator {
    source: Arc<dyn FetchSource>,
    columns: Arc<[ColumnDef]>,
    rows: RowCountConfig,
    state: Mutex<DispatchState>,
    notifier: watch::Sender<FetchView>,
}

impl FetchCoordinator {
    #[must_use]
    pub fn new(source: Arc<dyn FetchSource>, columns: Arc<[ColumnDef]>, rows: RowCountConfig) -> Self {
        let (notifier, _rx) = watch::channel(FetchView::default());
        Self {
            source,
            columns,
            rows,
            state: Mutex::new(DispatchState::default()),
            notifier,
        }
    }

    /// Derives the effective request for `view` and decides whether to
    /// dispatch it.
    ///
    /// On dispatch the fingerprint is recorded and the loading flag is set
    /// before this returns, so a second evaluation of an equivalent view is
    /// skipped even while the first fetch is still running. After
    /// [`close`](Self::close) every evaluation is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Fingerprint`] if the request cannot be
    /// serialized.
    pub fn begin(&self, view: &ViewState) -> Result<Evaluation, FetchError> {
        let mut state = self.state.lock();

        let mut request = FetchRequest::derive(view, &self.columns, self.rows, None);
        if let Some(count) = self.known_page_count(&state, &request) {
            request.page_index = clamp_page_index(request.page_index, count);
        }

        if state.closed {
            return Ok(Evaluation::Skipped { request });
        }

        let fingerprint = request
            .fingerprint()
            .map_err(|e| FetchError::Fingerprint {
                message: e.to_string(),
            })?;

        if state.dispatched.as_ref() == Some(&fingerprint) {
            metrics::increment(metrics::FETCH_SKIPPED);
            debug!(fingerprint = %fingerprint, "fetch skipped, request unchanged");
            return Ok(Evaluation::Skipped { request });
        }

        state.generation += 1;
        state.dispatched = Some(fingerprint.clone());
        state.is_loading = true;
        self.notifier.send_replace(state.view());

        metrics::increment(metrics::FETCH_DISPATCHED);
        debug!(
            fingerprint = %fingerprint,
            generation = state.generation,
            page_index = request.page_index,
            page_size = request.page_size,
            "dispatching fetch"
        );

        Ok(Evaluation::Dispatch(Ticket {
            generation: state.generation,
            fingerprint,
            request,
        }))
    }

    /// Calls the source for `ticket` and applies the response.
    pub async fn run(&self, ticket: Ticket) -> FetchOutcome {
        let response = self.source.fetch(&ticket.request).await;
        self.complete(&ticket, response)
    }

    /// Evaluates `view` and, when a fetch is warranted, runs it to completion.
    pub async fn evaluate(&self, view: &ViewState) -> FetchOutcome {
        match self.begin(view) {
            Ok(Evaluation::Skipped { .. }) => FetchOutcome::Skipped,
            Ok(Evaluation::Dispatch(ticket)) => self.run(ticket).await,
            Err(err) => FetchOutcome::Failed(err),
        }
    }

    /// Applies the source's response to `ticket`.
    ///
    /// Responses whose fingerprint is no longer the dispatched one are
    /// dropped. A failure keeps the dispatched fingerprint, so unrelated
    /// patches stay deduplicated; [`refresh`](Self::refresh) retries.
    pub fn complete(&self, ticket: &Ticket, response: anyhow::Result<FetchResult>) -> FetchOutcome {
        let mut state = self.state.lock();

        if state.closed || state.dispatched.as_ref() != Some(&ticket.fingerprint) {
            metrics::increment(metrics::FETCH_SUPERSEDED);
            debug!(
                fingerprint = %ticket.fingerprint,
                generation = ticket.generation,
                "dropping superseded fetch response"
            );
            return FetchOutcome::Superseded;
        }

        let is_latest = ticket.generation == state.generation;

        let outcome = match response {
            Ok(mut result) => {
                if !ticket.request.manual_pagination {
                    result.page_count =
                        page_count_for(ticket.request.row_count_hint, ticket.request.page_size);
                }
                let result = Arc::new(result);
                state.last_result = Some(Arc::clone(&result));
                state.resolved_request = Some(ticket.request.clone());
                state.last_error = None;
                if is_latest {
                    state.is_loading = false;
                }
                FetchOutcome::Resolved(result)
            }
            Err(source) if is_latest => {
                let err = FetchError::Source {
                    message: format!("{source:#}"),
                };
                metrics::increment(metrics::FETCH_FAILED);
                warn!(
                    fingerprint = %ticket.fingerprint,
                    error = %err,
                    "fetch failed, keeping previous result"
                );
                state.is_loading = false;
                state.last_error = Some(err.clone());
                FetchOutcome::Failed(err)
            }
            Err(_) => {
                // An older dispatch of the same request; the newer one decides.
                metrics::increment(metrics::FETCH_SUPERSEDED);
                return FetchOutcome::Superseded;
            }
        };

        self.notifier.send_replace(state.view());
        outcome
    }

    /// Forgets the dispatched fingerprint so the next evaluation fetches
    /// again even if nothing changed.
    pub fn refresh(&self) {
        self.state.lock().dispatched = None;
    }

    /// Stops dispatching and drops every response still in flight.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.is_loading = false;
        self.notifier.send_replace(state.view());
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current fetch-side view.
    #[must_use]
    pub fn view(&self) -> FetchView {
        self.state.lock().view()
    }

    /// Receiver that always holds the latest fetch-side view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FetchView> {
        self.notifier.subscribe()
    }

    /// Fingerprint of the last dispatched request, if any.
    #[must_use]
    pub fn dispatched(&self) -> Option<Fingerprint> {
        self.state.lock().dispatched.clone()
    }

    /// Columns requests are derived against.
    #[must_use]
    pub fn columns(&self) -> &Arc<[ColumnDef]> {
        &self.columns
    }

    /// Page count the current result implies for `request`'s page size.
    ///
    /// Without manual pagination this is always `ceil(row_count_hint / size)`.
    /// With manual pagination it is derived from the last result, and only
    /// when that result was fetched under the same filters.
    fn known_page_count(&self, state: &DispatchState, request: &FetchRequest) -> Option<usize> {
        if !self.rows.manual_pagination {
            return Some(page_count_for(self.rows.row_count_hint, request.page_size));
        }

        let resolved = state.resolved_request.as_ref()?;
        let result = state.last_result.as_ref()?;
        if resolved.filters != request.filters {
            return None;
        }
        match result.total_rows {
            Some(total) => Some(page_count_for(total, request.page_size)),
            None if resolved.page_size == request.page_size => Some(result.page_count),
            None => None,
        }
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("rows", &self.rows)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use smarttable_core::{ColumnFilter, FilterFn, SortingRule, ViewStatePatch};

    use super::*;

    struct CountingSource {
        calls: AtomicUsize,
        total_rows: u64,
    }

    #[async_trait]
    impl FetchSource for CountingSource {
        async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchResult {
                rows: Vec::new(),
                page_count: page_count_for(self.total_rows, request.page_size),
                total_rows: Some(self.total_rows),
            })
        }
    }

    fn columns() -> Arc<[ColumnDef]> {
        vec![
            ColumnDef::new("firstName", "First Name"),
            ColumnDef::new("lastName", "Last Name"),
            ColumnDef::new("dept", "Department").with_filter_fn(FilterFn::Equals),
            ColumnDef::new("age", "Age"),
        ]
        .into()
    }

    fn coordinator(total_rows: u64, manual: bool) -> (FetchCoordinator, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            total_rows,
        });
        let coordinator = FetchCoordinator::new(
            source.clone(),
            columns(),
            RowCountConfig {
                row_count_hint: total_rows,
                manual_pagination: manual,
            },
        );
        (coordinator, source)
    }

    fn result(page_count: usize) -> FetchResult {
        FetchResult {
            rows: Vec::new(),
            page_count,
            total_rows: None,
        }
    }

    fn dispatch(coordinator: &FetchCoordinator, view: &ViewState) -> Ticket {
        match coordinator.begin(view).unwrap() {
            Evaluation::Dispatch(ticket) => ticket,
            Evaluation::Skipped { .. } => panic!("expected a dispatch"),
        }
    }

    #[tokio::test]
    async fn computes_page_count_without_manual_pagination() {
        let (coordinator, source) = coordinator(10_000, false);
        let view = ViewState::default();

        match coordinator.evaluate(&view).await {
            FetchOutcome::Resolved(result) => assert_eq!(result.page_count, 1000),
            other => panic!("expected resolved, got {other:?}"),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.view().is_loading);
    }

    #[tokio::test]
    async fn identical_evaluations_dispatch_once() {
        let (coordinator, source) = coordinator(10_000, false);
        let view = ViewState::default().merged(
            &ViewStatePatch::new().sorting(vec![SortingRule::desc("age")]),
        );

        assert!(matches!(coordinator.evaluate(&view).await, FetchOutcome::Resolved(_)));
        assert_eq!(coordinator.evaluate(&view).await, FetchOutcome::Skipped);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_begin_is_skipped_while_first_is_in_flight() {
        let (coordinator, _) = coordinator(100, true);
        let view = ViewState::default();

        let _ticket = dispatch(&coordinator, &view);
        assert!(coordinator.view().is_loading);

        let skipped = coordinator.begin(&view).unwrap();
        assert!(matches!(skipped, Evaluation::Skipped { .. }));
        assert!(coordinator.view().is_loading);
    }

    #[test]
    fn fields_outside_the_request_never_dispatch() {
        let (coordinator, _) = coordinator(100, true);
        let view = ViewState::default();
        let ticket = dispatch(&coordinator, &view);
        coordinator.complete(&ticket, Ok(result(10)));

        let reordered = view.merged(
            &ViewStatePatch::new()
                .column_order(vec!["age".into(), "firstName".into()])
                .row_selection([("3".to_string(), true)].into()),
        );
        assert!(matches!(
            coordinator.begin(&reordered).unwrap(),
            Evaluation::Skipped { .. }
        ));
    }

    #[test]
    fn late_response_for_superseded_request_is_dropped() {
        let (coordinator, _) = coordinator(100, true);
        let view_a = ViewState::default();
        let view_b = view_a.merged(&ViewStatePatch::new().sorting(vec![SortingRule::asc("age")]));

        let ticket_a = dispatch(&coordinator, &view_a);
        let ticket_b = dispatch(&coordinator, &view_b);

        let b = coordinator.complete(&ticket_b, Ok(result(7)));
        assert!(matches!(b, FetchOutcome::Resolved(_)));
        assert!(!coordinator.view().is_loading);

        let a = coordinator.complete(&ticket_a, Ok(result(3)));
        assert_eq!(a, FetchOutcome::Superseded);
        assert_eq!(coordinator.view().page_count, 7);
    }

    #[test]
    fn early_response_for_superseded_request_keeps_loading() {
        let (coordinator, _) = coordinator(100, true);
        let view_a = ViewState::default();
        let view_b = view_a.merged(&ViewStatePatch::new().global_filter("Doe"));

        let ticket_a = dispatch(&coordinator, &view_a);
        let _ticket_b = dispatch(&coordinator, &view_b);

        assert_eq!(
            coordinator.complete(&ticket_a, Ok(result(3))),
            FetchOutcome::Superseded
        );
        let view = coordinator.view();
        assert!(view.is_loading);
        assert!(view.result.is_none());
    }

    #[test]
    fn failure_keeps_previous_result_until_refresh() {
        let (coordinator, _) = coordinator(100, true);
        let view = ViewState::default();
        let first = dispatch(&coordinator, &view);
        coordinator.complete(&first, Ok(result(10)));

        let next_page = view.merged(&ViewStatePatch::new().pagination(1, 10));
        let ticket = dispatch(&coordinator, &next_page);
        let outcome = coordinator.complete(&ticket, Err(anyhow::anyhow!("503")));

        assert_eq!(
            outcome,
            FetchOutcome::Failed(FetchError::Source {
                message: "503".to_string()
            })
        );
        let shown = coordinator.view();
        assert!(!shown.is_loading);
        assert_eq!(shown.page_count, 10);
        assert!(shown.error.is_some());

        // The failed request stays deduplicated until a refresh.
        assert!(matches!(
            coordinator.begin(&next_page).unwrap(),
            Evaluation::Skipped { .. }
        ));
        let selected = next_page.merged(
            &ViewStatePatch::new().row_selection([("1".to_string(), true)].into()),
        );
        assert!(matches!(
            coordinator.begin(&selected).unwrap(),
            Evaluation::Skipped { .. }
        ));

        coordinator.refresh();
        let retry = dispatch(&coordinator, &next_page);
        assert!(matches!(
            coordinator.complete(&retry, Ok(result(10))),
            FetchOutcome::Resolved(_)
        ));
        assert!(coordinator.view().error.is_none());
    }

    #[test]
    fn shrinking_page_count_clamps_page_index() {
        let (coordinator, _) = coordinator(95, false);
        let last_page = ViewState::default().merged(&ViewStatePatch::new().pagination(9, 10));
        let ticket = dispatch(&coordinator, &last_page);
        assert_eq!(ticket.request.page_index, 9);
        coordinator.complete(&ticket, Ok(result(0)));
        assert_eq!(coordinator.view().page_count, 10);

        let wider = last_page.merged(&ViewStatePatch::new().pagination(9, 20));
        let ticket = dispatch(&coordinator, &wider);
        assert_eq!(ticket.request.page_index, 4);
        coordinator.complete(&ticket, Ok(result(0)));
        assert_eq!(coordinator.view().page_count, 5);
    }

    #[test]
    fn manual_pagination_clamps_from_reported_total() {
        let (coordinator, _) = coordinator(95, true);
        let view = ViewState::default().merged(&ViewStatePatch::new().pagination(9, 10));
        let ticket = dispatch(&coordinator, &view);
        coordinator.complete(
            &ticket,
            Ok(FetchResult {
                rows: Vec::new(),
                page_count: 10,
                total_rows: Some(95),
            }),
        );

        let wider = view.merged(&ViewStatePatch::new().pagination(9, 20));
        assert_eq!(coordinator.begin(&wider).unwrap().request().page_index, 4);
    }

    #[test]
    fn manual_pagination_does_not_clamp_across_filter_changes() {
        let (coordinator, _) = coordinator(95, true);
        let view = ViewState::default().merged(&ViewStatePatch::new().pagination(9, 10));
        let ticket = dispatch(&coordinator, &view);
        coordinator.complete(&ticket, Ok(result(10)));

        let filtered = view.merged(
            &ViewStatePatch::new().column_filters(vec![ColumnFilter::new("dept", "Eng")]),
        );
        assert_eq!(coordinator.begin(&filtered).unwrap().request().page_index, 9);
    }

    #[test]
    fn refresh_forces_a_new_dispatch() {
        let (coordinator, _) = coordinator(100, true);
        let view = ViewState::default();
        let ticket = dispatch(&coordinator, &view);
        coordinator.complete(&ticket, Ok(result(10)));

        coordinator.refresh();
        let again = dispatch(&coordinator, &view);
        assert_eq!(again.fingerprint, ticket.fingerprint);
        assert!(again.generation > ticket.generation);
    }

    #[test]
    fn closed_coordinator_drops_everything() {
        let (coordinator, _) = coordinator(100, true);
        let ticket = dispatch(&coordinator, &ViewState::default());

        coordinator.close();

        assert_eq!(
            coordinator.complete(&ticket, Ok(result(10))),
            FetchOutcome::Superseded
        );
        assert!(coordinator.view().result.is_none());
        let changed = ViewState::default().merged(&ViewStatePatch::new().global_filter("x"));
        assert!(matches!(
            coordinator.begin(&changed).unwrap(),
            Evaluation::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn subscribers_see_loading_then_result() {
        let (coordinator, _) = coordinator(100, true);
        let mut rx = coordinator.subscribe();

        let ticket = dispatch(&coordinator, &ViewState::default());
        assert!(rx.borrow_and_update().is_loading);

        coordinator.complete(&ticket, Ok(result(4)));
        rx.changed().await.unwrap();
        let view = rx.borrow_and_update().clone();
        assert!(!view.is_loading);
        assert_eq!(view.page_count, 4);
    }

    proptest::proptest! {
        #[test]
        fn local_dispatch_never_leaves_the_last_page(
            total in 0u64..5_000,
            page_size in 1usize..200,
            page_index in 0usize..1_000,
        ) {
            let (coordinator, _) = coordinator(total, false);
            let view = ViewState::default()
                .merged(&ViewStatePatch::new().pagination(page_index, page_size));

            let request = coordinator.begin(&view).unwrap().request().clone();
            let pages = page_count_for(total, page_size).max(1);
            proptest::prop_assert!(request.page_index < pages);

            // The same view again is always deduplicated.
            let skipped = matches!(
                coordinator.begin(&view).unwrap(),
                Evaluation::Skipped { .. }
            );
            proptest::prop_assert!(skipped);
        }
    }
}
