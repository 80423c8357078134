//! Collaborator seams: fetch source, state storage, sync transport, and
//! export renderer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::column::ColumnDef;
use crate::export::ExportOptions;
use crate::request::FetchRequest;
use crate::types::Row;
use crate::view_state::ViewState;

/// One page of rows returned by a [`FetchSource`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    /// Rows of the requested window, already filtered and sorted.
    pub rows: Vec<Row>,
    /// Page count as reported by the source (or computed locally when the
    /// source is not paginating).
    pub page_count: usize,
    /// Total matching rows, when the source knows it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_rows: Option<u64>,
}

/// Remote (or local) data source for table pages.
///
/// Must tolerate being called while a previous call is still pending; stale
/// results are discarded by the caller, so sources need not cancel themselves.
#[async_trait]
pub trait FetchSource: Send + Sync {
    /// Fetch one page of rows for the given request.
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchResult>;
}

/// Key-value store for persisted view-state snapshots.
///
/// Synchronous, like browser local storage. Implementations receive snapshots
/// whose interaction flags are already reset.
pub trait StateStorage: Send + Sync {
    /// Load the snapshot stored under `key`, or `None` if nothing is stored.
    fn load(&self, key: &str) -> anyhow::Result<Option<ViewState>>;

    /// Store `snapshot` under `key`, replacing any previous value.
    fn save(&self, key: &str, snapshot: &ViewState) -> anyhow::Result<()>;
}

/// Destination of backend state synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncTarget {
    /// URL the snapshot is sent to.
    pub endpoint: String,
    /// Bearer token attached to outgoing requests.
    pub token: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

/// Transport that pushes a snapshot to the backend.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Send `snapshot` to `target`.
    async fn sync(&self, target: &SyncTarget, snapshot: &ViewState) -> anyhow::Result<()>;
}

/// Renders rows into an exportable document. Invoked on demand only.
pub trait ExportRenderer {
    /// Output document type.
    type Document;

    /// Render `rows` with `columns` as laid out by `view`.
    fn render(
        &self,
        rows: &[Row],
        columns: &[ColumnDef],
        view: &ViewState,
        options: &ExportOptions,
    ) -> anyhow::Result<Self::Document>;
}
