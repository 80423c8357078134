//! Configuration types for a table instance.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use smarttable_core::{ColumnDef, ExportOptions, RowCountConfig, SyncTarget};

use crate::error::ConfigurationError;

/// Storage key used when the caller does not supply one.
pub const DEFAULT_STORAGE_KEY: &str = "smart-table-state";

/// Default interval between automatic backend syncs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(30_000);

/// Top-level configuration for one table instance.
///
/// Optional sinks are `None` when disabled; a disabled sink's settings are
/// never read.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Page size of the default snapshot.
    pub initial_page_size: usize,
    /// Total rows the source holds (or generates).
    pub row_count: u64,
    /// Source reports exact page counts when true; otherwise the page count is
    /// computed from `row_count`.
    pub manual_pagination: bool,
    /// Local persistence of the view state.
    pub persistence: Option<PersistenceConfig>,
    /// Backend state synchronization.
    pub backend_sync: Option<BackendSyncConfig>,
    /// On-demand export.
    pub export: Option<ExportOptions>,
    /// Emit a diagnostic record for every state transition.
    pub debug_mode: bool,
    /// How long teardown waits for in-flight fetches before giving up.
    pub drain_timeout: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_page_size: 10,
            row_count: 10_000,
            manual_pagination: true,
            persistence: None,
            backend_sync: None,
            export: None,
            debug_mode: false,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl TableConfig {
    /// Row-count settings as seen by the fetch coordinator.
    #[must_use]
    pub fn row_count_config(&self) -> RowCountConfig {
        RowCountConfig {
            row_count_hint: self.row_count,
            manual_pagination: self.manual_pagination,
        }
    }

    /// Checks the configuration against the column set.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn validate(&self, columns: &[ColumnDef]) -> Result<(), ConfigurationError> {
        if self.initial_page_size == 0 {
            return Err(ConfigurationError::ZeroPageSize);
        }

        let mut seen = HashSet::new();
        for column in columns {
            if !seen.insert(column.id.as_str()) {
                return Err(ConfigurationError::DuplicateColumn(column.id.clone()));
            }
        }

        if let Some(persistence) = &self.persistence {
            if persistence.storage_key.trim().is_empty() {
                return Err(ConfigurationError::EmptyStorageKey);
            }
        }

        if let Some(sync) = &self.backend_sync {
            if sync.endpoint.trim().is_empty() {
                return Err(ConfigurationError::MissingSyncEndpoint);
            }
        }

        if let Some(export) = &self.export {
            if !export.has_supported_page_size() {
                return Err(ConfigurationError::UnsupportedPageSize(
                    export.page_size.clone(),
                ));
            }
        }

        Ok(())
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Key the snapshot is stored under.
    pub storage_key: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Body encoding for HTTP backend sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncEncoding {
    /// `application/json`.
    #[default]
    Json,
    /// `application/msgpack` with named fields.
    MsgPack,
}

/// Backend sync settings.
///
/// No `Default` impl because the endpoint has no sensible default; use
/// [`BackendSyncConfig::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSyncConfig {
    /// URL the snapshot is posted to.
    pub endpoint: String,
    /// Bearer token attached to every request.
    pub token: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Minimum spacing between automatic syncs. Zero syncs on every change.
    pub sync_interval: Duration,
    /// Sync automatically on state changes. Manual syncs work either way.
    pub enable_auto_sync: bool,
    /// Request body encoding for the HTTP transport.
    pub encoding: SyncEncoding,
    /// Per-request timeout for the HTTP transport.
    pub request_timeout: Duration,
}

impl BackendSyncConfig {
    /// Settings for `endpoint` with default interval and auto-sync enabled.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            headers: BTreeMap::new(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            enable_auto_sync: true,
            encoding: SyncEncoding::Json,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Destination handed to the sync transport.
    #[must_use]
    pub fn target(&self) -> SyncTarget {
        SyncTarget {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Whether automatic syncs are throttled to `sync_interval`.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.enable_auto_sync && !self.sync_interval.is_zero()
    }
}
