//! Error taxonomy for the table engine.
//!
//! Only [`ConfigurationError`] is ever returned from construction. Fetch,
//! persistence, and sync failures are recovered from inside the engine and
//! surface as logged events (and, for fetches, as an error flag on the
//! output) rather than as failures of the patch path.

/// Remote fetch failure. The previous result stays visible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch source failed: {message}")]
    Source { message: String },
    #[error("failed to fingerprint fetch request: {message}")]
    Fingerprint { message: String },
}

/// Storage read or write failure. Logged, never surfaced to the user.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to load view state under key {key:?}: {source}")]
    Load {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to save view state under key {key:?}: {source}")]
    Save {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Backend sync failure. Logged and retried on the next state change.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("backend sync is disabled")]
    Disabled,
    #[error("sync to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("sync worker is not running")]
    WorkerStopped,
}

/// Programming error in the table setup. Fails fast at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("backend sync is enabled but no endpoint is configured")]
    MissingSyncEndpoint,
    #[error("persistence is enabled but the storage key is empty")]
    EmptyStorageKey,
    #[error("persistence is enabled but no storage backend was provided")]
    MissingStorage,
    #[error("initial page size must be at least 1")]
    ZeroPageSize,
    #[error("duplicate column id: {0}")]
    DuplicateColumn(String),
    #[error("unsupported export page size: {0}")]
    UnsupportedPageSize(String),
    #[error("failed to build HTTP client for backend sync: {0}")]
    HttpClient(String),
}

/// On-demand export failure.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export is disabled")]
    Disabled,
    #[error("export renderer failed: {0}")]
    Render(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = PersistenceError::Save {
            key: "smart-table-state".to_string(),
            source: anyhow::anyhow!("quota exceeded"),
        };
        assert_eq!(
            err.to_string(),
            "failed to save view state under key \"smart-table-state\": quota exceeded"
        );

        let err = FetchError::Source {
            message: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "fetch source failed: timeout");
    }
}
