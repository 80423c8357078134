//! `SmartTable` Core: view state, fetch requests, fingerprints, and query evaluation.

pub mod column;
pub mod export;
pub mod hash;
pub mod query;
pub mod request;
pub mod traits;
pub mod types;
pub mod view_state;

pub use column::{ColumnDef, FilterFn};
pub use export::{ExportOptions, Orientation, TableDocument, TableDocumentRenderer};
pub use hash::Fingerprint;
pub use request::{
    clamp_page_index, page_count_for, FetchRequest, FilterClause, FilterSet, RowCountConfig,
};
pub use traits::{ExportRenderer, FetchResult, FetchSource, StateStorage, SyncTarget, SyncTransport};
pub use types::{Row, Value};
pub use view_state::{
    ColumnFilter, ColumnPinning, ColumnSizingInfo, Density, InteractionState, PaginationState,
    RowPinning, SortingRule, ViewState, ViewStatePatch, DEFAULT_PAGE_SIZE,
};
