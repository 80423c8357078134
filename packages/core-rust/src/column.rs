//! Column definitions and per-column filter functions.

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Matching function applied by a filter clause against a cell.
///
/// All functions compare case-insensitively. `Fuzzy` matches when the needle's
/// characters appear in order within the cell text (not necessarily adjacent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterFn {
    /// Cell text contains the needle.
    #[default]
    Contains,
    /// Cell text equals the needle.
    Equals,
    /// Cell text starts with the needle.
    StartsWith,
    /// Needle characters appear in order within the cell text.
    Fuzzy,
}

impl FilterFn {
    /// Tests a cell against a filter needle. An empty needle matches everything.
    #[must_use]
    pub fn matches(self, cell: &Value, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let haystack = cell.as_text().to_lowercase();
        let needle = needle.to_lowercase();
        match self {
            FilterFn::Contains => haystack.contains(&needle),
            FilterFn::Equals => haystack == needle,
            FilterFn::StartsWith => haystack.starts_with(&needle),
            FilterFn::Fuzzy => {
                let mut chars = haystack.chars();
                needle.chars().all(|n| chars.any(|h| h == n))
            }
        }
    }
}

/// Definition of one table column as seen by the controller.
///
/// Only `filterable` columns receive the global filter fan-out, and only
/// `exportable` columns appear in exported documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Accessor key; the row field this column reads.
    pub id: String,
    /// Display header.
    pub header: String,
    /// Whether the global filter is applied to this column.
    pub filterable: bool,
    /// Whether sorting by this column is allowed.
    pub sortable: bool,
    /// Whether this column is included in exports.
    pub exportable: bool,
    /// Filter function used for this column when the view state has no override.
    pub filter_fn: FilterFn,
}

impl ColumnDef {
    /// Creates a filterable, sortable, exportable column using `contains` matching.
    #[must_use]
    pub fn new(id: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            header: header.into(),
            filterable: true,
            sortable: true,
            exportable: true,
            filter_fn: FilterFn::Contains,
        }
    }

    /// Excludes this column from the global filter.
    #[must_use]
    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    /// Disallows sorting by this column.
    #[must_use]
    pub fn not_sortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    /// Excludes this column from exports.
    #[must_use]
    pub fn not_exportable(mut self) -> Self {
        self.exportable = false;
        self
    }

    /// Sets the default filter function.
    #[must_use]
    pub fn with_filter_fn(mut self, filter_fn: FilterFn) -> Self {
        self.filter_fn = filter_fn;
        self
    }
}
