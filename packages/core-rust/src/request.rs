//! Fetch requests derived from view state.
//!
//! A [`FetchRequest`] is the fetch-relevant projection of a [`ViewState`]:
//! pagination, sorting, effective filters, and row-count configuration. Every
//! other view-state field (column order, selection, sizing, ...) is dropped
//! here, so changing those fields can never change a request fingerprint.

use serde::{Deserialize, Serialize};

use crate::column::{ColumnDef, FilterFn};
use crate::hash::Fingerprint;
use crate::types::Row;
use crate::view_state::{SortingRule, ViewState};

// ---------------------------------------------------------------------------
// Row-count configuration
// ---------------------------------------------------------------------------

/// How the page count of a table is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCountConfig {
    /// Total row count the source is expected to hold (or generate).
    pub row_count_hint: u64,
    /// When true the source reports exact page counts (server-driven
    /// pagination). When false the page count is `ceil(row_count_hint / page_size)`.
    pub manual_pagination: bool,
}

impl Default for RowCountConfig {
    fn default() -> Self {
        Self {
            row_count_hint: 10_000,
            manual_pagination: true,
        }
    }
}

/// Number of pages needed to show `total_rows` rows at `page_size` rows per page.
#[must_use]
pub fn page_count_for(total_rows: u64, page_size: usize) -> usize {
    let size = u64::try_from(page_size.max(1)).unwrap_or(u64::MAX);
    usize::try_from(total_rows.div_ceil(size)).unwrap_or(usize::MAX)
}

/// Clamps a page index into `[0, page_count - 1]`. With zero pages, index 0.
#[must_use]
pub fn clamp_page_index(page_index: usize, page_count: usize) -> usize {
    if page_count == 0 {
        0
    } else {
        page_index.min(page_count - 1)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// One `column matches value` test.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterClause {
    /// Column id.
    pub id: String,
    /// Filter needle.
    pub value: String,
    /// Matching function.
    pub filter_fn: FilterFn,
}

impl FilterClause {
    /// Tests this clause against a row. A missing cell never matches a
    /// non-empty needle.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.id) {
            Some(cell) => self.filter_fn.matches(cell, &self.value),
            None => self.value.is_empty(),
        }
    }
}

/// Effective filters of a request.
///
/// A row matches when it satisfies every clause in `all` (the column filters)
/// and, if `any` is non-empty, at least one clause in `any` (the global filter
/// fanned out across filterable columns).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    /// Conjunctive column filters, sorted by column id.
    pub all: Vec<FilterClause>,
    /// Disjunctive global-filter clauses, sorted by column id.
    pub any: Vec<FilterClause>,
}

impl FilterSet {
    /// Builds the effective filter set for a view over the given columns.
    #[must_use]
    pub fn derive(view: &ViewState, columns: &[ColumnDef]) -> Self {
        let mut all: Vec<FilterClause> = view
            .column_filters
            .iter()
            .filter(|f| !f.value.is_empty())
            .map(|f| {
                let column_default = columns
                    .iter()
                    .find(|c| c.id == f.id)
                    .map_or(FilterFn::Contains, |c| c.filter_fn);
                FilterClause {
                    id: f.id.clone(),
                    value: f.value.clone(),
                    filter_fn: view.filter_fn_for(&f.id, column_default),
                }
            })
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));

        let mut any: Vec<FilterClause> = if view.global_filter.is_empty() {
            Vec::new()
        } else {
            columns
                .iter()
                .filter(|c| c.filterable)
                .map(|c| FilterClause {
                    id: c.id.clone(),
                    value: view.global_filter.clone(),
                    filter_fn: view.global_filter_fn,
                })
                .collect()
        };
        any.sort_by(|a, b| a.id.cmp(&b.id));

        Self { all, any }
    }

    /// Whether no filter is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }

    /// Evaluates the filter set against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.all.iter().all(|c| c.matches(row))
            && (self.any.is_empty() || self.any.iter().any(|c| c.matches(row)))
    }
}

// ---------------------------------------------------------------------------
// FetchRequest
// ---------------------------------------------------------------------------

/// Parameters handed to a fetch source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub page_index: usize,
    pub page_size: usize,
    /// Sort keys in priority order.
    pub sorting: Vec<SortingRule>,
    pub filters: FilterSet,
    pub row_count_hint: u64,
    pub manual_pagination: bool,
}

impl FetchRequest {
    /// Derives the request for a view.
    ///
    /// When `known_page_count` is available the page index is clamped to the
    /// last valid page; otherwise the view's page index is used as-is.
    #[must_use]
    pub fn derive(
        view: &ViewState,
        columns: &[ColumnDef],
        rows: RowCountConfig,
        known_page_count: Option<usize>,
    ) -> Self {
        let page_size = view.pagination.page_size.max(1);
        let page_index = match known_page_count {
            Some(count) => clamp_page_index(view.pagination.page_index, count),
            None => view.pagination.page_index,
        };
        Self {
            page_index,
            page_size,
            sorting: sortable_rules(view, columns),
            filters: FilterSet::derive(view, columns),
            row_count_hint: rows.row_count_hint,
            manual_pagination: rows.manual_pagination,
        }
    }

    /// Canonical fingerprint of this request.
    ///
    /// # Errors
    ///
    /// Propagates the serializer error; with the types used here it does not
    /// occur in practice.
    pub fn fingerprint(&self) -> Result<Fingerprint, serde_json::Error> {
        Fingerprint::of(self)
    }

    /// Offset of the first row in the requested window.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }
}

/// Sort rules of `view`, minus those on columns marked not sortable.
fn sortable_rules(view: &ViewState, columns: &[ColumnDef]) -> Vec<SortingRule> {
    view.sorting
        .iter()
        .filter(|rule| !columns.iter().any(|c| c.id == rule.id && !c.sortable))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
