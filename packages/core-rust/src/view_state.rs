//! The view-state snapshot and the patch type used to change it.
//!
//! [`ViewState`] holds everything the display surface needs to reproduce a
//! table view. Transient interaction flags live in [`InteractionState`] and are
//! `#[serde(skip)]`, so they can never reach storage or the sync wire: any
//! serialized snapshot is already stripped, and deserializing one yields the
//! default interaction state.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so that persisted and
//! synced snapshots keep the key names the browser table used
//! (`pageIndex`, `columnFilters`, `globalFilter`, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::column::FilterFn;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

// ---------------------------------------------------------------------------
// Component state
// ---------------------------------------------------------------------------

/// Requested page window: rows `[page_index * page_size, (page_index + 1) * page_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page_index: usize,
    pub page_size: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One sort key. Position in `ViewState::sorting` is its priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortingRule {
    /// Column id.
    pub id: String,
    /// Descending when true.
    pub desc: bool,
}

impl SortingRule {
    #[must_use]
    pub fn asc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: false,
        }
    }

    #[must_use]
    pub fn desc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: true,
        }
    }
}

/// An active per-column filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnFilter {
    /// Column id. Unique within `ViewState::column_filters`.
    pub id: String,
    /// Filter needle.
    pub value: String,
}

impl ColumnFilter {
    #[must_use]
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Columns pinned to the left or right edge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnPinning {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

/// Rows pinned to the top or bottom.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowPinning {
    pub top: Vec<String>,
    pub bottom: Vec<String>,
}

/// Row density preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    #[default]
    Comfortable,
    Compact,
    Spacious,
}

/// In-progress column resize, only meaningful while the user drags a handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSizingInfo {
    pub column_sizing_start: Vec<(String, f64)>,
    pub delta_offset: f64,
    pub delta_percentage: f64,
    pub is_resizing_column: Option<String>,
    pub start_offset: f64,
    pub start_size: f64,
}

/// UI-only interaction flags. Never persisted, never synced.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct InteractionState {
    pub dragging_column: Option<String>,
    pub dragging_row: Option<String>,
    pub hovered_column: Option<String>,
    pub hovered_row: Option<String>,
    pub editing_cell: Option<String>,
    pub editing_row: Option<String>,
    pub creating_row: Option<String>,
    pub action_cell: Option<String>,
    pub column_sizing_info: ColumnSizingInfo,
    pub is_full_screen: bool,
    pub is_loading: bool,
    pub is_saving: bool,
    pub show_alert_banner: bool,
    pub show_loading_overlay: bool,
    pub show_progress_bars: bool,
    pub show_skeletons: bool,
    pub show_toolbar_drop_zone: bool,
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// Full view-state snapshot for one table instance.
///
/// Snapshots are treated as immutable values: [`ViewState::merged`] produces a
/// new snapshot and never touches `self`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    pub pagination: PaginationState,
    pub sorting: Vec<SortingRule>,
    pub column_filters: Vec<ColumnFilter>,
    /// Empty means inactive.
    pub global_filter: String,
    pub global_filter_fn: FilterFn,
    pub column_filter_fns: BTreeMap<String, FilterFn>,
    pub grouping: Vec<String>,
    pub column_visibility: BTreeMap<String, bool>,
    pub column_order: Vec<String>,
    pub column_sizing: BTreeMap<String, f64>,
    pub row_selection: BTreeMap<String, bool>,
    pub column_pinning: ColumnPinning,
    pub row_pinning: RowPinning,
    pub expanded: BTreeMap<String, bool>,
    pub density: Density,
    pub show_column_filters: bool,
    pub show_global_filter: bool,
    #[serde(skip)]
    pub interaction: InteractionState,
}

impl ViewState {
    /// Default snapshot with the given page size.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            pagination: PaginationState {
                page_index: 0,
                page_size,
            },
            ..Self::default()
        }
    }

    /// Shallow-merges `patch` into a copy of this snapshot.
    ///
    /// Every field present in the patch replaces the corresponding field
    /// wholesale. The result is normalized (see [`ViewState::normalized`]).
    #[must_use]
    pub fn merged(&self, patch: &ViewStatePatch) -> ViewState {
        let mut next = self.clone();
        if let Some(v) = patch.pagination {
            next.pagination = v;
        }
        if let Some(v) = &patch.sorting {
            next.sorting.clone_from(v);
        }
        if let Some(v) = &patch.column_filters {
            next.column_filters.clone_from(v);
        }
        if let Some(v) = &patch.global_filter {
            next.global_filter.clone_from(v);
        }
        if let Some(v) = patch.global_filter_fn {
            next.global_filter_fn = v;
        }
        if let Some(v) = &patch.column_filter_fns {
            next.column_filter_fns.clone_from(v);
        }
        if let Some(v) = &patch.grouping {
            next.grouping.clone_from(v);
        }
        if let Some(v) = &patch.column_visibility {
            next.column_visibility.clone_from(v);
        }
        if let Some(v) = &patch.column_order {
            next.column_order.clone_from(v);
        }
        if let Some(v) = &patch.column_sizing {
            next.column_sizing.clone_from(v);
        }
        if let Some(v) = &patch.row_selection {
            next.row_selection.clone_from(v);
        }
        if let Some(v) = &patch.column_pinning {
            next.column_pinning.clone_from(v);
        }
        if let Some(v) = &patch.row_pinning {
            next.row_pinning.clone_from(v);
        }
        if let Some(v) = &patch.expanded {
            next.expanded.clone_from(v);
        }
        if let Some(v) = patch.density {
            next.density = v;
        }
        if let Some(v) = patch.show_column_filters {
            next.show_column_filters = v;
        }
        if let Some(v) = patch.show_global_filter {
            next.show_global_filter = v;
        }
        if let Some(v) = &patch.interaction {
            next.interaction.clone_from(v);
        }
        next.normalized()
    }

    /// Enforces snapshot invariants.
    ///
    /// - `page_size` is at least 1
    /// - `column_filters` is unique by column id (the last entry wins, keeping
    ///   the position of the first occurrence)
    #[must_use]
    pub fn normalized(mut self) -> ViewState {
        if self.pagination.page_size == 0 {
            self.pagination.page_size = 1;
        }
        let mut unique: Vec<ColumnFilter> = Vec::with_capacity(self.column_filters.len());
        for filter in self.column_filters.drain(..) {
            match unique.iter_mut().find(|f| f.id == filter.id) {
                Some(existing) => existing.value = filter.value,
                None => unique.push(filter),
            }
        }
        self.column_filters = unique;
        self
    }

    /// Copy of this snapshot with interaction flags reset to defaults.
    ///
    /// This is the only form handed to persistence and sync.
    #[must_use]
    pub fn persisted(&self) -> ViewState {
        ViewState {
            interaction: InteractionState::default(),
            ..self.clone()
        }
    }

    /// Effective filter function for a column: view override, else the
    /// column's own default.
    #[must_use]
    pub fn filter_fn_for(&self, column_id: &str, column_default: FilterFn) -> FilterFn {
        self.column_filter_fns
            .get(column_id)
            .copied()
            .unwrap_or(column_default)
    }

    /// Whether a column is visible. Columns absent from the map are visible.
    #[must_use]
    pub fn is_column_visible(&self, column_id: &str) -> bool {
        self.column_visibility.get(column_id).copied().unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// ViewStatePatch
// ---------------------------------------------------------------------------

/// Partial view state. `None` fields leave the current value untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewStatePatch {
    pub pagination: Option<PaginationState>,
    pub sorting: Option<Vec<SortingRule>>,
    pub column_filters: Option<Vec<ColumnFilter>>,
    pub global_filter: Option<String>,
    pub global_filter_fn: Option<FilterFn>,
    pub column_filter_fns: Option<BTreeMap<String, FilterFn>>,
    pub grouping: Option<Vec<String>>,
    pub column_visibility: Option<BTreeMap<String, bool>>,
    pub column_order: Option<Vec<String>>,
    pub column_sizing: Option<BTreeMap<String, f64>>,
    pub row_selection: Option<BTreeMap<String, bool>>,
    pub column_pinning: Option<ColumnPinning>,
    pub row_pinning: Option<RowPinning>,
    pub expanded: Option<BTreeMap<String, bool>>,
    pub density: Option<Density>,
    pub show_column_filters: Option<bool>,
    pub show_global_filter: Option<bool>,
    pub interaction: Option<InteractionState>,
}

impl ViewStatePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pagination(mut self, page_index: usize, page_size: usize) -> Self {
        self.pagination = Some(PaginationState {
            page_index,
            page_size,
        });
        self
    }

    #[must_use]
    pub fn sorting(mut self, sorting: Vec<SortingRule>) -> Self {
        self.sorting = Some(sorting);
        self
    }

    #[must_use]
    pub fn column_filters(mut self, filters: Vec<ColumnFilter>) -> Self {
        self.column_filters = Some(filters);
        self
    }

    #[must_use]
    pub fn global_filter(mut self, value: impl Into<String>) -> Self {
        self.global_filter = Some(value.into());
        self
    }

    #[must_use]
    pub fn global_filter_fn(mut self, filter_fn: FilterFn) -> Self {
        self.global_filter_fn = Some(filter_fn);
        self
    }

    #[must_use]
    pub fn column_filter_fns(mut self, fns: BTreeMap<String, FilterFn>) -> Self {
        self.column_filter_fns = Some(fns);
        self
    }

    #[must_use]
    pub fn grouping(mut self, grouping: Vec<String>) -> Self {
        self.grouping = Some(grouping);
        self
    }

    #[must_use]
    pub fn column_visibility(mut self, visibility: BTreeMap<String, bool>) -> Self {
        self.column_visibility = Some(visibility);
        self
    }

    #[must_use]
    pub fn column_order(mut self, order: Vec<String>) -> Self {
        self.column_order = Some(order);
        self
    }

    #[must_use]
    pub fn column_sizing(mut self, sizing: BTreeMap<String, f64>) -> Self {
        self.column_sizing = Some(sizing);
        self
    }

    #[must_use]
    pub fn row_selection(mut self, selection: BTreeMap<String, bool>) -> Self {
        self.row_selection = Some(selection);
        self
    }

    #[must_use]
    pub fn column_pinning(mut self, pinning: ColumnPinning) -> Self {
        self.column_pinning = Some(pinning);
        self
    }

    #[must_use]
    pub fn row_pinning(mut self, pinning: RowPinning) -> Self {
        self.row_pinning = Some(pinning);
        self
    }

    #[must_use]
    pub fn expanded(mut self, expanded: BTreeMap<String, bool>) -> Self {
        self.expanded = Some(expanded);
        self
    }

    #[must_use]
    pub fn density(mut self, density: Density) -> Self {
        self.density = Some(density);
        self
    }

    #[must_use]
    pub fn show_column_filters(mut self, show: bool) -> Self {
        self.show_column_filters = Some(show);
        self
    }

    #[must_use]
    pub fn show_global_filter(mut self, show: bool) -> Self {
        self.show_global_filter = Some(show);
        self
    }

    #[must_use]
    pub fn interaction(mut self, interaction: InteractionState) -> Self {
        self.interaction = Some(interaction);
        self
    }

    /// True when the patch carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
