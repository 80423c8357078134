//! Local evaluation of fetch requests over an in-memory row set.
//!
//! Used by sources that hold (or generate) all rows themselves. Filtering
//! follows [`FilterSet::matches`]; sorting is a stable multi-key sort applied
//! in priority order.

use std::cmp::Ordering;

use crate::request::{page_count_for, FetchRequest, FilterSet};
use crate::types::{Row, Value};
use crate::view_state::SortingRule;

/// One page of a locally evaluated request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    /// Rows inside the requested window.
    pub rows: Vec<Row>,
    /// Number of rows that passed the filters.
    pub total_rows: u64,
    /// Pages needed for `total_rows` at the request's page size.
    pub page_count: usize,
}

/// Compares two rows by the given sort keys, first key first.
#[must_use]
pub fn compare_rows(a: &Row, b: &Row, sorting: &[SortingRule]) -> Ordering {
    for rule in sorting {
        let left = a.get(&rule.id).unwrap_or(&Value::Null);
        let right = b.get(&rule.id).unwrap_or(&Value::Null);
        let ord = left.sort_cmp(right);
        let ord = if rule.desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Sorts rows in place. Ties keep their original relative order.
pub fn sort_rows(rows: &mut [Row], sorting: &[SortingRule]) {
    if sorting.is_empty() {
        return;
    }
    rows.sort_by(|a, b| compare_rows(a, b, sorting));
}

/// Filters, sorts, and slices `rows` according to `request`.
#[must_use]
pub fn execute(rows: &[Row], request: &FetchRequest) -> QueryPage {
    let mut matched: Vec<Row> = filter_rows(rows, &request.filters);
    sort_rows(&mut matched, &request.sorting);

    let total_rows = matched.len() as u64;
    let page_count = page_count_for(total_rows, request.page_size);
    let rows = matched
        .into_iter()
        .skip(request.offset())
        .take(request.page_size)
        .collect();

    QueryPage {
        rows,
        total_rows,
        page_count,
    }
}

fn filter_rows(rows: &[Row], filters: &FilterSet) -> Vec<Row> {
    if filters.is_empty() {
        return rows.to_vec();
    }
    rows.iter().filter(|r| filters.matches(r)).cloned().collect()
}
