//! Fetch source over rows held in memory.

use std::sync::Arc;

use async_trait::async_trait;
use smarttable_core::query;
use smarttable_core::{FetchRequest, FetchResult, FetchSource, Row};

/// Serves pages from a shared, immutable row set.
///
/// Filtering, sorting, and slicing happen locally on every call, and the
/// reported page count is exact.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    rows: Arc<Vec<Row>>,
}

impl InMemorySource {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(rows),
        }
    }

    /// Shares an existing row set without copying it.
    #[must_use]
    pub fn from_arc(rows: Arc<Vec<Row>>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every row, unfiltered and in insertion order.
    #[must_use]
    pub fn all(&self) -> &[Row] {
        &self.rows
    }
}

#[async_trait]
impl FetchSource for InMemorySource {
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchResult> {
        let page = query::execute(&self.rows, request);
        Ok(FetchResult {
            rows: page.rows,
            page_count: page.page_count,
            total_rows: Some(page.total_rows),
        })
    }
}
