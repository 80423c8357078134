//! Deterministic synthetic person rows.
//!
//! Generates `row_count_hint` rows from a fixed seed the first time a given
//! row count is requested, then serves every later request from that cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smarttable_core::query;
use smarttable_core::{ColumnDef, FetchRequest, FetchResult, FetchSource, Row, Value};

const FIRST_NAMES: &[&str] = &[
    "John", "Jane", "Alice", "Bob", "Carol", "David", "Eve", "Frank", "Grace", "Heidi", "Ivan",
    "Judy", "Mallory", "Niaj", "Olivia", "Peggy", "Rupert", "Sybil", "Trent", "Walter",
];

const LAST_NAMES: &[&str] = &[
    "Doe", "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
    "Rodriguez", "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson",
];

const CITIES: &[(&str, &str)] = &[
    ("Seattle", "WA"),
    ("Portland", "OR"),
    ("Austin", "TX"),
    ("Denver", "CO"),
    ("Boston", "MA"),
    ("Chicago", "IL"),
    ("Atlanta", "GA"),
    ("Phoenix", "AZ"),
];

const DEPARTMENTS: &[&str] = &["Eng", "Sales", "Marketing", "Ops", "Finance", "Support"];

const DEFAULT_SEED: u64 = 42;

/// Fetch source that stands in for a remote backend with generated rows.
#[derive(Debug)]
pub struct GeneratedSource {
    seed: u64,
    latency: Option<Duration>,
    cache: Mutex<Option<(u64, Arc<Vec<Row>>)>>,
}

impl GeneratedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            latency: None,
            cache: Mutex::new(None),
        }
    }

    /// Delays every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Columns matching the generated row shape.
    #[must_use]
    pub fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", "ID").not_filterable(),
            ColumnDef::new("firstName", "First Name"),
            ColumnDef::new("lastName", "Last Name"),
            ColumnDef::new("age", "Age"),
            ColumnDef::new("email", "Email"),
            ColumnDef::new("city", "City"),
            ColumnDef::new("state", "State"),
            ColumnDef::new("department", "Department"),
            ColumnDef::new("salary", "Salary").not_filterable(),
        ]
    }

    /// All rows for `count`, generating them on first use.
    pub fn rows(&self, count: u64) -> Arc<Vec<Row>> {
        let mut cache = self.cache.lock();
        if let Some((cached_count, rows)) = cache.as_ref() {
            if *cached_count == count {
                return Arc::clone(rows);
            }
        }
        let rows = Arc::new(generate(self.seed, count));
        *cache = Some((count, Arc::clone(&rows)));
        rows
    }
}

impl Default for GeneratedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchSource for GeneratedSource {
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchResult> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let rows = self.rows(request.row_count_hint);
        let page = query::execute(&rows, request);
        Ok(FetchResult {
            rows: page.rows,
            page_count: page.page_count,
            total_rows: Some(page.total_rows),
        })
    }
}

fn generate(seed: u64, count: u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|id| person(&mut rng, id)).collect()
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn person(rng: &mut StdRng, id: u64) -> Row {
    let first = *pick(rng, FIRST_NAMES);
    let last = *pick(rng, LAST_NAMES);
    let (city, state) = *pick(rng, CITIES);
    let department = *pick(rng, DEPARTMENTS);
    let age: i64 = rng.random_range(18..=70);
    let salary: i64 = rng.random_range(40..=250) * 1_000;
    let email = format!(
        "{}.{}{}@example.com",
        first.to_lowercase(),
        last.to_lowercase(),
        id
    );

    let mut row = Row::new();
    row.insert("id".to_string(), Value::Int(i64::try_from(id).unwrap_or(i64::MAX)));
    row.insert("firstName".to_string(), Value::from(first));
    row.insert("lastName".to_string(), Value::from(last));
    row.insert("age".to_string(), Value::Int(age));
    row.insert("email".to_string(), Value::String(email));
    row.insert("city".to_string(), Value::from(city));
    row.insert("state".to_string(), Value::from(state));
    row.insert("department".to_string(), Value::from(department));
    row.insert("salary".to_string(), Value::Int(salary));
    row
}

#[cfg(test)]
mod tests {
    use smarttable_core::{RowCountConfig, SortingRule, ViewState, ViewStatePatch};

    use super::*;

    fn request(count: u64, patch: &ViewStatePatch) -> FetchRequest {
        FetchRequest::derive(
            &ViewState::default().merged(patch),
            &GeneratedSource::columns(),
            RowCountConfig {
                row_count_hint: count,
                manual_pagination: false,
            },
            None,
        )
    }

    #[test]
    fn same_seed_same_rows() {
        let a = GeneratedSource::with_seed(7).rows(50);
        let b = GeneratedSource::with_seed(7).rows(50);
        assert_eq!(a, b);
        assert_ne!(a, GeneratedSource::with_seed(8).rows(50));
    }

    #[test]
    fn rows_are_cached_per_count() {
        let source = GeneratedSource::new();
        let first = source.rows(20);
        assert!(Arc::ptr_eq(&first, &source.rows(20)));
        assert_eq!(source.rows(30).len(), 30);
    }

    #[tokio::test]
    async fn first_page_is_rows_zero_to_ten() {
        let source = GeneratedSource::new();
        let result = source
            .fetch(&request(10_000, &ViewStatePatch::new()))
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 10);
        assert_eq!(result.page_count, 1000);
        let ids: Vec<Value> = result.rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, (0..10).map(Value::Int).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sorts_by_age_descending() {
        let source = GeneratedSource::new();
        let result = source
            .fetch(&request(
                200,
                &ViewStatePatch::new().sorting(vec![SortingRule::desc("age")]),
            ))
            .await
            .unwrap();

        let ages: Vec<i64> = result
            .rows
            .iter()
            .map(|r| match r["age"] {
                Value::Int(age) => age,
                _ => panic!("age is an integer"),
            })
            .collect();
        assert!(ages.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_the_response() {
        let source = GeneratedSource::new().with_latency(Duration::from_millis(500));
        let started = tokio::time::Instant::now();
        source
            .fetch(&request(10, &ViewStatePatch::new()))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
