//! Drives one generated-source table from the command line and prints the
//! resulting page.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use smarttable_core::{
    ColumnFilter, ExportOptions, Orientation, SortingRule, TableDocument, ViewStatePatch,
};
use smarttable_engine::storage::FileStateStorage;
use smarttable_engine::{
    metrics, BackendSyncConfig, GeneratedSource, PersistenceConfig, TableConfig, TableController,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "smarttable-demo", version, about = "Page through a generated people table")]
struct Args {
    /// Rows the generated source holds.
    #[arg(long, env = "SMARTTABLE_ROWS", default_value_t = 10_000)]
    rows: u64,

    /// Rows per page.
    #[arg(long, default_value_t = 10)]
    page_size: usize,

    /// Zero-based page index.
    #[arg(long, default_value_t = 0)]
    page: usize,

    /// Sort keys in priority order, e.g. `age:desc,lastName`.
    #[arg(long)]
    sort: Option<String>,

    /// Column filter `column=value`; repeatable.
    #[arg(long = "filter", value_name = "COLUMN=VALUE")]
    filters: Vec<String>,

    /// Global filter across all filterable columns.
    #[arg(long)]
    global: Option<String>,

    /// Take page counts from the source instead of `ceil(rows / page size)`.
    #[arg(long)]
    server_pagination: bool,

    /// Simulated source latency in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Persist view state as JSON files in this directory.
    #[arg(long, env = "SMARTTABLE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Storage key for persisted view state.
    #[arg(long, default_value = smarttable_engine::config::DEFAULT_STORAGE_KEY)]
    state_key: String,

    /// POST view state to this endpoint.
    #[arg(long, env = "SMARTTABLE_SYNC_ENDPOINT")]
    sync_endpoint: Option<String>,

    /// Bearer token for the sync endpoint.
    #[arg(long, env = "SMARTTABLE_SYNC_TOKEN", hide_env_values = true)]
    sync_token: Option<String>,

    /// Log every view-state transition at debug level.
    #[arg(long)]
    debug_transitions: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Page output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn parse_sort(spec: &str) -> anyhow::Result<Vec<SortingRule>> {
    spec.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| match key.split_once(':') {
            None => Ok(SortingRule::asc(key)),
            Some((id, "asc")) => Ok(SortingRule::asc(id)),
            Some((id, "desc")) => Ok(SortingRule::desc(id)),
            Some((_, dir)) => bail!("unknown sort direction {dir:?} in {key:?}"),
        })
        .collect()
}

fn parse_filters(filters: &[String]) -> anyhow::Result<Vec<ColumnFilter>> {
    filters
        .iter()
        .map(|f| {
            let (id, value) = f
                .split_once('=')
                .with_context(|| format!("filter {f:?} is not COLUMN=VALUE"))?;
            Ok(ColumnFilter::new(id.trim(), value.trim()))
        })
        .collect()
}

fn print_table(document: &TableDocument, page: usize, page_count: usize) {
    let mut widths: Vec<usize> = document.columns.iter().map(String::len).collect();
    for row in &document.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };

    if let Some(title) = &document.title {
        println!("{title}");
    }
    println!("{}", line(&document.columns));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    for row in &document.rows {
        println!("{}", line(row));
    }
    println!("page {} of {page_count}", page + 1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);
    metrics::describe();

    let mut source = GeneratedSource::new();
    if args.latency_ms > 0 {
        source = source.with_latency(Duration::from_millis(args.latency_ms));
    }

    let config = TableConfig {
        initial_page_size: args.page_size,
        row_count: args.rows,
        manual_pagination: args.server_pagination,
        persistence: args.state_dir.as_ref().map(|_| PersistenceConfig {
            storage_key: args.state_key.clone(),
        }),
        backend_sync: args.sync_endpoint.as_ref().map(|endpoint| BackendSyncConfig {
            token: args.sync_token.clone(),
            ..BackendSyncConfig::new(endpoint.clone())
        }),
        export: Some(ExportOptions {
            title: Some("People".to_string()),
            orientation: Orientation::Landscape,
            ..ExportOptions::default()
        }),
        debug_mode: args.debug_transitions,
        ..TableConfig::default()
    };

    let mut builder =
        TableController::builder(GeneratedSource::columns(), Arc::new(source)).config(config);
    if let Some(dir) = &args.state_dir {
        builder = builder.storage(Arc::new(FileStateStorage::new(dir)?));
    }
    let table = builder.build()?;
    table.settled().await;

    let mut patch = ViewStatePatch::new().pagination(args.page, args.page_size);
    if let Some(sort) = &args.sort {
        patch = patch.sorting(parse_sort(sort)?);
    }
    if !args.filters.is_empty() {
        patch = patch.column_filters(parse_filters(&args.filters)?);
    }
    if let Some(global) = &args.global {
        patch = patch.global_filter(global.clone());
    }

    let outcome = table.patch(&patch);
    info!(table_id = %table.id(), fetch = ?outcome.fetch, "view updated");
    let output = table.settled().await;

    if let Some(err) = &output.error {
        tracing::warn!(error = %err, "showing last good page");
    }

    if args.sync_endpoint.is_some() {
        if let Err(err) = table.sync_now().await {
            tracing::warn!(error = %err, "manual sync failed");
        }
    }

    let document = table.export()?;
    match args.output {
        OutputFormat::Table => print_table(
            &document,
            output.view_state.pagination.page_index,
            output.page_count,
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
    }

    table.shutdown().await;
    Ok(())
}
