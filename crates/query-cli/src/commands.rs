use crate::config::Config;
use anyhow::{anyhow, Result};
use arrow::array::{Array, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use colored::Colorize;
use query_cache::{CacheKey, CacheStats, ScopeController};
use query_core::{QueryError, QueryParams};
use query_executor::{FilterTranslator, MemoizedExecutor, MemoryTable};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Evaluates `<column> eq '<text>'` and `<column> eq <integer>`
pub struct EqualityFilter;

impl FilterTranslator for EqualityFilter {
    fn evaluate(&self, expression: &str, batch: &RecordBatch) -> query_core::Result<BooleanArray> {
        let expr = expression
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')');
        let (column, literal) = expr.split_once(" eq ").ok_or_else(|| {
            QueryError::Transformation(format!(
                "Only '<column> eq <value>' filters are supported, got '{}'",
                expression
            ))
        })?;

        let column = column.trim();
        let idx = batch
            .schema()
            .index_of(column)
            .map_err(|_| QueryError::ColumnNotFound(column.to_string()))?;
        let array = batch.column(idx);
        let literal = literal.trim();

        if let Some(text) = literal
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
        {
            let values = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| not_typed(column, "a string"))?;
            Ok(values.iter().map(|v| v.map(|v| v == text)).collect())
        } else {
            let wanted: i64 = literal.parse().map_err(|_| {
                QueryError::invalid_parameter(
                    "$filter",
                    format!("unsupported literal '{}'", literal),
                )
            })?;
            let values = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| not_typed(column, "an integer"))?;
            Ok(values.iter().map(|v| v.map(|v| v == wanted)).collect())
        }
    }
}

fn not_typed(column: &str, kind: &str) -> QueryError {
    QueryError::Transformation(format!("Column '{}' is not {} column", column, kind))
}

/// Sample `Orders` table used by the scenario
pub fn orders_table() -> Result<MemoryTable> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("total", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5, 6, 7, 8])),
            Arc::new(StringArray::from(vec![
                "open", "shipped", "open", "cancelled", "open", "shipped", "open", "open",
            ])),
            Arc::new(Float64Array::from(vec![
                120.0, 35.5, 80.25, 12.0, 410.0, 99.99, 5.0, 64.5,
            ])),
        ],
    )?;

    Ok(MemoryTable::try_new("Orders", schema, vec![batch])?)
}

fn pipeline_runs(stats: &CacheStats) -> u64 {
    stats.misses() + stats.bypasses() + stats.key_failures()
}

/// Walk through the memoization guarantees against the `Orders` table
pub async fn run_scenario(config: &Config, requests: usize, repeat: usize) -> Result<()> {
    let executor = Arc::new(MemoizedExecutor::with_filter(Arc::new(EqualityFilter)));
    let controller = ScopeController::new(config.cache.to_scope_config());
    let table = Arc::new(orders_table()?);
    let params = QueryParams::new().with("filter", "status eq 'open'");

    info!(
        enabled = config.cache.enabled,
        threshold = ?config.cache.size_warning_threshold,
        "Running scenario"
    );

    // One scope, two identical calls
    println!("{}", "--- Same scope, same parameters ---".bright_cyan());
    let (first, second) = controller
        .ambient(async {
            let first = executor.execute(&table, &params)?;
            let second = executor.execute(&table, &params)?;
            Ok::<_, QueryError>((first, second))
        })
        .await?;
    println!("  Rows returned:      {}", first.num_rows());
    println!("  Pipeline runs:      {}", pipeline_runs(&executor.cache_stats()));
    println!(
        "  Same handle:        {}",
        yes_no(Arc::ptr_eq(&first, &second))
    );

    // Two scopes, identical parameters
    println!("\n{}", "--- Separate scopes, same parameters ---".bright_cyan());
    let before = pipeline_runs(&executor.cache_stats());
    let in_a = controller
        .ambient(async { executor.execute(&table, &params) })
        .await?;
    let in_b = controller
        .ambient(async { executor.execute(&table, &params) })
        .await?;
    println!(
        "  Pipeline runs:      {}",
        pipeline_runs(&executor.cache_stats()) - before
    );
    println!("  Same handle:        {}", yes_no(Arc::ptr_eq(&in_a, &in_b)));
    println!("  Equal contents:     {}", yes_no(*in_a == *in_b));

    // No scope at all
    println!("\n{}", "--- No scope ---".bright_cyan());
    let direct = executor.execute(&table, &params)?;
    println!("  Rows returned:      {}", direct.num_rows());
    println!("  Bypasses so far:    {}", executor.cache_stats().bypasses());

    // Concurrent requests, each in its own scope
    println!(
        "\n{}",
        format!("--- {} concurrent requests x {} calls ---", requests, repeat).bright_cyan()
    );
    executor.cache_stats().reset();
    let start = Instant::now();

    let handles: Vec<_> = (0..requests)
        .map(|request| {
            let executor = Arc::clone(&executor);
            let controller = controller.clone();
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                controller
                    .ambient(async move {
                        let orderings = ["id desc", "total", "status, id"];
                        let params = QueryParams::builder()
                            .filter("status eq 'open'")
                            .order(orderings[request % orderings.len()], false)
                            .limit(3)
                            .build();
                        let mut rows = 0;
                        for _ in 0..repeat {
                            rows = executor.execute(&table, &params)?.num_rows();
                            tokio::task::yield_now().await;
                        }
                        Ok::<_, QueryError>(rows)
                    })
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.map_err(|e| anyhow!("request task failed: {}", e))??;
    }
    let elapsed = start.elapsed();

    println!("  Pipeline runs:      {}", pipeline_runs(&executor.cache_stats()));
    println!("  Elapsed:            {:.2?}", elapsed);

    if config.show_stats {
        print_stats(&executor.cache_stats());
    }

    Ok(())
}

/// Print the cache key for a collection and parameters
pub fn derive_key(collection: &str, pairs: &[String], json: Option<&str>) -> Result<()> {
    let mut params = match json {
        Some(json) => QueryParams::from_json(serde_json::from_str(json)?)?,
        None => QueryParams::new(),
    };

    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected name=value, got '{}'", pair))?;
        params.insert(name.trim(), value);
    }

    let key = CacheKey::derive(collection, &params)?;
    println!("{}", key);
    Ok(())
}

/// Write a configuration file populated with defaults
pub fn init_config(path: &std::path::Path) -> Result<()> {
    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn print_stats(stats: &CacheStats) {
    println!("\n{}", "Cache statistics".bright_yellow());
    println!("  Hits:               {}", stats.hits());
    println!("  Misses:             {}", stats.misses());
    println!("  Bypasses:           {}", stats.bypasses());
    println!("  Key failures:       {}", stats.key_failures());
    println!("  Hit rate:           {:.1}%", stats.hit_rate() * 100.0);
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".red()
    }
}
