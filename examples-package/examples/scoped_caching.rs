//! Scoped Caching Example
//!
//! Demonstrates ambient, explicit and nested scopes around a memoized
//! record batch pipeline.

use anyhow::Result;
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use query_cache::{active_scope, clear_active_scope, ScopeConfig, ScopeController};
use query_core::QueryParams;
use query_executor::{MemoizedExecutor, MemoryTable};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Scoped Caching Example ===\n");

    let table = users_table()?;
    let executor = MemoizedExecutor::default();
    let controller = ScopeController::new(ScopeConfig::default().with_size_warning_threshold(100));

    // Example 1: Ambient scope bound to an async task
    ambient_scope(&controller, &executor, &table).await?;

    // Example 2: Explicit scopes nested inside a synchronous unit of work
    explicit_scopes(&controller, &executor, &table)?;

    // Example 3: No scope at all
    no_scope(&executor, &table)?;

    let stats = executor.cache_stats();
    println!(
        "\nTotals: {} hits, {} misses, {} bypasses",
        stats.hits(),
        stats.misses(),
        stats.bypasses()
    );
    println!("\n=== All scoped caching examples completed! ===");
    Ok(())
}

fn users_table() -> Result<MemoryTable> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![3, 1, 4, 2])),
            Arc::new(StringArray::from(vec!["Charlie", "Alice", "Dana", "Bob"])),
        ],
    )?;

    Ok(MemoryTable::from_batch("users", batch))
}

/// Example 1: the task's scope lives exactly as long as the task
async fn ambient_scope(
    controller: &ScopeController,
    executor: &MemoizedExecutor,
    table: &MemoryTable,
) -> Result<()> {
    println!("--- Example 1: Ambient Scope ---\n");
    let params = QueryParams::builder().order("name", false).limit(2).build();

    controller
        .ambient(async {
            let first = executor.execute(table, &params)?;
            let second = executor.execute(table, &params)?;
            println!("  First call rows:  {}", first.num_rows());
            println!("  Same handle:      {}", Arc::ptr_eq(&first, &second));
            if let Some(scope) = active_scope() {
                println!("  Scope entries:    {}", scope.size());
            }
            Ok::<_, query_core::QueryError>(())
        })
        .await?;

    println!("  Scope after task: {:?}\n", active_scope().map(|s| s.id()));
    Ok(())
}

/// Example 2: an explicit scope shadows the ambient one until it ends
fn explicit_scopes(
    controller: &ScopeController,
    executor: &MemoizedExecutor,
    table: &MemoryTable,
) -> Result<()> {
    println!("--- Example 2: Explicit Scopes ---\n");
    let params = QueryParams::new().with("$orderby", "id desc");

    controller.run(|| -> Result<()> {
        let outer = executor.execute(table, &params)?;

        let inner = controller.with_explicit_scope(|| executor.execute(table, &params))?;
        println!("  Inner scope recomputed: {}", !Arc::ptr_eq(&outer, &inner));

        let again = executor.execute(table, &params)?;
        println!("  Outer scope restored:   {}", Arc::ptr_eq(&outer, &again));

        clear_active_scope();
        let fresh = executor.execute(table, &params)?;
        println!("  Recomputed after clear: {}\n", !Arc::ptr_eq(&outer, &fresh));
        Ok(())
    })
}

/// Example 3: without a scope every call computes directly
fn no_scope(executor: &MemoizedExecutor, table: &MemoryTable) -> Result<()> {
    println!("--- Example 3: No Scope ---\n");
    let params = QueryParams::new().with("$top", 1);

    let a = executor.execute(table, &params)?;
    let b = executor.execute(table, &params)?;
    println!("  Rows: {}, shared handle: {}", a.num_rows(), Arc::ptr_eq(&a, &b));
    Ok(())
}
