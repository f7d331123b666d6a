//! Memoized Query Executor
//!
//! Wraps the record batch pipeline with scope-bound memoization.

use crate::filter::FilterTranslator;
use crate::pipeline::{RecordBatchPipeline, TransformedCollection};
use crate::table::MemoryTable;
use query_cache::{CacheStats, QueryMemoizer};
use query_core::{QueryParams, Result};
use std::sync::Arc;

/// A record batch pipeline whose results are reused within a scope
#[derive(Debug)]
pub struct MemoizedExecutor {
    memoizer: QueryMemoizer<RecordBatchPipeline>,
}

impl MemoizedExecutor {
    pub fn new(pipeline: RecordBatchPipeline) -> Self {
        Self {
            memoizer: QueryMemoizer::new(pipeline),
        }
    }

    /// Create an executor that evaluates filters with `filter`
    pub fn with_filter(filter: Arc<dyn FilterTranslator>) -> Self {
        Self::new(RecordBatchPipeline::with_filter(filter))
    }

    /// Execute a transformation, reusing the active scope's result if present
    ///
    /// # Returns
    /// The transformed collection, either from the active scope or freshly computed
    pub fn execute(
        &self,
        table: &MemoryTable,
        params: &QueryParams,
    ) -> Result<Arc<TransformedCollection>> {
        self.memoizer.apply(table, params)
    }

    /// Execute without caching (bypass the scope)
    pub fn execute_uncached(
        &self,
        table: &MemoryTable,
        params: &QueryParams,
    ) -> Result<Arc<TransformedCollection>> {
        self.memoizer.apply_uncached(table, params)
    }

    pub fn cache_stats(&self) -> Arc<CacheStats> {
        self.memoizer.stats()
    }

    pub fn pipeline(&self) -> &RecordBatchPipeline {
        self.memoizer.pipeline()
    }
}

impl Default for MemoizedExecutor {
    fn default() -> Self {
        Self::new(RecordBatchPipeline::default())
    }
}
