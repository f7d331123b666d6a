//! Record batch transformation pipeline
//!
//! Applies `$filter`, `$orderby`, `$skip` and `$top` (in that order) to a
//! [`MemoryTable`]. Bare option names (`filter`, `orderby`, ...) are accepted too.

use crate::filter::{apply_filter, FilterTranslator, UnsupportedFilter};
use crate::ordering::{parse_order_by, slice_batches, sort_batches};
use crate::table::MemoryTable;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use query_cache::TransformPipeline;
use query_core::{ParamValue, QueryError, QueryParams, Result};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The result of transforming a table
#[derive(Debug, Clone)]
pub struct TransformedCollection {
    source: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl TransformedCollection {
    /// Name of the table this was derived from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl PartialEq for TransformedCollection {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.schema == other.schema && self.batches == other.batches
    }
}

/// Transforms [`MemoryTable`]s according to query options
#[derive(Clone)]
pub struct RecordBatchPipeline {
    filter: Arc<dyn FilterTranslator>,
}

impl RecordBatchPipeline {
    /// A pipeline that rejects `$filter`
    pub fn new() -> Self {
        Self::with_filter(Arc::new(UnsupportedFilter))
    }

    /// A pipeline that evaluates `$filter` with the given translator
    pub fn with_filter(filter: Arc<dyn FilterTranslator>) -> Self {
        Self { filter }
    }

    fn text_option<'a>(params: &'a QueryParams, option: &str) -> Result<Option<Cow<'a, str>>> {
        match params.get_option(option) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(value) => value.as_text().map(Some).ok_or_else(|| {
                QueryError::invalid_parameter(format!("${}", option), "expected a scalar value")
            }),
        }
    }

    /// Row counts follow the lenient rules of the query string. Anything
    /// that converts to an integer counts: floats are truncated and booleans
    /// are 0 or 1. Counts that are not positive are ignored; values that do
    /// not convert are ignored with a warning.
    fn count_option(params: &QueryParams, option: &str) -> Option<usize> {
        let value = params.get_option(option)?;
        let parsed = match value {
            ParamValue::Int(n) => Some(*n),
            ParamValue::UInt(n) => Some(i64::try_from(*n).unwrap_or(i64::MAX)),
            ParamValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            ParamValue::Bool(b) => Some(i64::from(*b)),
            ParamValue::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n > 0 => Some(usize::try_from(n).unwrap_or(usize::MAX)),
            Some(_) => None,
            None => {
                warn!("Invalid ${} value: {:?}", option, value);
                None
            }
        }
    }
}

impl Default for RecordBatchPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordBatchPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordBatchPipeline").finish_non_exhaustive()
    }
}

impl TransformPipeline<MemoryTable> for RecordBatchPipeline {
    type Output = TransformedCollection;
    type Error = QueryError;

    fn apply(&self, table: &MemoryTable, params: &QueryParams) -> Result<TransformedCollection> {
        let mut batches = table.batches().to_vec();

        if let Some(expression) = Self::text_option(params, "filter")? {
            batches = apply_filter(batches, &expression, self.filter.as_ref())?;
        }

        if let Some(spec) = Self::text_option(params, "orderby")? {
            let fields = parse_order_by(&spec)?;
            batches = sort_batches(table.schema(), &batches, &fields)?;
        }

        let skip = Self::count_option(params, "skip");
        let top = Self::count_option(params, "top");
        if skip.is_some() || top.is_some() {
            batches = slice_batches(batches, skip.unwrap_or(0), top);
        }

        let result = TransformedCollection {
            source: table.name().to_string(),
            schema: Arc::clone(table.schema()),
            batches,
        };
        debug!(
            table = table.name(),
            input_rows = table.num_rows(),
            output_rows = result.num_rows(),
            "Transformed collection"
        );
        Ok(result)
    }
}
