//! Filter seam
//!
//! Translating a filter expression into a predicate belongs to the host.
//! The pipeline only asks a [`FilterTranslator`] for a boolean mask per
//! batch and applies it.

use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use query_core::{QueryError, Result};

/// Evaluates a filter expression against one batch
pub trait FilterTranslator: Send + Sync {
    /// Return a mask with one entry per row; `true` keeps the row
    fn evaluate(&self, expression: &str, batch: &RecordBatch) -> Result<BooleanArray>;
}

/// Rejects every filter expression
#[derive(Debug, Default, Clone)]
pub struct UnsupportedFilter;

impl FilterTranslator for UnsupportedFilter {
    fn evaluate(&self, expression: &str, _batch: &RecordBatch) -> Result<BooleanArray> {
        Err(QueryError::Transformation(format!(
            "No filter translator configured for '{}'",
            expression
        )))
    }
}

/// Keep the rows each batch's mask selects, dropping emptied batches
pub fn apply_filter(
    batches: Vec<RecordBatch>,
    expression: &str,
    translator: &dyn FilterTranslator,
) -> Result<Vec<RecordBatch>> {
    let mut result_batches = Vec::new();

    for batch in batches {
        let mask = translator.evaluate(expression, &batch)?;
        if mask.len() != batch.num_rows() {
            return Err(QueryError::Transformation(format!(
                "Filter mask has {} entries for a batch of {} rows",
                mask.len(),
                batch.num_rows()
            )));
        }

        let filtered_batch = filter_record_batch(&batch, &mask)?;

        if filtered_batch.num_rows() > 0 {
            result_batches.push(filtered_batch);
        }
    }

    Ok(result_batches)
}
