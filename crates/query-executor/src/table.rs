//! In-memory base collections

use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use query_core::{CollectionIdentity, Result};
use std::borrow::Cow;

/// A named table held as Arrow record batches.
///
/// The table name is its logical identity: two `MemoryTable`s with the same
/// name are the same collection as far as caching is concerned.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MemoryTable {
    /// Create a table, checking every batch against the schema
    pub fn try_new(
        name: impl Into<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(batch) = batches.iter().find(|b| b.schema() != schema) {
            return Err(ArrowError::SchemaError(format!(
                "Batch schema {:?} does not match table '{}'",
                batch.schema(),
                name
            ))
            .into());
        }
        Ok(Self {
            name,
            schema,
            batches,
        })
    }

    /// Create a table from a single batch
    pub fn from_batch(name: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            name: name.into(),
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
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

impl CollectionIdentity for MemoryTable {
    fn collection_id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }
}
