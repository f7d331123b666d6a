//! Ordering and windowing of record batches

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::{
    concat_batches, lexsort_to_indices, take_record_batch, SortColumn, SortOptions,
};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use query_core::{QueryError, Result};
use std::sync::Arc;

/// One clause of an order-by specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    pub column: String,
    pub descending: bool,
}

/// Parse `"created desc, id"` style specifications.
///
/// Each comma-separated clause is a column name optionally followed by
/// `asc` or `desc`.
pub fn parse_order_by(spec: &str) -> Result<Vec<OrderByField>> {
    spec.split(',')
        .map(|clause| {
            let mut tokens = clause.split_whitespace();
            let column = tokens.next().ok_or_else(|| {
                QueryError::Transformation(format!("Empty order-by clause in '{}'", spec))
            })?;
            let descending = match tokens.next() {
                None => false,
                Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
                Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
                Some(other) => {
                    return Err(QueryError::Transformation(format!(
                        "Unknown sort direction '{}' for column '{}'",
                        other, column
                    )))
                }
            };
            if let Some(extra) = tokens.next() {
                return Err(QueryError::Transformation(format!(
                    "Unexpected token '{}' in order-by clause '{}'",
                    extra,
                    clause.trim()
                )));
            }
            Ok(OrderByField {
                column: column.to_string(),
                descending,
            })
        })
        .collect()
}

/// Sort all rows by the given fields. Rows that compare equal keep their
/// original relative order.
pub fn sort_batches(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    fields: &[OrderByField],
) -> Result<Vec<RecordBatch>> {
    let column_indices = fields
        .iter()
        .map(|field| {
            schema
                .index_of(&field.column)
                .map_err(|_| QueryError::ColumnNotFound(field.column.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    if fields.is_empty() || batches.is_empty() {
        return Ok(batches.to_vec());
    }

    let combined = concat_batches(schema, batches)?;

    let mut sort_columns: Vec<SortColumn> = fields
        .iter()
        .zip(&column_indices)
        .map(|(field, &idx)| SortColumn {
            values: Arc::clone(combined.column(idx)),
            options: Some(SortOptions {
                descending: field.descending,
                nulls_first: field.descending,
            }),
        })
        .collect();

    // Original row position as the final tiebreaker
    let positions: ArrayRef = Arc::new(UInt32Array::from_iter_values(
        0..combined.num_rows() as u32,
    ));
    sort_columns.push(SortColumn {
        values: positions,
        options: None,
    });

    let indices = lexsort_to_indices(&sort_columns, None)?;
    Ok(vec![take_record_batch(&combined, &indices)?])
}

/// Keep the rows in the window `[skip, skip + fetch)` of the concatenated
/// batches. Batches entirely outside the window are dropped.
pub fn slice_batches(
    batches: Vec<RecordBatch>,
    skip: usize,
    fetch: Option<usize>,
) -> Vec<RecordBatch> {
    let window_end = fetch.map_or(usize::MAX, |n| skip.saturating_add(n));
    let mut offset = 0;

    batches
        .into_iter()
        .map_while(|batch| {
            let batch_start = offset;
            offset += batch.num_rows();
            (batch_start < window_end).then_some((batch_start, batch))
        })
        .filter_map(|(batch_start, batch)| {
            let from = skip.saturating_sub(batch_start).min(batch.num_rows());
            let to = window_end.saturating_sub(batch_start).min(batch.num_rows());
            (from < to).then(|| batch.slice(from, to - from))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("status", DataType::Utf8, false),
        ]))
    }

    fn batch(ids: Vec<i64>, statuses: Vec<&str>) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(statuses)),
            ],
        )
        .unwrap()
    }

    fn ids(batches: &[RecordBatch]) -> Vec<i64> {
        batches
            .iter()
            .flat_map(|b| {
                let col = b.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
                col.values().to_vec()
            })
            .collect()
    }

    #[test]
    fn test_parse_order_by() {
        let fields = parse_order_by("status desc, id").unwrap();
        assert_eq!(
            fields,
            vec![
                OrderByField {
                    column: "status".to_string(),
                    descending: true
                },
                OrderByField {
                    column: "id".to_string(),
                    descending: false
                },
            ]
        );
        assert!(!parse_order_by("id ASC").unwrap()[0].descending);
    }

    #[test]
    fn test_parse_order_by_rejects_malformed() {
        assert!(parse_order_by("id sideways").is_err());
        assert!(parse_order_by("id,,status").is_err());
        assert!(parse_order_by("id desc extra").is_err());
    }

    #[test]
    fn test_sort_across_batches() {
        let batches = vec![
            batch(vec![3, 1], vec!["open", "closed"]),
            batch(vec![2, 4], vec!["open", "closed"]),
        ];
        let fields = parse_order_by("id desc").unwrap();
        let sorted = sort_batches(&schema(), &batches, &fields).unwrap();
        assert_eq!(ids(&sorted), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_sort_is_stable() {
        let batches = vec![batch(
            vec![1, 2, 3, 4],
            vec!["open", "closed", "open", "closed"],
        )];
        let fields = parse_order_by("status").unwrap();
        let sorted = sort_batches(&schema(), &batches, &fields).unwrap();
        assert_eq!(ids(&sorted), vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_sort_unknown_column() {
        let fields = parse_order_by("missing").unwrap();
        let err = sort_batches(&schema(), &[], &fields).unwrap_err();
        assert!(matches!(err, QueryError::ColumnNotFound(ref c) if c == "missing"));
    }

    #[test]
    fn test_slice_skip_and_fetch() {
        let batches = vec![
            batch(vec![1, 2, 3], vec!["a", "b", "c"]),
            batch(vec![4, 5, 6], vec!["d", "e", "f"]),
        ];

        assert_eq!(ids(&slice_batches(batches.clone(), 2, Some(3))), vec![3, 4, 5]);
        assert_eq!(ids(&slice_batches(batches.clone(), 4, None)), vec![5, 6]);
        assert_eq!(ids(&slice_batches(batches.clone(), 0, Some(1))), vec![1]);
        assert!(slice_batches(batches, 10, None).is_empty());
    }

    #[test]
    fn test_slice_window_edges() {
        let batches = vec![
            batch(vec![1, 2], vec!["a", "b"]),
            batch(vec![], vec![]),
            batch(vec![3, 4], vec!["c", "d"]),
        ];

        assert!(slice_batches(batches.clone(), 1, Some(0)).is_empty());
        // Batches past the window are not touched
        assert_eq!(slice_batches(batches.clone(), 0, Some(2)).len(), 1);
        assert_eq!(ids(&slice_batches(batches.clone(), 1, Some(2))), vec![2, 3]);
        assert_eq!(ids(&slice_batches(batches, usize::MAX, Some(5))), Vec::<i64>::new());
    }
}
