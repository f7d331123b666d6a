pub mod filter;
pub mod memoized_executor;
pub mod ordering;
pub mod pipeline;
pub mod table;

pub use filter::{FilterTranslator, UnsupportedFilter};
pub use memoized_executor::MemoizedExecutor;
pub use ordering::{parse_order_by, OrderByField};
pub use pipeline::{RecordBatchPipeline, TransformedCollection};
pub use table::MemoryTable;
