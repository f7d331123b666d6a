//! Scoped memoization for query transformations
//!
//! This crate caches the result of applying a set of transformation
//! parameters (filter, order, offset, limit, ...) to a base collection, for
//! the lifetime of a single unit of work: a request, an async task, or an
//! explicitly delimited block. Nothing cached in one unit of work is ever
//! visible to another, and nothing survives the end of its scope.
//!
//! # Features
//!
//! - **Ambient scopes**: bound to the current task or thread, torn down
//!   automatically on completion, failure or cancellation
//! - **Explicit scopes**: block-scoped, nestable, strictly LIFO
//! - **Stable keys**: SHA-256 over the collection identity and the
//!   parameters sorted by name
//! - **Graceful degradation**: no scope, or unkeyable parameters, means the
//!   pipeline simply runs uncached
//! - **Statistics**: hits, misses, bypasses and key failures
//! - **Size warnings**: a soft per-scope threshold reported to an observer
//!
//! # Example
//!
//! ```ignore
//! use query_cache::{QueryMemoizer, ScopeController};
//!
//! let memoizer = QueryMemoizer::new(pipeline);
//! let controller = ScopeController::default();
//!
//! controller
//!     .ambient(async {
//!         let first = memoizer.apply(&orders, &params)?;
//!         let second = memoizer.apply(&orders, &params)?; // same Arc, no recompute
//!         Ok(())
//!     })
//!     .await
//! ```

pub mod config;
pub mod key;
pub mod memoizer;
pub mod observer;
pub mod scope;
pub mod stats;
pub mod store;

pub use config::ScopeConfig;
pub use key::{derive_key, CacheKey};
pub use memoizer::{pipeline_fn, FnPipeline, QueryMemoizer, TransformPipeline};
pub use observer::{CacheObserver, NoOpObserver, TracingObserver};
pub use scope::{
    active_scope, clear_active_scope, has_active_scope, AmbientScope, ExplicitScope,
    ScopeController,
};
pub use stats::CacheStats;
pub use store::{CacheEntry, ScopeId, ScopeKind, ScopeStore};
