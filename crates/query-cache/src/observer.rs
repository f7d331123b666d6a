//! Observability hooks for scoped caches
//!
//! The cache never depends on an observer for correctness; observers are
//! told about conditions worth surfacing and nothing else.

use crate::store::ScopeId;
use tracing::warn;

/// Receives notifications about scope cache health
pub trait CacheObserver: Send + Sync {
    /// A scope grew past its configured soft size threshold
    fn on_cache_size_warning(&self, scope_id: ScopeId, size: usize);
}

/// An observer that ignores every notification
#[derive(Debug, Default, Clone)]
pub struct NoOpObserver;

impl CacheObserver for NoOpObserver {
    fn on_cache_size_warning(&self, _scope_id: ScopeId, _size: usize) {}
}

/// An observer that reports through `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn on_cache_size_warning(&self, scope_id: ScopeId, size: usize) {
        warn!(
            scope_id = %scope_id,
            size,
            "Scope cache exceeded its size warning threshold"
        );
    }
}
