//! Memoizing facade over a transformation pipeline
//!
//! Wraps a pipeline so that, within one scope, each distinct
//! (collection, parameters) pair is transformed at most once. Repeated
//! calls hand back the very same `Arc` the first call produced.

use crate::key::derive_key;
use crate::scope::active_scope;
use crate::stats::CacheStats;
use crate::store::CacheEntry;
use query_core::{CollectionIdentity, QueryParams};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// The expensive operation being memoized
pub trait TransformPipeline<C: ?Sized> {
    /// Handle to the transformed collection
    type Output: Send + Sync + 'static;
    type Error;

    fn apply(&self, collection: &C, params: &QueryParams) -> Result<Self::Output, Self::Error>;
}

/// Pipeline backed by a closure, see [`pipeline_fn`]
pub struct FnPipeline<F, O, E> {
    f: F,
    _output: PhantomData<fn() -> Result<O, E>>,
}

/// Adapt a closure into a [`TransformPipeline`]
pub fn pipeline_fn<C, F, O, E>(f: F) -> FnPipeline<F, O, E>
where
    C: ?Sized,
    F: Fn(&C, &QueryParams) -> Result<O, E>,
{
    FnPipeline {
        f,
        _output: PhantomData,
    }
}

impl<C, F, O, E> TransformPipeline<C> for FnPipeline<F, O, E>
where
    C: ?Sized,
    F: Fn(&C, &QueryParams) -> Result<O, E>,
    O: Send + Sync + 'static,
{
    type Output = O;
    type Error = E;

    fn apply(&self, collection: &C, params: &QueryParams) -> Result<O, E> {
        (self.f)(collection, params)
    }
}

/// The entry point callers use instead of invoking a pipeline directly
pub struct QueryMemoizer<P> {
    pipeline: P,
    stats: Arc<CacheStats>,
}

impl<P> QueryMemoizer<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Transform `collection`, reusing the active scope's result when one exists.
    ///
    /// Without a usable scope, or when the parameters cannot be keyed, the
    /// pipeline runs directly and nothing is stored. Pipeline errors are
    /// returned unchanged and never cached.
    pub fn apply<C>(&self, collection: &C, params: &QueryParams) -> Result<Arc<P::Output>, P::Error>
    where
        C: CollectionIdentity + ?Sized,
        P: TransformPipeline<C>,
    {
        let Some(scope) = active_scope().filter(|scope| scope.is_enabled()) else {
            self.stats.record_bypass();
            debug!("No active scope, computing without cache");
            return self.compute(collection, params);
        };

        let collection_id = collection.collection_id();
        let key = match derive_key(&collection_id, params) {
            Ok(key) => key,
            Err(err) => {
                self.stats.record_key_failure();
                warn!(collection = %collection_id, error = %err, "Bypassing cache");
                return self.compute(collection, params);
            }
        };

        if let Some(entry) = scope.get(&key) {
            match entry.downcast::<P::Output>() {
                Ok(hit) => {
                    self.stats.record_hit();
                    debug!(
                        scope_id = %scope.id(),
                        key = ?key,
                        collection = %collection_id,
                        "Cache hit"
                    );
                    return Ok(hit);
                }
                Err(_) => {
                    debug!(key = ?key, "Cached entry has a different type, recomputing");
                }
            }
        }

        self.stats.record_miss();
        debug!(scope_id = %scope.id(), key = ?key, collection = %collection_id, "Cache miss");

        let result = self.compute(collection, params)?;
        scope.put(key, Arc::clone(&result) as CacheEntry);
        Ok(result)
    }

    /// Run the pipeline without consulting or filling any scope
    pub fn apply_uncached<C>(
        &self,
        collection: &C,
        params: &QueryParams,
    ) -> Result<Arc<P::Output>, P::Error>
    where
        C: ?Sized,
        P: TransformPipeline<C>,
    {
        self.compute(collection, params)
    }

    fn compute<C>(&self, collection: &C, params: &QueryParams) -> Result<Arc<P::Output>, P::Error>
    where
        C: ?Sized,
        P: TransformPipeline<C>,
    {
        self.pipeline.apply(collection, params).map(Arc::new)
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for QueryMemoizer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryMemoizer")
            .field("pipeline", &self.pipeline)
            .field("hits", &self.stats.hits())
            .field("misses", &self.stats.misses())
            .finish()
    }
}
