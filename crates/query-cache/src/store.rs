//! Per-scope key -> entry storage

use crate::config::ScopeConfig;
use crate::key::CacheKey;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A cached result. Stored and handed back by reference, never copied.
pub type CacheEntry = Arc<dyn Any + Send + Sync>;

/// Unique identity of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a scope was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Bound implicitly to the surrounding unit of work
    Ambient,
    /// Bound to a delimited block
    Explicit,
}

/// The cache owned by one scope.
///
/// Operations are internally synchronized so a store shared across threads
/// on purpose cannot be corrupted. Once closed, a store is permanently
/// empty: lookups miss and insertions are dropped.
pub struct ScopeStore {
    id: ScopeId,
    kind: ScopeKind,
    config: ScopeConfig,
    entries: Mutex<AHashMap<CacheKey, CacheEntry>>,
    closed: AtomicBool,
    /// Set once the size threshold has been reported; re-armed by `clear`
    size_warned: AtomicBool,
}

impl ScopeStore {
    pub fn new(kind: ScopeKind, config: ScopeConfig) -> Self {
        Self {
            id: ScopeId::new(),
            kind,
            config,
            entries: Mutex::new(AHashMap::new()),
            closed: AtomicBool::new(false),
            size_warned: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Whether lookups against this scope can ever hit
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if self.is_closed() {
            return None;
        }
        self.entries.lock().get(key).cloned()
    }

    /// Insert or overwrite an entry. Never rejected because of size.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        if self.is_closed() {
            debug!(scope_id = %self.id, key = ?key, "Dropping insert into closed scope");
            return;
        }

        let (size, replaced) = {
            let mut entries = self.entries.lock();
            let replaced = entries.insert(key, entry);
            (entries.len(), replaced)
        };
        // Previous value is released outside the lock
        drop(replaced);

        self.check_size(size);
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Discard every entry, keeping the scope itself alive
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.entries.lock());
        self.size_warned.store(false, Ordering::Release);
        if !drained.is_empty() {
            debug!(scope_id = %self.id, discarded = drained.len(), "Cleared scope cache");
        }
    }

    /// Tear the scope down: discard entries and refuse future inserts
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
    }

    fn check_size(&self, size: usize) {
        let Some(threshold) = self.config.size_warning_threshold else {
            return;
        };
        if size > threshold && !self.size_warned.swap(true, Ordering::AcqRel) {
            self.config.observer.on_cache_size_warning(self.id, size);
        }
    }
}

impl fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStore")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.config.enabled)
            .field("closed", &self.is_closed())
            .field("size", &self.size())
            .finish()
    }
}
