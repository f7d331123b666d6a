//! Scope cache configuration options

use crate::observer::{CacheObserver, TracingObserver};
use std::fmt;
use std::sync::Arc;

/// Default soft limit on entries per scope before a warning is emitted
pub const DEFAULT_SIZE_WARNING_THRESHOLD: usize = 1000;

/// Configuration stamped onto every scope a controller creates
#[derive(Clone)]
pub struct ScopeConfig {
    /// Whether scopes created with this configuration cache at all
    pub enabled: bool,
    /// Soft entry count above which the observer is notified
    pub size_warning_threshold: Option<usize>,
    /// Receiver for size warnings
    pub observer: Arc<dyn CacheObserver>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_warning_threshold: Some(DEFAULT_SIZE_WARNING_THRESHOLD),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl ScopeConfig {
    /// Create a configuration whose scopes never cache
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enable or disable caching
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the soft size threshold
    pub fn with_size_warning_threshold(mut self, threshold: usize) -> Self {
        self.size_warning_threshold = Some(threshold);
        self
    }

    /// Never emit size warnings
    pub fn without_size_warning(mut self) -> Self {
        self.size_warning_threshold = None;
        self
    }

    /// Set the observer that receives size warnings
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl fmt::Debug for ScopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeConfig")
            .field("enabled", &self.enabled)
            .field("size_warning_threshold", &self.size_warning_threshold)
            .finish_non_exhaustive()
    }
}
