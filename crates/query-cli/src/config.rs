use anyhow::Result;
use query_cache::ScopeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheSettings,
    pub show_stats: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub size_warning_threshold: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            show_stats: true,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = ScopeConfig::default();
        Self {
            enabled: defaults.enabled,
            size_warning_threshold: defaults.size_warning_threshold,
        }
    }
}

impl CacheSettings {
    pub fn to_scope_config(&self) -> ScopeConfig {
        let config = ScopeConfig::default().with_enabled(self.enabled);
        match self.size_warning_threshold {
            Some(threshold) => config.with_size_warning_threshold(threshold),
            None => config.without_size_warning(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
