//! Session configuration
//!
//! Bundles the cache and worker settings of one open document. As a TOML
//! file the two parts are separate tables:
//!
//! ```toml
//! [cache]
//! budget_pixels = 60000000
//! approximation_tolerance = 20.0
//!
//! [worker]
//! thread_name = "pdf-render-worker"
//! ```

use pdf_viewer_cache::{CacheConfig, ConfigResult};
use pdf_viewer_scheduler::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

impl SessionConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Default worker settings with the cache settings from
    /// [`CacheConfig::load`] (config file, then environment).
    pub fn load() -> ConfigResult<Self> {
        Ok(Self {
            cache: CacheConfig::load()?,
            worker: WorkerConfig::default(),
        })
    }

    /// Parses a session configuration from TOML.
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.cache.validate()?;
        Ok(config)
    }

    /// Loads a session configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        Self::from_toml(&fs::read_to_string(path.as_ref())?)
    }
}
