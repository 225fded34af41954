//! Page cache configuration
//!
//! The memory budget and the two tuning knobs of the page cache (how far a
//! cached render may be stretched, and how many recently touched pages are
//! shielded from eviction) are empirical values, so they are configurable
//! rather than constants. Configuration can be loaded from a TOML file,
//! environment variables, or created programmatically.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ENV_BUDGET_PIXELS: &str = "PDF_VIEWER_CACHE_BUDGET_PIXELS";
const ENV_APPROXIMATION_TOLERANCE: &str = "PDF_VIEWER_APPROXIMATION_TOLERANCE";
const ENV_PROTECTED_RECENT: &str = "PDF_VIEWER_PROTECTED_RECENT";
const ENV_REFINE_APPROXIMATIONS: &str = "PDF_VIEWER_REFINE_APPROXIMATIONS";

/// Configuration for the page image cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Budget for all cached page images, in pixels (width x height summed)
    pub budget_pixels: u64,

    /// Largest scale difference (exclusive) for which an exact render is
    /// rescaled instead of waiting for a new render
    pub approximation_tolerance: f64,

    /// Number of most recently touched pages that eviction never clears
    pub protected_recent: u64,

    /// Whether an approximated image also schedules an exact render at the
    /// requested scale
    pub refine_approximations: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_pixels: 60_000_000,
            approximation_tolerance: 20.0,
            protected_recent: 2,
            refine_approximations: true,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given budget and default tuning.
    pub fn new(budget_pixels: u64) -> Self {
        Self {
            budget_pixels,
            ..Default::default()
        }
    }

    /// Sets the pixel budget.
    pub fn with_budget_pixels(mut self, budget_pixels: u64) -> Self {
        self.budget_pixels = budget_pixels;
        self
    }

    /// Sets the approximation tolerance (in scale units).
    pub fn with_approximation_tolerance(mut self, tolerance: f64) -> Self {
        self.approximation_tolerance = tolerance;
        self
    }

    /// Sets how many recently touched pages are protected from eviction.
    pub fn with_protected_recent(mut self, count: u64) -> Self {
        self.protected_recent = count;
        self
    }

    /// Enables or disables exact re-renders after an approximation.
    pub fn with_refine_approximations(mut self, refine: bool) -> Self {
        self.refine_approximations = refine;
        self
    }

    /// Checks that the values are usable.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for a zero budget or a negative
    /// or non-finite tolerance.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.budget_pixels == 0 {
            return Err(ConfigError::InvalidValue {
                key: "budget_pixels".to_string(),
                value: "0".to_string(),
            });
        }

        if !self.approximation_tolerance.is_finite() || self.approximation_tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "approximation_tolerance".to_string(),
                value: self.approximation_tolerance.to_string(),
            });
        }

        Ok(())
    }

    /// Returns the default configuration file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/pdf-viewer/render-cache.toml
    /// - Linux: ~/.config/pdf-viewer/render-cache.toml
    /// - Windows: %APPDATA%\pdf-viewer\render-cache.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pdf-viewer").join("render-cache.toml")
        } else {
            PathBuf::from("render-cache.toml")
        }
    }

    /// Loads the effective configuration.
    ///
    /// Starts from the file at [`CacheConfig::default_config_path`] if it
    /// exists (defaults otherwise), then applies environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if an environment variable holds an invalid value.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::default_config_path();
        let base = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        base.with_env_overrides()
    }

    /// Loads configuration from environment variables over the defaults.
    ///
    /// Environment variables:
    /// - `PDF_VIEWER_CACHE_BUDGET_PIXELS`: pixel budget (default: 60000000)
    /// - `PDF_VIEWER_APPROXIMATION_TOLERANCE`: rescale tolerance (default: 20)
    /// - `PDF_VIEWER_PROTECTED_RECENT`: protected page count (default: 2)
    /// - `PDF_VIEWER_REFINE_APPROXIMATIONS`: `true`/`false` (default: true)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
        if let Some(value) = env_value(ENV_BUDGET_PIXELS)? {
            self.budget_pixels = value;
        }

        if let Some(value) = env_value(ENV_APPROXIMATION_TOLERANCE)? {
            self.approximation_tolerance = value;
        }

        if let Some(value) = env_value(ENV_PROTECTED_RECENT)? {
            self.protected_recent = value;
        }

        if let Some(value) = env_value(ENV_REFINE_APPROXIMATIONS)? {
            self.refine_approximations = value;
        }

        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// budget_pixels = 60000000
    /// approximation_tolerance = 20.0
    /// protected_recent = 2
    /// refine_approximations = true
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string(self)?)
    }
}

/// Reads and parses one environment variable, if set.
fn env_value<T: std::str::FromStr>(key: &str) -> ConfigResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },

    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed TOML
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be encoded as TOML
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
