//! Combined desktop configuration.
//!
//! A single TOML file with a `[cache]` and a `[scheduler]` table. Missing
//! tables and keys fall back to the defaults; environment variables override
//! whatever the file says.

use pdf_desktop_cache::{CacheConfig, ConfigError};
use pdf_desktop_scheduler::{SchedulerConfig, SchedulerConfigError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Overrides the viewport debounce, in milliseconds.
pub const ENV_DEBOUNCE_MS: &str = "PDF_DESKTOP_DEBOUNCE_MS";

#[derive(Debug, thiserror::Error)]
pub enum DesktopConfigError {
    #[error(transparent)]
    Cache(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerConfigError),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Desktop configuration
///
/// ```toml
/// [cache]
/// max_textures_keep = 5
/// freeing = "retain"
///
/// [scheduler]
/// debounce_ms = 500
/// min_load_scale = 0.1
/// default_scale = 0.1
/// max_load_scale = 2.5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
}

impl DesktopConfig {
    pub fn new(cache: CacheConfig, scheduler: SchedulerConfig) -> Self {
        Self { cache, scheduler }
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, DesktopConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DesktopConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, DesktopConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PDF_DESKTOP_MAX_TEXTURES`, `PDF_DESKTOP_FREEING` and
    /// `PDF_DESKTOP_DEBOUNCE_MS`.
    pub fn with_env_overrides(mut self) -> Result<Self, DesktopConfigError> {
        self.cache = self.cache.with_env_overrides()?;

        if let Ok(val) = std::env::var(ENV_DEBOUNCE_MS) {
            self.scheduler.debounce_ms = val
                .trim()
                .parse()
                .map_err(|_| DesktopConfigError::InvalidValue { key: ENV_DEBOUNCE_MS, value: val })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DesktopConfigError> {
        fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DesktopConfigError> {
        self.cache.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}
