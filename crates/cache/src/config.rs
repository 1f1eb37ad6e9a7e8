//! Texture cache configuration.
//!
//! Settings can be built programmatically, loaded from a TOML file, or
//! overridden through environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Variants kept per (document, page) unless overridden.
pub const DEFAULT_MAX_TEXTURES_KEEP: usize = 5;

pub const ENV_MAX_TEXTURES: &str = "PDF_DESKTOP_MAX_TEXTURES";
pub const ENV_FREEING: &str = "PDF_DESKTOP_FREEING";

/// How cached variants are freed besides the per-page capacity bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeingStrategy {
    /// Entries live until capacity eviction pushes them out.
    #[default]
    Retain,
    /// Every `get` takes a reference that must be released; an entry is
    /// dropped as soon as its count returns to zero.
    #[serde(alias = "aggressive")]
    RefCounted,
}

impl FromStr for FreeingStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "ref_counted" | "refcounted" | "aggressive" => Ok(Self::RefCounted),
            other => Err(ConfigError::InvalidValue { key: "freeing", value: other.to_owned() }),
        }
    }
}

/// Configuration for the texture cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resolution variants kept per page.
    pub max_textures_keep: usize,
    /// Freeing mode.
    pub freeing: FreeingStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_textures_keep: DEFAULT_MAX_TEXTURES_KEEP, freeing: FreeingStrategy::Retain }
    }
}

impl CacheConfig {
    pub fn new(max_textures_keep: usize, freeing: FreeingStrategy) -> Self {
        Self { max_textures_keep, freeing }
    }

    /// Sets the per-page variant capacity.
    pub fn with_max_textures_keep(mut self, max: usize) -> Self {
        self.max_textures_keep = max;
        self
    }

    /// Sets the freeing mode.
    pub fn with_freeing(mut self, freeing: FreeingStrategy) -> Self {
        self.freeing = freeing;
        self
    }

    pub fn is_ref_counted(&self) -> bool {
        self.freeing == FreeingStrategy::RefCounted
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// - `PDF_DESKTOP_MAX_TEXTURES`: variants kept per page (default: 5)
    /// - `PDF_DESKTOP_FREEING`: `retain` or `ref_counted` (default: retain)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies any environment overrides to this configuration.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var(ENV_MAX_TEXTURES) {
            self.max_textures_keep = val
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue { key: ENV_MAX_TEXTURES, value: val })?;
        }

        if let Ok(val) = std::env::var(ENV_FREEING) {
            self.freeing = val.parse()?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// ```toml
    /// max_textures_keep = 5
    /// freeing = "retain"
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_textures_keep == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_textures_keep",
                value: self.max_textures_keep.to_string(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
