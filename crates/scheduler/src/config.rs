//! Viewport scheduling configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default debounce between the last viewport change and the load request.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Below this view scale pages are loaded at [`DEFAULT_LOAD_SCALE`] instead.
pub const DEFAULT_MIN_LOAD_SCALE: f32 = 0.1;

/// Scale used for seeding and for views zoomed out past the minimum.
pub const DEFAULT_LOAD_SCALE: f32 = 0.1;

/// Requests are never issued above this scale.
pub const DEFAULT_MAX_LOAD_SCALE: f32 = 2.5;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerConfigError {
    #[error("invalid scheduler setting {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period after a viewport change before visible pages are requested
    pub debounce_ms: u64,

    /// Smallest view scale that is requested as-is
    pub min_load_scale: f32,

    /// Fallback scale for zoomed-out views and for the seed batch
    pub default_scale: f32,

    /// Upper bound on requested scales
    pub max_load_scale: f32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            min_load_scale: DEFAULT_MIN_LOAD_SCALE,
            default_scale: DEFAULT_LOAD_SCALE,
            max_load_scale: DEFAULT_MAX_LOAD_SCALE,
        }
    }
}

impl SchedulerConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_default_scale(mut self, scale: f32) -> Self {
        self.default_scale = scale;
        self
    }

    pub fn with_load_scale_range(mut self, min: f32, max: f32) -> Self {
        self.min_load_scale = min;
        self.max_load_scale = max;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Reject non-positive scales and an inverted load range.
    pub fn validate(&self) -> Result<(), SchedulerConfigError> {
        let scales = [
            ("min_load_scale", self.min_load_scale),
            ("default_scale", self.default_scale),
            ("max_load_scale", self.max_load_scale),
        ];
        for (key, value) in scales {
            if !(value.is_finite() && value > 0.0) {
                return Err(SchedulerConfigError::InvalidValue { key, value: value.to_string() });
            }
        }
        if self.max_load_scale < self.min_load_scale {
            return Err(SchedulerConfigError::InvalidValue {
                key: "max_load_scale",
                value: format!("{} < min_load_scale {}", self.max_load_scale, self.min_load_scale),
            });
        }
        Ok(())
    }
}
