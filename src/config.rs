use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LANE_COUNT: usize = 4;
/// Width the fixed 320/640/960 lane thresholds were drawn for.
pub const DEFAULT_REFERENCE_WIDTH: u32 = 1280;

/// Tunable behavior of an analysis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of equal-width horizontal lanes detections are bucketed into.
    pub lane_count: usize,
    /// Decoded frames per processed frame. 1 processes every frame.
    pub sampling_rate: u32,
    /// When set, lane boundaries are computed against this width instead of the
    /// decoded frame width.
    pub reference_width: Option<u32>,
    /// Seed for the per-box outline colors.
    pub annotation_seed: u64,
    /// Outline thickness in pixels.
    pub box_thickness: u32,
    /// How long `join` waits for workers before abandoning them.
    pub join_timeout_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lane_count: DEFAULT_LANE_COUNT,
            sampling_rate: 1,
            reference_width: None,
            annotation_seed: 0x1a7e_c0de,
            box_thickness: 2,
            join_timeout_ms: 2_000,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lane_count == 0 {
            return Err(ConfigError::Invalid("lane_count must be at least 1".into()));
        }
        if self.sampling_rate == 0 {
            return Err(ConfigError::Invalid("sampling_rate must be at least 1".into()));
        }
        if self.reference_width == Some(0) {
            return Err(ConfigError::Invalid("reference_width must be positive".into()));
        }
        if self.box_thickness == 0 {
            return Err(ConfigError::Invalid("box_thickness must be at least 1".into()));
        }
        Ok(())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}
