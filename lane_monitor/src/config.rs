use anyhow::{Context, Result, bail};
use lanewatch::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub analysis: AnalysisConfig,
    pub model: ModelConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// YOLOv8-style ONNX export with a `[1, 4 + classes, anchors]` output.
    pub path: PathBuf,
    pub input_size: i32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// COCO class ids to keep. Empty keeps every class.
    pub vehicle_classes: Vec<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("yolov8n.onnx"),
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            vehicle_classes: vec![2, 3, 5, 7],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for `panel_<n>.mp4` files. Nothing is written when unset.
    pub dir: Option<PathBuf>,
    pub fps: f64,
    /// Show one OpenCV window per panel.
    pub show_windows: bool,
    /// Display loop period.
    pub refresh_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            fps: 15.0,
            show_windows: false,
            refresh_ms: 33,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: MonitorConfig = serde_yaml::from_str(&contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        if self.model.input_size <= 0 {
            bail!("model.input_size must be positive");
        }
        if !(0.0..=1.0).contains(&self.model.confidence_threshold) {
            bail!("model.confidence_threshold must be within [0, 1]");
        }
        if self.output.fps <= 0.0 {
            bail!("output.fps must be positive");
        }
        if self.output.refresh_ms == 0 {
            bail!("output.refresh_ms must be at least 1");
        }
        Ok(())
    }
}
