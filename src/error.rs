//! Error types for lanewatch.
//!
//! Failures are scoped the way the pipeline isolates faults: an `OpenError` or
//! `DecodeError` ends one stream, an `InferenceError` skips one frame, and a
//! `PipelineError` is reported to whoever called the controller.

use std::path::PathBuf;
use thiserror::Error;

/// A video source could not be opened. Only the affected stream is skipped.
#[derive(Debug, Clone, Error)]
#[error("failed to open video source {source_id}: {reason}")]
pub struct OpenError {
    pub source_id: String,
    pub reason: String,
}

impl OpenError {
    pub fn new(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

/// Reading the next frame from an open source failed.
#[derive(Debug, Clone, Error)]
#[error("failed to decode frame {frame_index}: {reason}")]
pub struct DecodeError {
    pub frame_index: u64,
    pub reason: String,
}

/// The detector failed on a single frame.
#[derive(Debug, Clone, Error)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

/// Producing a new detector from a dataset failed.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(PathBuf),

    #[error("training failed: {0}")]
    Failed(String),
}

/// Loading or validating an `AnalysisConfig` failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the `AnalysisController`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `start` was called with nothing to analyze or a zero sampling rate.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Workers need a tokio runtime to be spawned on.
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
