// THEORY:
// This file is the main entry point for the `lanewatch` library crate.
// It exposes the `AnalysisController` and the data structures that flow through
// it (`Detection`, `AnnotatedFrame`, `LaneCounts`, `WorkerReport`, ...) as the
// public API consumed by front ends such as the `lane_monitor` binary.
//
// The analysis itself lives in `core_modules`: pure lane mapping and frame
// annotation, the shared lane counters, the per-panel display handoff, and the
// per-source `StreamWorker` loop. The `pipeline` module ties them together into
// sessions that can be started, stopped and joined.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::AnalysisConfig;
pub use core_modules::annotator::FrameAnnotator;
pub use core_modules::detection::{BoundingBox, Detection, Detector, DetectorTrainer};
pub use core_modules::display::{AnnotatedFrame, DisplaySink, PanelBus, PanelReceiver};
pub use core_modules::lane_counts::{LaneCountStore, LaneCounts};
pub use core_modules::lane_mapper::{LaneMapper, lane_of};
pub use core_modules::source::{Frame, FrameReader, VideoOpener, VideoSource};
pub use core_modules::stream_worker::{StopReason, StreamWorker, WorkerReport, WorkerState};
pub use error::{ConfigError, DecodeError, InferenceError, OpenError, PipelineError, TrainingError};
pub use pipeline::{AnalysisController, StatusLevel, StatusMessage};
