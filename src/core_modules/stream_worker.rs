// THEORY:
// A `StreamWorker` owns everything about one video source for the length of a
// session: it opens the source, decodes it frame by frame, and for every
// `sampling_rate`-th frame runs the full analysis (detect → map to lanes → count
// → annotate → publish to its panel).
//
// Lifecycle:
//
//   Idle → Opening → Running → (Draining | Exhausted) → Stopped
//
// - Opening failure goes straight to Stopped; no other worker is affected.
// - The shared `running` flag is checked once at the top of every iteration, so
//   a stop request is honoured within one frame of work.
// - The `FrameReader` is owned by `run` and dropped on every exit path, which
//   releases the source exactly once.
// - Inference failures skip that frame's detections; the loop keeps going.

use crate::core_modules::annotator::FrameAnnotator;
use crate::core_modules::detection::{Detection, Detector};
use crate::core_modules::display::{AnnotatedFrame, DisplaySink};
use crate::core_modules::lane_counts::LaneCountStore;
use crate::core_modules::lane_mapper::LaneMapper;
use crate::core_modules::source::{FrameReader, VideoOpener, VideoSource};
use crate::error::OpenError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Opening,
    Running,
    Draining,
    Exhausted,
    Stopped,
}

/// Why a worker reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source could not be opened.
    OpenFailed,
    /// The source ran out of frames.
    Exhausted,
    /// The session's running flag was cleared.
    StopRequested,
    /// Decoding the next frame failed.
    DecodeFailed,
}

/// Summary returned by a worker once it stops.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub panel: usize,
    pub source: VideoSource,
    pub final_state: WorkerState,
    pub stop_reason: StopReason,
    /// Frames successfully decoded.
    pub frames_decoded: u64,
    /// Frames that went through detection, annotation and publishing.
    pub frames_processed: u64,
    /// Detections counted into lanes.
    pub detections: u64,
    pub inference_failures: u64,
    pub open_error: Option<OpenError>,
}

/// Per-source analysis loop.
pub struct StreamWorker {
    panel: usize,
    source: VideoSource,
    sampling_rate: u32,
    opener: Arc<dyn VideoOpener>,
    detector: Arc<dyn Detector>,
    mapper: LaneMapper,
    annotator: FrameAnnotator,
    counts: Arc<LaneCountStore>,
    sink: Arc<dyn DisplaySink>,
    running: Arc<AtomicBool>,
    state: WorkerState,
}

impl StreamWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        panel: usize,
        source: VideoSource,
        sampling_rate: u32,
        opener: Arc<dyn VideoOpener>,
        detector: Arc<dyn Detector>,
        mapper: LaneMapper,
        annotator: FrameAnnotator,
        counts: Arc<LaneCountStore>,
        sink: Arc<dyn DisplaySink>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            panel,
            source,
            sampling_rate: sampling_rate.max(1),
            opener,
            detector,
            mapper,
            annotator,
            counts,
            sink,
            running,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Runs the worker to completion on the current thread.
    pub fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            panel: self.panel,
            source: self.source.clone(),
            final_state: WorkerState::Idle,
            stop_reason: StopReason::Exhausted,
            frames_decoded: 0,
            frames_processed: 0,
            detections: 0,
            inference_failures: 0,
            open_error: None,
        };

        self.state = WorkerState::Opening;
        let reader = match self.opener.open(&self.source) {
            Ok(reader) => reader,
            Err(err) => {
                warn!(panel = self.panel, source = %self.source, error = %err, "skipping stream");
                self.state = WorkerState::Stopped;
                report.final_state = self.state;
                report.stop_reason = StopReason::OpenFailed;
                report.open_error = Some(err);
                return report;
            }
        };

        info!(panel = self.panel, source = %self.source, sampling_rate = self.sampling_rate, "stream opened");
        self.state = WorkerState::Running;
        report.stop_reason = self.decode_loop(reader, &mut report);
        // The reader was consumed by `decode_loop` and is released by now.
        self.state = WorkerState::Stopped;
        report.final_state = self.state;

        info!(
            panel = self.panel,
            source = %self.source,
            reason = ?report.stop_reason,
            decoded = report.frames_decoded,
            processed = report.frames_processed,
            detections = report.detections,
            "stream stopped"
        );
        report
    }

    fn decode_loop(&mut self, mut reader: Box<dyn FrameReader>, report: &mut WorkerReport) -> StopReason {
        let mut frame_counter: u64 = 0;

        loop {
            if !self.running.load(Ordering::Acquire) {
                self.state = WorkerState::Draining;
                debug!(panel = self.panel, "stop requested, draining");
                return StopReason::StopRequested;
            }

            let frame = match reader.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.state = WorkerState::Exhausted;
                    return StopReason::Exhausted;
                }
                Err(err) => {
                    warn!(panel = self.panel, source = %self.source, error = %err, "decode failed");
                    return StopReason::DecodeFailed;
                }
            };

            let frame_index = frame_counter;
            frame_counter += 1;
            report.frames_decoded += 1;

            if frame_index % u64::from(self.sampling_rate) != 0 {
                continue;
            }

            let detections = match self.detector.detect(&frame) {
                Ok(detections) => detections,
                Err(err) => {
                    warn!(panel = self.panel, frame_index, error = %err, "skipping detections for frame");
                    report.inference_failures += 1;
                    Vec::new()
                }
            };

            self.count_lanes(&detections, frame.width());
            report.detections += detections.len() as u64;

            let image = self.annotator.annotate(&frame, &detections);
            self.sink.publish(
                self.panel,
                AnnotatedFrame {
                    panel: self.panel,
                    frame_index,
                    image,
                },
            );
            report.frames_processed += 1;
            debug!(panel = self.panel, frame_index, vehicles = detections.len(), "frame processed");
        }
    }

    fn count_lanes(&self, detections: &[Detection], frame_width: u32) {
        for detection in detections {
            let lane = self.mapper.lane_of(&detection.bbox, frame_width);
            self.counts.increment(lane);
        }
    }
}
