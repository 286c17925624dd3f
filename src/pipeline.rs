// THEORY:
// The `pipeline` module is the top-level API of the engine. `AnalysisController`
// owns one analysis session at a time: the list of sources, the running flag,
// the sampling rate and the lane counters. Starting a session spawns one
// `StreamWorker` per source on tokio's blocking pool, so decoding and inference
// for different cameras run truly in parallel; stopping just clears the flag
// every worker polls.
//
// Neither `start` nor `stop` waits for workers. Tests and shutdown paths that
// need determinism call `join`, which waits up to a deadline; workers still
// running at the deadline stay with the session and count as live. A new
// `start` always signals the previous session first; its workers keep their own
// flag and counters, so two sessions never write into the same store.
//
// A stream that cannot be opened posts an error status as soon as its worker
// gives up, without waiting for anyone to `join`.

use crate::config::AnalysisConfig;
use crate::core_modules::annotator::FrameAnnotator;
use crate::core_modules::detection::{Detector, DetectorTrainer};
use crate::core_modules::display::DisplaySink;
use crate::core_modules::lane_counts::{LaneCountStore, LaneCounts};
use crate::core_modules::lane_mapper::LaneMapper;
use crate::core_modules::source::{VideoOpener, VideoSource};
use crate::core_modules::stream_worker::{StreamWorker, WorkerReport};
use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub const UPLOAD_OK: &str = "Footages uploaded successfully.";
pub const UPLOAD_MISSING: &str = "Please upload footages first!";
pub const TRAINING_OK: &str = "Model trained successfully.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

/// The user-visible status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }
}

/// One start-to-stop run over a fixed set of sources.
struct AnalysisSession {
    sources: Vec<VideoSource>,
    running: Arc<AtomicBool>,
    sampling_rate: u32,
    lane_counts: Arc<LaneCountStore>,
    workers: Vec<JoinHandle<WorkerReport>>,
}

impl AnalysisSession {
    /// Clears the running flag. Returns true if it was set.
    fn signal_stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }

    fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }
}

/// Orchestrates stream workers over uploaded video sources.
pub struct AnalysisController {
    config: AnalysisConfig,
    opener: Arc<dyn VideoOpener>,
    detector: Arc<dyn Detector>,
    sink: Arc<dyn DisplaySink>,
    uploaded: Vec<VideoSource>,
    sampling_rate: u32,
    session: Option<AnalysisSession>,
    /// Workers of replaced sessions that had not finished yet.
    abandoned: Vec<JoinHandle<WorkerReport>>,
    status: Arc<watch::Sender<StatusMessage>>,
}

impl AnalysisController {
    pub fn new(
        config: AnalysisConfig,
        opener: Arc<dyn VideoOpener>,
        detector: Arc<dyn Detector>,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let (status, _) = watch::channel(StatusMessage::info(""));
        Ok(Self {
            sampling_rate: config.sampling_rate,
            config,
            opener,
            detector,
            sink,
            uploaded: Vec::new(),
            session: None,
            abandoned: Vec::new(),
            status: Arc::new(status),
        })
    }

    /// Starts a session over `sources`, replacing any session in progress.
    ///
    /// Returns as soon as the workers are spawned. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self, sources: Vec<VideoSource>, sampling_rate: u32) -> Result<(), PipelineError> {
        if sources.is_empty() {
            return Err(PipelineError::InvalidInput("no video sources to analyze".into()));
        }
        if sampling_rate == 0 {
            return Err(PipelineError::InvalidInput("sampling rate must be at least 1".into()));
        }
        let runtime = Handle::try_current().map_err(|e| PipelineError::Runtime(e.to_string()))?;

        let lane_counts = self.retire_session();
        let running = Arc::new(AtomicBool::new(true));
        let mapper = LaneMapper::new(self.config.lane_count).with_reference_width(self.config.reference_width);
        let annotator = FrameAnnotator::new(self.config.annotation_seed, self.config.box_thickness);

        let cores = num_cpus::get();
        if sources.len() > cores {
            warn!(streams = sources.len(), cores, "more streams than CPU cores, workers will contend");
        }

        let workers = sources
            .iter()
            .enumerate()
            .map(|(panel, source)| {
                let worker = StreamWorker::new(
                    panel,
                    source.clone(),
                    sampling_rate,
                    Arc::clone(&self.opener),
                    Arc::clone(&self.detector),
                    mapper,
                    annotator,
                    Arc::clone(&lane_counts),
                    Arc::clone(&self.sink),
                    Arc::clone(&running),
                );
                let status = Arc::clone(&self.status);
                runtime.spawn_blocking(move || {
                    let report = worker.run();
                    if let Some(err) = &report.open_error {
                        status.send_replace(StatusMessage::error(err.to_string()));
                    }
                    report
                })
            })
            .collect();

        info!(streams = sources.len(), sampling_rate, lanes = lane_counts.lane_count(), "analysis started");
        self.session = Some(AnalysisSession {
            sources,
            running,
            sampling_rate,
            lane_counts,
            workers,
        });
        Ok(())
    }

    /// Asks every worker of the current session to stop. Does not wait.
    pub fn stop(&mut self) {
        if let Some(session) = &self.session {
            if session.signal_stop() {
                info!("analysis stop requested");
            }
        }
    }

    /// Waits up to `timeout` for the current session's workers and returns
    /// the reports of those that finished. Workers still running at the
    /// deadline stay attached to the session; a later `join` picks them up.
    pub async fn join(&mut self, timeout: Duration) -> Vec<WorkerReport> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let deadline = Instant::now() + timeout;
        let mut reports = Vec::with_capacity(session.workers.len());
        let mut pending = Vec::new();
        for mut handle in std::mem::take(&mut session.workers) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => error!(error = %err, "stream worker panicked"),
                Err(_) => pending.push(handle),
            }
        }

        if !pending.is_empty() {
            warn!(workers = pending.len(), "stream workers still running at the join deadline");
        }
        session.workers = pending;
        reports
    }

    /// Replaces the list of sources used by `analyze`.
    pub fn upload<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.uploaded = paths.into_iter().map(VideoSource::new).collect();
        if !self.uploaded.is_empty() {
            info!(count = self.uploaded.len(), "footages uploaded");
            self.status.send_replace(StatusMessage::info(UPLOAD_OK));
        }
        self.uploaded.len()
    }

    /// Starts a session over the uploaded sources at the configured rate.
    pub fn analyze(&mut self) -> Result<(), PipelineError> {
        if self.uploaded.is_empty() {
            self.status.send_replace(StatusMessage::error(UPLOAD_MISSING));
            return Err(PipelineError::InvalidInput(UPLOAD_MISSING.into()));
        }
        let sources = self.uploaded.clone();
        // Posted first so early open failures from the new workers win.
        self.status
            .send_replace(StatusMessage::info(format!("Analyzing {} footage(s).", sources.len())));
        if let Err(err) = self.start(sources, self.sampling_rate) {
            self.status.send_replace(StatusMessage::error(err.to_string()));
            return Err(err);
        }
        Ok(())
    }

    /// Sets the sampling rate used by the next `analyze`.
    pub fn set_sampling_rate(&mut self, sampling_rate: u32) -> Result<(), PipelineError> {
        if sampling_rate == 0 {
            return Err(PipelineError::InvalidInput("sampling rate must be at least 1".into()));
        }
        self.sampling_rate = sampling_rate;
        Ok(())
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Replaces the detector. A running session keeps the one it started with.
    pub fn install_detector(&mut self, detector: Arc<dyn Detector>) {
        if self.is_running() {
            info!("detector replaced, takes effect on the next start");
        }
        self.detector = detector;
    }

    /// Trains a detector from `dataset` and installs it.
    pub fn train_detector(&mut self, trainer: &dyn DetectorTrainer, dataset: &Path) -> Result<(), PipelineError> {
        match trainer.train(dataset) {
            Ok(detector) => {
                self.install_detector(detector);
                self.status.send_replace(StatusMessage::info(TRAINING_OK));
                Ok(())
            }
            Err(err) => {
                self.status.send_replace(StatusMessage::error(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Counts of the current session, or zeros if none was started.
    pub fn lane_counts(&self) -> LaneCounts {
        match &self.session {
            Some(session) => session.lane_counts.snapshot(),
            None => LaneCounts(vec![0; self.config.lane_count]),
        }
    }

    /// True while the current session has not been stopped and still has
    /// workers running, including ones a timed-out `join` left behind.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::Acquire) && s.live_workers() > 0)
    }

    /// Workers still alive, including abandoned ones from earlier sessions.
    pub fn active_workers(&mut self) -> usize {
        self.abandoned.retain(|w| !w.is_finished());
        let current = self.session.as_ref().map_or(0, AnalysisSession::live_workers);
        current + self.abandoned.len()
    }

    pub fn sources(&self) -> &[VideoSource] {
        self.session
            .as_ref()
            .map(|s| s.sources.as_slice())
            .unwrap_or_default()
    }

    pub fn uploaded(&self) -> &[VideoSource] {
        &self.uploaded
    }

    /// Sampling rate of the current session, if any.
    pub fn session_sampling_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sampling_rate)
    }

    pub fn status(&self) -> watch::Receiver<StatusMessage> {
        self.status.subscribe()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Stops the current session and hands back a zeroed store for the next.
    ///
    /// The old store is reset and reused only when no worker holds it any
    /// more; otherwise they keep it and the new session gets a fresh one.
    fn retire_session(&mut self) -> Arc<LaneCountStore> {
        let Some(previous) = self.session.take() else {
            return Arc::new(LaneCountStore::new(self.config.lane_count));
        };
        previous.signal_stop();

        if Arc::strong_count(&previous.lane_counts) == 1 {
            previous.lane_counts.reset();
            previous.lane_counts
        } else {
            warn!(
                workers = previous.workers.len(),
                "previous session still running, abandoning its workers"
            );
            self.abandoned.extend(previous.workers);
            Arc::new(LaneCountStore::new(self.config.lane_count))
        }
    }
}

impl Drop for AnalysisController {
    fn drop(&mut self) {
        // Workers are detached on drop; make sure they wind down.
        if let Some(session) = &self.session {
            session.signal_stop();
        }
    }
}
