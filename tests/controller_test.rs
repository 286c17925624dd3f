use image::RgbImage;
use lanewatch::pipeline::UPLOAD_OK;
use lanewatch::{
    AnalysisConfig, AnalysisController, BoundingBox, DecodeError, Detection, Detector, DisplaySink, Frame,
    FrameReader, InferenceError, LaneCounts, OpenError, PanelBus, PipelineError, StatusLevel, StopReason,
    VideoOpener, VideoSource,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves `frames` blank 1280-wide frames, or frames forever for sources whose
/// name starts with "live". Sources named "missing*" fail to open.
struct TestCameras {
    frames: usize,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl TestCameras {
    fn new(frames: usize) -> Arc<Self> {
        Arc::new(Self {
            frames,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }
}

struct TestReel {
    remaining: Option<usize>,
    released: Arc<AtomicUsize>,
}

impl FrameReader for TestReel {
    fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match &mut self.remaining {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => thread::sleep(Duration::from_millis(2)),
        }
        Ok(Some(RgbImage::new(1280, 16)))
    }
}

impl Drop for TestReel {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl VideoOpener for TestCameras {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn FrameReader>, OpenError> {
        let name = source.to_string();
        if name.starts_with("missing") {
            return Err(OpenError::new(name, "file not found"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let remaining = if name.starts_with("live") { None } else { Some(self.frames) };
        Ok(Box::new(TestReel {
            remaining,
            released: Arc::clone(&self.released),
        }))
    }
}

/// One vehicle per lane in every frame.
struct OnePerLane {
    calls: AtomicUsize,
}

impl Detector for OnePerLane {
    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok([160.0, 480.0, 800.0, 1120.0]
            .iter()
            .map(|cx| Detection::new(BoundingBox::from_center(*cx, 8.0, 40.0, 10.0), 0.9, "car"))
            .collect())
    }
}

fn setup(frames: usize, bus: &PanelBus) -> (AnalysisController, Arc<TestCameras>, Arc<OnePerLane>) {
    let cameras = TestCameras::new(frames);
    let detector = Arc::new(OnePerLane {
        calls: AtomicUsize::new(0),
    });
    let sink: Arc<dyn DisplaySink> = Arc::new(bus.clone());
    let controller = AnalysisController::new(AnalysisConfig::default(), cameras.clone(), detector.clone(), sink)
        .expect("valid config");
    (controller, cameras, detector)
}

fn sources(names: &[&str]) -> Vec<VideoSource> {
    names.iter().map(|n| VideoSource::new(*n)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_streams_count_every_detection() {
    let bus = PanelBus::new(3);
    let (mut controller, cameras, detector) = setup(20, &bus);

    controller.start(sources(&["a.mp4", "b.mp4", "c.mp4"]), 1).unwrap();
    let reports = controller.join(JOIN_TIMEOUT).await;

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.stop_reason == StopReason::Exhausted));
    assert_eq!(detector.calls.load(Ordering::SeqCst), 60);
    assert_eq!(controller.lane_counts(), LaneCounts(vec![60, 60, 60, 60]));
    assert_eq!(cameras.released.load(Ordering::SeqCst), 3);

    // Each worker published its last frame to its own panel.
    for panel in 0..3 {
        let latest = bus.latest(panel).expect("frame on panel");
        assert_eq!(latest.panel, panel);
        assert_eq!(latest.frame_index, 19);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sampling_rate_bounds_detector_calls() {
    let bus = PanelBus::new(1);
    let (mut controller, _cameras, detector) = setup(10, &bus);

    controller.start(sources(&["a.mp4"]), 3).unwrap();
    let reports = controller.join(JOIN_TIMEOUT).await;

    assert_eq!(reports[0].frames_decoded, 10);
    assert_eq!(reports[0].frames_processed, 4);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 4);
    assert_eq!(controller.session_sampling_rate(), Some(3));
    assert_eq!(bus.latest(0).unwrap().frame_index, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_idempotent_and_releases_each_source_once() {
    let bus = PanelBus::new(2);
    let (mut controller, cameras, _detector) = setup(0, &bus);

    controller.start(sources(&["live-1", "live-2"]), 1).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(controller.is_running());

    controller.stop();
    controller.stop();
    let reports = controller.join(JOIN_TIMEOUT).await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.stop_reason == StopReason::StopRequested));
    assert_eq!(cameras.released.load(Ordering::SeqCst), 2);
    assert!(!controller.is_running());
    assert_eq!(controller.active_workers(), 0);

    controller.stop();
    assert_eq!(cameras.released.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_open_only_skips_that_stream() {
    let bus = PanelBus::new(2);
    let (mut controller, _cameras, _detector) = setup(5, &bus);
    let status = controller.status();

    controller.start(sources(&["missing.mp4", "ok.mp4"]), 1).unwrap();
    let reports = controller.join(JOIN_TIMEOUT).await;

    let failed = reports.iter().find(|r| r.panel == 0).unwrap();
    let healthy = reports.iter().find(|r| r.panel == 1).unwrap();
    assert_eq!(failed.stop_reason, StopReason::OpenFailed);
    assert!(failed.open_error.is_some());
    assert_eq!(healthy.stop_reason, StopReason::Exhausted);
    assert_eq!(healthy.frames_processed, 5);
    assert_eq!(controller.lane_counts().total(), 20);
    assert!(bus.latest(0).is_none());
    assert_eq!(status.borrow().level, StatusLevel::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_never_mixes_sessions() {
    let bus = PanelBus::new(1);
    let (mut controller, cameras, _detector) = setup(3, &bus);

    controller.start(sources(&["live"]), 1).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(controller.lane_counts().total() > 0);

    // The live stream is still running; the new session must start from zero
    // and the old worker must wind down on its own.
    controller.start(sources(&["short.mp4"]), 1).unwrap();
    let reports = controller.join(JOIN_TIMEOUT).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(controller.lane_counts(), LaneCounts(vec![3, 3, 3, 3]));

    for _ in 0..500 {
        if controller.active_workers() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(controller.active_workers(), 0);
    assert_eq!(cameras.released.load(Ordering::SeqCst), cameras.opened.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_start_leaves_previous_counts_untouched() {
    let bus = PanelBus::new(1);
    let (mut controller, cameras, _detector) = setup(2, &bus);

    controller.start(sources(&["a.mp4"]), 1).unwrap();
    controller.join(JOIN_TIMEOUT).await;
    let before = controller.lane_counts();
    assert_eq!(before.total(), 8);

    let err = controller.start(Vec::new(), 1).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert_eq!(controller.lane_counts(), before);
    assert_eq!(cameras.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_session_reuses_a_zeroed_store() {
    let bus = PanelBus::new(1);
    let (mut controller, _cameras, _detector) = setup(1, &bus);

    controller.upload(["a.mp4"]);
    assert_eq!(controller.status().borrow().text, UPLOAD_OK);
    controller.analyze().unwrap();
    controller.join(JOIN_TIMEOUT).await;
    assert_eq!(controller.lane_counts().total(), 4);

    controller.analyze().unwrap();
    controller.join(JOIN_TIMEOUT).await;
    assert_eq!(controller.lane_counts().total(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_deadline_keeps_live_workers_attached() {
    let bus = PanelBus::new(1);
    let (mut controller, cameras, _detector) = setup(0, &bus);

    controller.start(sources(&["live"]), 1).unwrap();
    let reports = controller.join(Duration::from_millis(20)).await;

    assert!(reports.is_empty());
    assert!(controller.is_running());
    assert_eq!(controller.active_workers(), 1);

    controller.stop();
    let reports = controller.join(JOIN_TIMEOUT).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stop_reason, StopReason::StopRequested);
    assert!(!controller.is_running());
    assert_eq!(controller.active_workers(), 0);
    assert_eq!(cameras.released.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_failure_is_posted_while_other_streams_run() {
    let bus = PanelBus::new(2);
    let (mut controller, _cameras, _detector) = setup(0, &bus);
    let mut status = controller.status();

    controller.upload(["missing.mp4", "live"]);
    controller.analyze().unwrap();

    let posted = tokio::time::timeout(JOIN_TIMEOUT, status.wait_for(|m| m.level == StatusLevel::Error))
        .await
        .expect("error status before the deadline")
        .expect("controller alive")
        .clone();
    assert!(posted.text.contains("missing.mp4"));
    assert!(controller.is_running());

    controller.stop();
    controller.join(JOIN_TIMEOUT).await;
}
