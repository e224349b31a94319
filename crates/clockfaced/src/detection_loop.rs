//! The capture → detect → verify loop.
//!
//! `DetectionLoop` is driven by the kiosk actor. Work that suspends (a
//! detection pass, a verification attempt, a delayed re-pass) runs as a
//! spawned task that reports back through the [`LoopSink`] tagged with the
//! loop generation it was started under. `stop()` bumps the generation, so
//! anything still in flight is discarded on arrival.

use clockface_client::{
    VerificationAttempt, VerificationClient, VerificationError, VerificationEvent,
    VerificationOutcome,
};
use clockface_core::policy::{self, DetectionWarning, FaceCount};
use clockface_core::{DetectOptions, DetectionEngine, DetectionError, FaceDetection, KioskEvent};
use clockface_hw::{ReadyState, VideoSurface};
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const CAMERA_STREAM_ERROR: &str = "Error accessing camera stream.";
const DETECTION_ERROR: &str = "Error during face detection. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    AwaitingModels,
    Ready,
    Detecting,
    Verifying,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub detect: DetectOptions,
    /// Delay before the first pass and after a zero/multi face pass.
    pub repass_delay: Duration,
    /// Delay when the surface has not decoded enough frames yet.
    pub readiness_delay: Duration,
    pub snapshot_quality: u8,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            detect: DetectOptions::default(),
            repass_delay: Duration::from_millis(500),
            readiness_delay: Duration::from_millis(300),
            snapshot_quality: 80,
        }
    }
}

/// Completions delivered back to the loop.
#[derive(Debug)]
pub enum LoopEvent {
    PassDue {
        generation: u64,
    },
    PassCompleted {
        generation: u64,
        frame: RgbImage,
        result: Result<Vec<FaceDetection>, DetectionError>,
    },
    Verification {
        generation: u64,
        event: VerificationEvent,
    },
}

pub type LoopSink = Arc<dyn Fn(LoopEvent) + Send + Sync>;

/// How a detect→verify cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    Matched,
    NoMatch,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutput {
    Status(KioskEvent),
    DrawDetections {
        detections: Vec<FaceDetection>,
        frame_size: (u32, u32),
    },
    ClearOverlay,
    CycleEnded(CycleEnd),
    /// The engine no longer has its models. The loop waits in
    /// `AwaitingModels` and resumes detecting once they are reloaded.
    ModelsLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartResult {
    Started,
    AlreadyRunning,
    AwaitingModels,
}

pub struct DetectionLoop {
    state: LoopState,
    generation: u64,
    /// Generation of the detection pass currently running, if any.
    pass_inflight: Option<u64>,
    /// A pass became due while a stale one was still running.
    pass_wanted: bool,
    /// Start requested while models were loading.
    start_pending: bool,
    timer: Option<JoinHandle<()>>,
    engine: Arc<dyn DetectionEngine>,
    verifier: VerificationClient,
    surface: Option<Arc<VideoSurface>>,
    config: LoopConfig,
    sink: LoopSink,
}

impl DetectionLoop {
    pub fn new(
        engine: Arc<dyn DetectionEngine>,
        verifier: VerificationClient,
        config: LoopConfig,
        sink: LoopSink,
    ) -> Self {
        Self {
            state: LoopState::Idle,
            generation: 0,
            pass_inflight: None,
            pass_wanted: false,
            start_pending: false,
            timer: None,
            engine,
            verifier,
            surface: None,
            config,
            sink,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Surface frames are read from. `None` while no camera session exists.
    pub fn set_surface(&mut self, surface: Option<Arc<VideoSurface>>) {
        self.surface = surface;
    }

    /// Request a detection cycle.
    pub fn start(&mut self, models_loaded: bool, out: &mut Vec<LoopOutput>) -> StartResult {
        match self.state {
            LoopState::Detecting | LoopState::Verifying => {
                tracing::debug!(state = ?self.state, "detection already running");
                StartResult::AlreadyRunning
            }
            LoopState::AwaitingModels => {
                self.start_pending = true;
                StartResult::AwaitingModels
            }
            LoopState::Idle if !models_loaded => {
                self.set_state(LoopState::AwaitingModels);
                self.start_pending = true;
                StartResult::AwaitingModels
            }
            LoopState::Idle | LoopState::Ready => {
                self.set_state(LoopState::Ready);
                self.begin_detecting(out);
                StartResult::Started
            }
        }
    }

    /// All model bundles finished loading.
    pub fn models_ready(&mut self, out: &mut Vec<LoopOutput>) {
        if self.state == LoopState::AwaitingModels {
            self.set_state(LoopState::Ready);
            if std::mem::take(&mut self.start_pending) {
                self.begin_detecting(out);
            }
        }
    }

    /// Force `Idle` from any state. In-flight work is discarded on arrival.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.abort_timer();
        self.verifier.cancel();
        self.start_pending = false;
        self.pass_wanted = false;
        if self.state != LoopState::Idle {
            self.set_state(LoopState::Idle);
        }
    }

    pub fn handle(&mut self, event: LoopEvent, out: &mut Vec<LoopOutput>) {
        match event {
            LoopEvent::PassDue { generation } => {
                if self.is_live(generation, LoopState::Detecting) {
                    self.run_pass(out);
                }
            }
            LoopEvent::PassCompleted {
                generation,
                frame,
                result,
            } => {
                if self.pass_inflight == Some(generation) {
                    self.pass_inflight = None;
                }
                if !self.is_live(generation, LoopState::Detecting) {
                    tracing::debug!(generation, current = self.generation, "discarding stale detection pass");
                    if std::mem::take(&mut self.pass_wanted) && self.state == LoopState::Detecting {
                        self.run_pass(out);
                    }
                    return;
                }
                self.evaluate(frame, result, out);
            }
            LoopEvent::Verification { generation, event } => {
                if !self.is_live(generation, LoopState::Verifying) {
                    tracing::debug!(generation, current = self.generation, "discarding stale verification event");
                    return;
                }
                self.on_verification(event, out);
            }
        }
    }

    fn is_live(&self, generation: u64, expected: LoopState) -> bool {
        generation == self.generation && self.state == expected
    }

    fn set_state(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, generation = self.generation, "detection loop");
        self.state = next;
    }

    fn begin_detecting(&mut self, out: &mut Vec<LoopOutput>) {
        self.generation += 1;
        self.set_state(LoopState::Detecting);
        out.push(LoopOutput::Status(KioskEvent::DetectionStarted));
        // Give playback a moment before the first pass.
        self.schedule_pass(self.config.repass_delay);
    }

    fn schedule_pass(&mut self, after: Duration) {
        self.abort_timer();
        let sink = Arc::clone(&self.sink);
        let generation = self.generation;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            sink(LoopEvent::PassDue { generation });
        }));
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Return to `Ready` after a terminal branch of the cycle.
    fn end_cycle(&mut self, end: CycleEnd, out: &mut Vec<LoopOutput>) {
        self.abort_timer();
        self.set_state(LoopState::Ready);
        out.push(LoopOutput::CycleEnded(end));
    }

    fn fail(&mut self, message: &str, out: &mut Vec<LoopOutput>) {
        out.push(LoopOutput::Status(KioskEvent::DetectionFailed {
            message: message.to_string(),
        }));
        out.push(LoopOutput::ClearOverlay);
        self.end_cycle(CycleEnd::Failed, out);
    }

    fn run_pass(&mut self, out: &mut Vec<LoopOutput>) {
        if self.pass_inflight.is_some() {
            self.pass_wanted = true;
            return;
        }
        let Some(surface) = self.surface.clone().filter(|s| s.is_attached()) else {
            tracing::warn!("no playing camera stream");
            self.fail(CAMERA_STREAM_ERROR, out);
            return;
        };
        let ready = surface.ready_state();
        if ready < ReadyState::HaveEnoughData {
            tracing::debug!(ready = ?ready, "video surface not ready, deferring pass");
            self.schedule_pass(self.config.readiness_delay);
            return;
        }
        let Some(frame) = surface.current_frame().and_then(|f| f.to_rgb_image()) else {
            self.schedule_pass(self.config.readiness_delay);
            return;
        };

        let generation = self.generation;
        let engine = Arc::clone(&self.engine);
        let options = self.config.detect;
        let sink = Arc::clone(&self.sink);
        self.pass_inflight = Some(generation);
        tokio::spawn(async move {
            let result = engine.detect(&frame, &options).await;
            sink(LoopEvent::PassCompleted {
                generation,
                frame,
                result,
            });
        });
    }

    fn evaluate(
        &mut self,
        frame: RgbImage,
        result: Result<Vec<FaceDetection>, DetectionError>,
        out: &mut Vec<LoopOutput>,
    ) {
        let detections = match result {
            Ok(d) => d,
            Err(DetectionError::ModelsNotLoaded) => {
                tracing::warn!("face engine lost its models, waiting for reload");
                self.abort_timer();
                self.set_state(LoopState::AwaitingModels);
                self.start_pending = true;
                out.push(LoopOutput::ModelsLost);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "face detection failed");
                self.fail(DETECTION_ERROR, out);
                return;
            }
        };
        let frame_size = frame.dimensions();
        out.push(LoopOutput::DrawDetections {
            detections: detections.clone(),
            frame_size,
        });

        let face = match policy::classify(&detections) {
            FaceCount::None => {
                self.warn(DetectionWarning::NoFace, out);
                return;
            }
            FaceCount::Multiple(count) => {
                tracing::debug!(count, "multiple faces in frame");
                self.warn(DetectionWarning::MultipleFaces, out);
                return;
            }
            FaceCount::Single(face) => face,
        };

        let attempt = match VerificationAttempt::encode(
            &face.descriptor,
            Some(&frame),
            self.config.snapshot_quality,
        ) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode face for verification");
                self.fail(DETECTION_ERROR, out);
                return;
            }
        };

        self.set_state(LoopState::Verifying);
        out.push(LoopOutput::Status(KioskEvent::VerificationStarted));
        let sink = Arc::clone(&self.sink);
        let generation = self.generation;
        let id = self.verifier.submit(
            attempt,
            Arc::new(move |event: VerificationEvent| {
                sink(LoopEvent::Verification { generation, event })
            }),
        );
        tracing::info!(attempt = %id, score = face.bounding_box.score, "single face found, verifying");
    }

    fn warn(&mut self, warning: DetectionWarning, out: &mut Vec<LoopOutput>) {
        out.push(LoopOutput::Status(KioskEvent::DetectionWarning(warning)));
        self.schedule_pass(self.config.repass_delay);
    }

    fn on_verification(&mut self, event: VerificationEvent, out: &mut Vec<LoopOutput>) {
        match event {
            VerificationEvent::Retrying {
                retry, max_retries, ..
            } => {
                out.push(LoopOutput::Status(KioskEvent::VerificationRetrying {
                    retry,
                    max_retries,
                }));
            }
            VerificationEvent::Finished { result, .. } => {
                let (status, end) = match result {
                    Ok(VerificationOutcome::Success(report)) => {
                        (KioskEvent::VerificationSucceeded(report), CycleEnd::Matched)
                    }
                    Ok(VerificationOutcome::NoMatch(report)) => {
                        (KioskEvent::VerificationFailed(report), CycleEnd::NoMatch)
                    }
                    Err(VerificationError::NetworkExhausted { .. }) => {
                        (KioskEvent::VerificationExhausted, CycleEnd::Failed)
                    }
                    Err(e @ (VerificationError::Rejected(_) | VerificationError::Protocol(_))) => (
                        KioskEvent::VerificationRejected {
                            reason: e.to_string(),
                        },
                        CycleEnd::Failed,
                    ),
                };
                out.push(LoopOutput::Status(status));
                self.end_cycle(end, out);
            }
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.abort_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_in, no_match, rgb_frame, FakeEngine, FakeTransport};
    use clockface_client::{RetryPolicy, TransportError};
    use tokio::sync::{mpsc, Semaphore};
    use tokio::time::{timeout, Instant};

    struct Harness {
        dl: DetectionLoop,
        rx: mpsc::UnboundedReceiver<LoopEvent>,
        surface: Arc<VideoSurface>,
        engine: Arc<FakeEngine>,
        transport: Arc<FakeTransport>,
    }

    impl Harness {
        fn new(engine: FakeEngine, replies: Vec<Result<clockface_client::VerifyResponse, TransportError>>) -> Self {
            let engine = Arc::new(engine);
            let transport = Arc::new(FakeTransport::new(replies));
            let verifier = VerificationClient::new(transport.clone(), RetryPolicy::default());
            let (tx, rx) = mpsc::unbounded_channel();
            let sink: LoopSink = Arc::new(move |event: LoopEvent| {
                let _ = tx.send(event);
            });
            let mut dl = DetectionLoop::new(engine.clone(), verifier, LoopConfig::default(), sink);
            let surface = Arc::new(VideoSurface::new(0));
            surface.attach(8, 6);
            surface.present(rgb_frame(1));
            dl.set_surface(Some(surface.clone()));
            Self {
                dl,
                rx,
                surface,
                engine,
                transport,
            }
        }

        fn start(&mut self) -> Vec<LoopOutput> {
            let mut out = Vec::new();
            assert_eq!(self.dl.start(true, &mut out), StartResult::Started);
            out
        }

        /// Feed the next completion into the loop.
        async fn step(&mut self) -> Vec<LoopOutput> {
            let event = self.rx.recv().await.expect("sink dropped");
            let mut out = Vec::new();
            self.dl.handle(event, &mut out);
            out
        }

        async fn quiet(&mut self) -> bool {
            timeout(Duration::from_secs(30), self.rx.recv()).await.is_err()
        }
    }

    fn status(event: KioskEvent) -> LoopOutput {
        LoopOutput::Status(event)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_pass_runs_after_repass_delay() {
        let mut h = Harness::new(FakeEngine::new(0), vec![]);
        assert_eq!(h.start(), vec![status(KioskEvent::DetectionStarted)]);
        assert_eq!(h.dl.state(), LoopState::Detecting);

        let t0 = Instant::now();
        assert!(h.step().await.is_empty());
        assert_eq!(t0.elapsed(), Duration::from_millis(500));
        assert_eq!(h.engine.detect_count(), 0);
        h.step().await;
        assert_eq!(h.engine.detect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_faces_warns_and_repasses() {
        let mut h = Harness::new(FakeEngine::new(2), vec![]);
        h.start();
        h.step().await;

        let out = h.step().await;
        assert_eq!(out.len(), 2);
        match &out[0] {
            LoopOutput::DrawDetections {
                detections,
                frame_size,
            } => {
                assert_eq!(detections.len(), 2);
                assert_eq!(*frame_size, (8, 6));
            }
            other => panic!("expected overlay draw, got {other:?}"),
        }
        assert_eq!(
            out[1],
            status(KioskEvent::DetectionWarning(DetectionWarning::MultipleFaces))
        );
        assert_eq!(h.dl.state(), LoopState::Detecting);

        let t0 = Instant::now();
        h.step().await;
        assert_eq!(t0.elapsed(), Duration::from_millis(500));
        h.step().await;
        assert_eq!(h.engine.detect_count(), 2);
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_face_warns() {
        let mut h = Harness::new(FakeEngine::new(0), vec![]);
        h.start();
        h.step().await;
        let out = h.step().await;
        assert_eq!(
            out.last(),
            Some(&status(KioskEvent::DetectionWarning(DetectionWarning::NoFace)))
        );
        assert_eq!(h.dl.state(), LoopState::Detecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_face_verifies_and_returns_to_ready() {
        let mut h = Harness::new(FakeEngine::new(1), vec![Ok(check_in("Ada Lovelace", 92.5))]);
        h.start();
        h.step().await;

        let out = h.step().await;
        assert_eq!(out.last(), Some(&status(KioskEvent::VerificationStarted)));
        assert_eq!(h.dl.state(), LoopState::Verifying);

        let out = h.step().await;
        match &out[0] {
            LoopOutput::Status(KioskEvent::VerificationSucceeded(report)) => {
                assert_eq!(report.employee_name, "Ada Lovelace");
                assert_eq!(report.confidence, Some(92.5));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(out[1], LoopOutput::CycleEnded(CycleEnd::Matched));
        assert_eq!(h.dl.state(), LoopState::Ready);
        assert_eq!(h.transport.call_count(), 1);
        assert!(h.quiet().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_match_is_not_retried() {
        let mut h = Harness::new(FakeEngine::new(1), vec![Ok(no_match())]);
        h.start();
        h.step().await;
        h.step().await;
        let out = h.step().await;
        match &out[0] {
            LoopOutput::Status(KioskEvent::VerificationFailed(report)) => {
                assert_eq!(report.message, "No matching employee found");
                assert_eq!(report.confidence, Some(12.5));
            }
            other => panic!("expected no-match, got {other:?}"),
        }
        assert_eq!(out[1], LoopOutput::CycleEnded(CycleEnd::NoMatch));
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_end_cycle() {
        let mut h = Harness::new(FakeEngine::new(1), vec![]);
        h.start();
        h.step().await;
        h.step().await;

        for retry in 1..=3 {
            assert_eq!(
                h.step().await,
                vec![status(KioskEvent::VerificationRetrying {
                    retry,
                    max_retries: 3
                })]
            );
            assert_eq!(h.dl.state(), LoopState::Verifying);
        }
        assert_eq!(
            h.step().await,
            vec![
                status(KioskEvent::VerificationExhausted),
                LoopOutput::CycleEnded(CycleEnd::Failed)
            ]
        );
        assert_eq!(h.transport.call_count(), 4);
        assert_eq!(h.dl.state(), LoopState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_ends_cycle() {
        let mut h = Harness::new(FakeEngine::new(1), vec![Err(TransportError::Status(404))]);
        h.start();
        h.step().await;
        h.step().await;
        let out = h.step().await;
        assert!(matches!(
            &out[0],
            LoopOutput::Status(KioskEvent::VerificationRejected { .. })
        ));
        assert_eq!(out[1], LoopOutput::CycleEnded(CycleEnd::Failed));
        assert_eq!(h.transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_error_fails_cycle() {
        let engine = FakeEngine::scripted(
            vec![Err(DetectionError::InferenceFailed("backend crashed".into()))],
            0,
        );
        let mut h = Harness::new(engine, vec![]);
        h.start();
        h.step().await;
        assert_eq!(
            h.step().await,
            vec![
                status(KioskEvent::DetectionFailed {
                    message: DETECTION_ERROR.into()
                }),
                LoopOutput::ClearOverlay,
                LoopOutput::CycleEnded(CycleEnd::Failed),
            ]
        );
        assert_eq!(h.dl.state(), LoopState::Ready);
        assert!(h.quiet().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_models_wait_for_reload() {
        let engine = FakeEngine::scripted(vec![Err(DetectionError::ModelsNotLoaded)], 0);
        let mut h = Harness::new(engine, vec![]);
        h.start();
        h.step().await;
        assert_eq!(h.step().await, vec![LoopOutput::ModelsLost]);
        assert_eq!(h.dl.state(), LoopState::AwaitingModels);
        assert!(h.quiet().await);

        let mut out = Vec::new();
        h.dl.models_ready(&mut out);
        assert_eq!(out, vec![status(KioskEvent::DetectionStarted)]);
        h.step().await;
        h.step().await;
        assert_eq!(h.engine.detect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_stream_fails_cycle() {
        let mut h = Harness::new(FakeEngine::new(1), vec![]);
        h.start();
        h.surface.end();
        assert_eq!(
            h.step().await,
            vec![
                status(KioskEvent::DetectionFailed {
                    message: CAMERA_STREAM_ERROR.into()
                }),
                LoopOutput::ClearOverlay,
                LoopOutput::CycleEnded(CycleEnd::Failed),
            ]
        );
        assert_eq!(h.engine.detect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_waits_for_enough_data() {
        let mut h = Harness::new(FakeEngine::new(0), vec![]);
        h.surface.attach(8, 6);
        h.start();

        assert!(h.step().await.is_empty());
        assert_eq!(h.engine.detect_count(), 0);

        h.surface.present(rgb_frame(2));
        let t0 = Instant::now();
        assert!(h.step().await.is_empty());
        assert_eq!(t0.elapsed(), Duration::from_millis(300));
        h.step().await;
        assert_eq!(h.engine.detect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let mut h = Harness::new(FakeEngine::new(0), vec![]);
        h.start();
        let mut out = Vec::new();
        assert_eq!(h.dl.start(true, &mut out), StartResult::AlreadyRunning);
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_models_waits_for_them() {
        let mut h = Harness::new(FakeEngine::new(0), vec![]);
        let mut out = Vec::new();
        assert_eq!(h.dl.start(false, &mut out), StartResult::AwaitingModels);
        assert!(out.is_empty());
        assert_eq!(h.dl.state(), LoopState::AwaitingModels);
        assert!(h.quiet().await);

        h.dl.models_ready(&mut out);
        assert_eq!(out, vec![status(KioskEvent::DetectionStarted)]);
        assert_eq!(h.dl.state(), LoopState::Detecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_inflight_pass_and_blocks_overlap() {
        let gate = Arc::new(Semaphore::new(0));
        let mut engine = FakeEngine::new(1);
        engine.gate = Some(gate.clone());
        let mut h = Harness::new(engine, vec![]);
        h.start();
        h.step().await;

        h.dl.stop();
        assert_eq!(h.dl.state(), LoopState::Idle);

        // Restart while the stale pass is still running: the new pass waits.
        h.start();
        assert!(h.step().await.is_empty());
        assert_eq!(h.engine.detect_count(), 1);

        gate.add_permits(2);
        assert!(h.step().await.is_empty());
        let out = h.step().await;
        assert_eq!(out.last(), Some(&status(KioskEvent::VerificationStarted)));
        assert_eq!(h.engine.detect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_verification_discards_result() {
        let mut h = Harness::new(FakeEngine::new(1), vec![]);
        h.start();
        h.step().await;
        h.step().await;
        assert_eq!(h.dl.state(), LoopState::Verifying);
        assert!(matches!(
            h.step().await[..],
            [LoopOutput::Status(KioskEvent::VerificationRetrying { retry: 1, .. })]
        ));

        h.dl.stop();
        assert!(h.quiet().await);
        assert_eq!(h.dl.state(), LoopState::Idle);
        assert_eq!(h.transport.call_count(), 1);
    }
}
