//! Kiosk actor.
//!
//! One task owns the camera, the model set, the detection loop, the status
//! machine and the view. D-Bus handlers talk to it through [`KioskHandle`];
//! spawned work (model loading, timers, loop completions) reports back over
//! an internal channel, so every state change happens on the actor task.

use crate::detection_loop::{
    CycleEnd, DetectionLoop, LoopConfig, LoopEvent, LoopOutput, LoopState, StartResult,
};
use crate::view::StatusView;
use clockface_client::VerificationClient;
use clockface_core::{
    DetectionEngine, Effect, KioskEvent, KioskStateMachine, KioskStatus, ModelLoadError, ModelSet,
    ModelState, StatusDisplay,
};
use clockface_hw::{MediaStreamManager, StreamConstraints};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const CAMERA_STREAM_ERROR: &str = "Error accessing camera stream.";

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("kiosk task exited")]
    ChannelClosed,
}

#[derive(Debug, Clone)]
pub struct KioskSettings {
    pub model_base: String,
    /// Delay before reloading models after a failure.
    pub model_retry: Duration,
    /// How long a verification result stays on screen.
    pub display_window: Duration,
    /// Start detection whenever the kiosk is ready and nothing is shown.
    pub auto_loop: bool,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            model_base: "/hr_attendance_face_recognition/static/models".into(),
            model_retry: Duration::from_secs(3),
            display_window: clockface_core::status::DEFAULT_DISPLAY_WINDOW,
            auto_loop: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    ModelsPending,
    /// Camera could not be acquired; carries the user-facing message.
    CameraUnavailable(String),
}

impl StartOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            StartOutcome::Started => "started",
            StartOutcome::AlreadyRunning => "already_running",
            StartOutcome::ModelsPending => "models_pending",
            StartOutcome::CameraUnavailable(_) => "camera_unavailable",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraInfo {
    pub session: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub ready_state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KioskSnapshot {
    pub status: KioskStatus,
    pub display: StatusDisplay,
    pub loop_state: LoopState,
    pub models: ModelState,
    pub model_attempts: u32,
    pub camera: Option<CameraInfo>,
}

enum KioskRequest {
    StartDetection {
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<KioskSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum KioskMessage {
    Loop(LoopEvent),
    ModelsLoaded(Result<(), ModelLoadError>),
    ModelRetryDue,
    Reset { generation: u64 },
    AutoRestart,
}

/// Clone-safe handle to the kiosk task.
#[derive(Clone)]
pub struct KioskHandle {
    tx: mpsc::Sender<KioskRequest>,
}

impl KioskHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> KioskRequest,
    ) -> Result<T, KioskError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| KioskError::ChannelClosed)?;
        reply_rx.await.map_err(|_| KioskError::ChannelClosed)
    }

    pub async fn start_detection(&self) -> Result<StartOutcome, KioskError> {
        self.request(|reply| KioskRequest::StartDetection { reply }).await
    }

    pub async fn stop(&self) -> Result<(), KioskError> {
        self.request(|reply| KioskRequest::Stop { reply }).await
    }

    pub async fn snapshot(&self) -> Result<KioskSnapshot, KioskError> {
        self.request(|reply| KioskRequest::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), KioskError> {
        self.request(|reply| KioskRequest::Shutdown { reply }).await
    }
}

struct Timers {
    model_retry: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
    restart: Option<JoinHandle<()>>,
    model_load: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        for slot in [
            &mut self.model_retry,
            &mut self.reset,
            &mut self.restart,
            &mut self.model_load,
        ] {
            abort(slot);
        }
    }
}

fn abort(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

struct Kiosk {
    settings: KioskSettings,
    stream: MediaStreamManager,
    models: ModelSet,
    engine: Arc<dyn DetectionEngine>,
    detection: DetectionLoop,
    status: KioskStateMachine,
    view: Box<dyn StatusView>,
    events: mpsc::UnboundedSender<KioskMessage>,
    timers: Timers,
    /// Operator stopped detection; auto-loop stays off until the next start.
    paused: bool,
}

/// Spawn the kiosk actor on the current runtime.
///
/// Acquires the camera, then starts loading models. Camera failure is not
/// fatal: the kiosk stays up showing the camera error.
pub fn spawn_kiosk(
    settings: KioskSettings,
    stream: MediaStreamManager,
    engine: Arc<dyn DetectionEngine>,
    verifier: VerificationClient,
    loop_config: LoopConfig,
    view: Box<dyn StatusView>,
) -> (KioskHandle, JoinHandle<()>) {
    let (req_tx, req_rx) = mpsc::channel(16);
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();

    let loop_tx = ev_tx.clone();
    let detection = DetectionLoop::new(
        Arc::clone(&engine),
        verifier,
        loop_config,
        Arc::new(move |event: LoopEvent| {
            let _ = loop_tx.send(KioskMessage::Loop(event));
        }),
    );

    let kiosk = Kiosk {
        models: ModelSet::new(settings.model_base.clone()),
        status: KioskStateMachine::new(settings.display_window),
        settings,
        stream,
        engine,
        detection,
        view,
        events: ev_tx,
        timers: Timers {
            model_retry: None,
            reset: None,
            restart: None,
            model_load: None,
        },
        paused: false,
    };
    let task = tokio::spawn(kiosk.run(req_rx, ev_rx));
    (KioskHandle { tx: req_tx }, task)
}

impl Kiosk {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<KioskRequest>,
        mut events: mpsc::UnboundedReceiver<KioskMessage>,
    ) {
        self.view.show(&self.status.status().display());
        self.acquire_camera().await;
        self.begin_model_load();
        tracing::info!("kiosk ready");

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    if self.on_request(request).await {
                        break;
                    }
                }
                Some(message) = events.recv() => self.on_message(message),
            }
        }

        self.teardown().await;
        tracing::info!("kiosk stopped");
    }

    /// Returns true on shutdown.
    async fn on_request(&mut self, request: KioskRequest) -> bool {
        match request {
            KioskRequest::StartDetection { reply } => {
                self.paused = false;
                let outcome = self.start_detection().await;
                tracing::info!(outcome = outcome.as_str(), "start detection requested");
                let _ = reply.send(outcome);
            }
            KioskRequest::Stop { reply } => {
                tracing::info!("stop requested");
                self.paused = true;
                self.detection.stop();
                abort(&mut self.timers.restart);
                abort(&mut self.timers.reset);
                self.apply(KioskEvent::Stopped);
                let _ = reply.send(());
            }
            KioskRequest::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            KioskRequest::Shutdown { reply } => {
                tracing::info!("shutdown requested");
                self.teardown().await;
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn on_message(&mut self, message: KioskMessage) {
        match message {
            KioskMessage::Loop(event) => {
                let mut out = Vec::new();
                self.detection.handle(event, &mut out);
                self.process(out);
            }
            KioskMessage::ModelsLoaded(result) => {
                self.timers.model_load = None;
                self.models.complete(&result);
                match result {
                    Ok(()) => {
                        tracing::info!(attempts = self.models.attempts(), "face detection models ready");
                        self.apply(KioskEvent::ModelLoadSucceeded);
                        let mut out = Vec::new();
                        self.detection.models_ready(&mut out);
                        self.process(out);
                        self.auto_start();
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            retry_in_secs = self.settings.model_retry.as_secs_f32(),
                            "model load failed"
                        );
                        self.apply(KioskEvent::ModelLoadFailed {
                            reason: e.to_string(),
                        });
                        self.timers.model_retry =
                            Some(self.schedule(self.settings.model_retry, KioskMessage::ModelRetryDue));
                    }
                }
            }
            KioskMessage::ModelRetryDue => {
                self.timers.model_retry = None;
                self.begin_model_load();
            }
            KioskMessage::Reset { generation } => {
                self.apply(KioskEvent::Reset { generation });
                self.auto_start();
            }
            KioskMessage::AutoRestart => {
                self.timers.restart = None;
                self.auto_start();
            }
        }
    }

    async fn acquire_camera(&mut self) -> bool {
        match self.stream.acquire(StreamConstraints::kiosk()).await {
            Ok(info) => {
                self.detection.set_surface(Some(info.surface));
                self.apply(KioskEvent::StreamStarted);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "camera unavailable");
                self.detection.set_surface(None);
                self.apply(KioskEvent::CameraFailed {
                    message: e.user_message().to_string(),
                });
                false
            }
        }
    }

    fn begin_model_load(&mut self) {
        if !self.models.begin() {
            return;
        }
        self.apply(KioskEvent::ModelLoadStarted);
        let engine = Arc::clone(&self.engine);
        let base = self.models.base_path().to_string();
        let tx = self.events.clone();
        self.timers.model_load = Some(tokio::spawn(async move {
            let result = ModelSet::load_all(engine.as_ref(), &base).await;
            let _ = tx.send(KioskMessage::ModelsLoaded(result));
        }));
    }

    /// Operator start. Reopens the camera if the session is gone.
    async fn start_detection(&mut self) -> StartOutcome {
        if !self.stream.is_active() && !self.acquire_camera().await {
            let message = match self.status.status() {
                KioskStatus::Error { message } => message.clone(),
                _ => CAMERA_STREAM_ERROR.to_string(),
            };
            return StartOutcome::CameraUnavailable(message);
        }
        abort(&mut self.timers.restart);
        let mut out = Vec::new();
        let result = self.detection.start(self.models.is_loaded(), &mut out);
        self.process(out);
        match result {
            StartResult::Started => StartOutcome::Started,
            StartResult::AlreadyRunning => StartOutcome::AlreadyRunning,
            StartResult::AwaitingModels => StartOutcome::ModelsPending,
        }
    }

    /// Auto-loop policy: start detection when everything is ready and no
    /// result is on screen.
    fn auto_start(&mut self) {
        if !self.settings.auto_loop
            || self.paused
            || !self.models.is_loaded()
            || !self.stream.is_active()
            || self.status.is_displaying_result()
            || !matches!(self.detection.state(), LoopState::Idle | LoopState::Ready)
        {
            return;
        }
        tracing::debug!("auto-loop starting detection");
        abort(&mut self.timers.restart);
        let mut out = Vec::new();
        self.detection.start(true, &mut out);
        self.process(out);
    }

    fn process(&mut self, outputs: Vec<LoopOutput>) {
        for output in outputs {
            match output {
                LoopOutput::Status(event) => self.apply(event),
                LoopOutput::DrawDetections {
                    detections,
                    frame_size,
                } => {
                    if !self.status.is_displaying_result() {
                        self.view.draw_detections(&detections, frame_size);
                    }
                }
                LoopOutput::ClearOverlay => {
                    if !self.status.is_displaying_result() {
                        self.view.clear_overlay();
                    }
                }
                LoopOutput::ModelsLost => {
                    self.models.invalidate();
                    self.begin_model_load();
                }
                LoopOutput::CycleEnded(end) => {
                    tracing::info!(end = ?end, "detection cycle finished");
                    if end == CycleEnd::Failed && self.settings.auto_loop && !self.paused {
                        abort(&mut self.timers.restart);
                        self.timers.restart = Some(
                            self.schedule(self.settings.display_window, KioskMessage::AutoRestart),
                        );
                    }
                }
            }
        }
    }

    fn apply(&mut self, event: KioskEvent) {
        let transition = self.status.apply(event);
        for effect in transition.effects {
            match effect {
                Effect::ClearOverlay => self.view.clear_overlay(),
                Effect::ScheduleReset { after, generation } => {
                    abort(&mut self.timers.reset);
                    self.timers.reset = Some(self.schedule(after, KioskMessage::Reset { generation }));
                }
            }
        }
        if transition.changed {
            self.view.show(&self.status.status().display());
        }
    }

    fn schedule(&self, after: Duration, message: KioskMessage) -> JoinHandle<()> {
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(message);
        })
    }

    fn snapshot(&self) -> KioskSnapshot {
        let status = self.status.status().clone();
        let camera = self.stream.session().filter(|_| self.stream.is_active()).map(|s| {
            let surface = self.stream.surface();
            let (width, height) = surface.dimensions();
            CameraInfo {
                session: s.id.to_string(),
                label: s
                    .tracks()
                    .first()
                    .map(|t| t.settings.label.clone())
                    .unwrap_or_default(),
                width,
                height,
                ready_state: format!("{:?}", surface.ready_state()),
            }
        });
        KioskSnapshot {
            display: status.display(),
            status,
            loop_state: self.detection.state(),
            models: self.models.state().clone(),
            model_attempts: self.models.attempts(),
            camera,
        }
    }

    async fn teardown(&mut self) {
        self.detection.stop();
        self.timers.abort_all();
        self.detection.set_surface(None);
        if self.stream.session().is_some() {
            self.stream.close().await;
            self.apply(KioskEvent::StreamStopped);
        }
    }
}
