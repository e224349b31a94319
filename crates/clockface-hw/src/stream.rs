//! Camera stream lifecycle.
//!
//! [`MediaStreamManager`] owns at most one [`CameraSession`]. Acquiring opens
//! the device through a [`CameraBackend`], attaches the stream to a
//! [`VideoSurface`] and starts one capture thread per track. Releasing stops
//! every track and detaches the surface; it also runs on drop.

use crate::frame::Frame;
use crate::surface::VideoSurface;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use uuid::Uuid;

/// Consecutive capture failures after which a track is considered dead.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("camera capture unsupported: {0}")]
    Unsupported(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraErrorKind {
    PermissionDenied,
    DeviceNotFound,
    DeviceBusy,
    Unsupported,
    CaptureFailed,
}

impl CameraError {
    pub fn kind(&self) -> CameraErrorKind {
        match self {
            CameraError::PermissionDenied(_) => CameraErrorKind::PermissionDenied,
            CameraError::DeviceNotFound(_) => CameraErrorKind::DeviceNotFound,
            CameraError::DeviceBusy(_) => CameraErrorKind::DeviceBusy,
            CameraError::Unsupported(_) => CameraErrorKind::Unsupported,
            CameraError::CaptureFailed(_) => CameraErrorKind::CaptureFailed,
        }
    }

    /// Text shown on the kiosk. Camera problems need a person to fix them,
    /// so each message says what to do.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            CameraErrorKind::PermissionDenied => {
                "Could not access camera. Please ensure you've given permission."
            }
            CameraErrorKind::DeviceNotFound => {
                "No camera found. Please connect a camera and try again."
            }
            CameraErrorKind::DeviceBusy => {
                "Camera is in use by another application. Please close other apps using the camera."
            }
            CameraErrorKind::Unsupported => "This device doesn't support camera capture.",
            CameraErrorKind::CaptureFailed => "Error accessing camera stream.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Requested stream shape. Resolution is a preference; the backend may
/// negotiate something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

impl StreamConstraints {
    /// Unattended kiosk: 1280×720, front camera.
    pub fn kiosk() -> Self {
        Self {
            width: 1280,
            height: 720,
            facing: FacingMode::User,
        }
    }

    /// Registration capture: 640×480, front camera.
    pub fn registration() -> Self {
        Self {
            width: 640,
            height: 480,
            facing: FacingMode::User,
        }
    }
}

/// What a track actually delivers after negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSettings {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

/// One hardware video track.
pub trait VideoTrack: Send + 'static {
    fn settings(&self) -> TrackSettings;

    /// Block until the next frame is decoded.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Stop the hardware stream. Called once, from the capture thread.
    fn stop(&mut self);
}

/// Device access. `open` is blocking.
pub trait CameraBackend: Send + Sync {
    fn open(&self, constraints: &StreamConstraints) -> Result<Vec<Box<dyn VideoTrack>>, CameraError>;
}

/// Handle to a running track and its capture thread.
pub struct TrackHandle {
    pub id: Uuid,
    pub settings: TrackSettings,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TrackHandle {
    fn is_live(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn signal(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(track = %self.id, "capture thread panicked");
            }
        }
    }
}

pub struct CameraSession {
    pub id: Uuid,
    pub constraints: StreamConstraints,
    pub started_at: DateTime<Utc>,
    tracks: Vec<TrackHandle>,
    surface: Arc<VideoSurface>,
}

impl CameraSession {
    pub fn is_active(&self) -> bool {
        self.surface.is_attached() && self.tracks.iter().any(TrackHandle::is_live)
    }

    pub fn tracks(&self) -> &[TrackHandle] {
        &self.tracks
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            surface: Arc::clone(&self.surface),
            tracks: self.tracks.iter().map(|t| t.settings.clone()).collect(),
        }
    }
}

/// Cheap summary of the active session handed out by `acquire`.
#[derive(Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub surface: Arc<VideoSurface>,
    pub tracks: Vec<TrackSettings>,
}

pub struct MediaStreamManager {
    backend: Arc<dyn CameraBackend>,
    surface: Arc<VideoSurface>,
    session: Option<CameraSession>,
}

impl MediaStreamManager {
    pub fn new(backend: Arc<dyn CameraBackend>, warmup_frames: usize) -> Self {
        Self {
            backend,
            surface: Arc::new(VideoSurface::new(warmup_frames)),
            session: None,
        }
    }

    /// The surface sessions play into. Stable across sessions.
    pub fn surface(&self) -> Arc<VideoSurface> {
        Arc::clone(&self.surface)
    }

    pub fn session(&self) -> Option<&CameraSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(CameraSession::is_active)
    }

    /// Acquire the camera. Returns the existing session if one is active;
    /// a dead session is released and replaced.
    pub async fn acquire(&mut self, constraints: StreamConstraints) -> Result<SessionInfo, CameraError> {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_active()) {
            tracing::debug!(session = %session.id, "camera session already active");
            return Ok(session.info());
        }
        self.close().await;

        let backend = Arc::clone(&self.backend);
        let tracks = tokio::task::spawn_blocking(move || backend.open(&constraints))
            .await
            .map_err(|e| CameraError::CaptureFailed(format!("camera open task failed: {e}")))??;
        let Some(first) = tracks.first() else {
            return Err(CameraError::Unsupported("device offered no video track".into()));
        };

        let settings = first.settings();
        self.surface.attach(settings.width, settings.height);

        let mut handles = Vec::with_capacity(tracks.len());
        for track in tracks {
            match spawn_playback(track, Arc::clone(&self.surface)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for mut h in handles {
                        h.signal();
                        h.join();
                    }
                    self.surface.detach();
                    return Err(CameraError::CaptureFailed(format!(
                        "failed to start capture thread: {e}"
                    )));
                }
            }
        }

        let session = CameraSession {
            id: Uuid::new_v4(),
            constraints,
            started_at: Utc::now(),
            tracks: handles,
            surface: Arc::clone(&self.surface),
        };
        tracing::info!(
            session = %session.id,
            tracks = session.tracks.len(),
            width = settings.width,
            height = settings.height,
            label = %settings.label,
            "camera session started"
        );
        let info = session.info();
        self.session = Some(session);
        Ok(info)
    }

    /// Stop every track and detach the surface, blocking until the capture
    /// threads exit. No-op without a session.
    pub fn release(&mut self) {
        let Some(mut session) = self.take_session() else {
            return;
        };
        for track in &mut session.tracks {
            track.join();
        }
        tracing::info!(session = %session.id, "camera session released");
    }

    /// Like [`release`](Self::release), but joins the capture threads on the
    /// blocking pool so a capture stuck in the driver cannot stall the
    /// runtime. The surface is detached before this returns.
    pub async fn close(&mut self) {
        let Some(mut session) = self.take_session() else {
            return;
        };
        let id = session.id;
        let tracks = std::mem::take(&mut session.tracks);
        let joined = tokio::task::spawn_blocking(move || {
            for mut track in tracks {
                track.join();
            }
        })
        .await;
        if let Err(e) = joined {
            tracing::warn!(session = %id, error = %e, "capture thread join failed");
        }
        tracing::info!(session = %id, "camera session released");
    }

    /// Signal every track to stop and detach the surface.
    fn take_session(&mut self) -> Option<CameraSession> {
        let session = self.session.take()?;
        for track in &session.tracks {
            track.signal();
        }
        self.surface.detach();
        Some(session)
    }
}

impl Drop for MediaStreamManager {
    fn drop(&mut self) {
        self.release();
    }
}

fn spawn_playback(
    mut track: Box<dyn VideoTrack>,
    surface: Arc<VideoSurface>,
) -> std::io::Result<TrackHandle> {
    let id = Uuid::new_v4();
    let settings = track.settings();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let thread = std::thread::Builder::new()
        .name("clockface-capture".into())
        .spawn(move || {
            tracing::debug!(track = %id, "capture thread started");
            let mut failures = 0u32;
            while !stop_flag.load(Ordering::Acquire) {
                match track.capture() {
                    Ok(frame) => {
                        failures = 0;
                        surface.present(frame);
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(track = %id, error = %e, failures, "frame capture failed");
                        if failures >= MAX_CONSECUTIVE_FAILURES {
                            tracing::error!(track = %id, "track ended after repeated capture failures");
                            surface.end();
                            break;
                        }
                    }
                }
            }
            track.stop();
            tracing::debug!(track = %id, "capture thread exiting");
        })?;

    Ok(TrackHandle {
        id,
        settings,
        stop,
        thread: Some(thread),
    })
}
