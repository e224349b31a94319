//! In-process fakes for the kiosk's collaborators.

use crate::view::StatusView;
use async_trait::async_trait;
use clockface_client::{FaceData, TransportError, VerificationTransport, VerifyResponse};
use clockface_core::{
    BoundingBox, DetectOptions, DetectionEngine, DetectionError, Descriptor, FaceDetection,
    ModelBundle, ModelLoadError, StatusDisplay, DESCRIPTOR_LEN,
};
use clockface_hw::{CameraBackend, CameraError, Frame, StreamConstraints, TrackSettings, VideoTrack};
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn face(x: f32) -> FaceDetection {
    FaceDetection {
        bounding_box: BoundingBox { x, y: 10.0, width: 40.0, height: 40.0, score: 0.9 },
        landmarks: vec![],
        descriptor: Descriptor::new(vec![0.05; DESCRIPTOR_LEN]).unwrap(),
    }
}

pub fn faces(n: usize) -> Vec<FaceDetection> {
    (0..n).map(|i| face(10.0 + 50.0 * i as f32)).collect()
}

/// Detection engine with scripted results. Once the script runs out every
/// pass returns `fallback` faces.
pub struct FakeEngine {
    script: Mutex<VecDeque<Result<Vec<FaceDetection>, DetectionError>>>,
    fallback: usize,
    pub load_failures: AtomicU32,
    pub loads: AtomicUsize,
    pub detects: AtomicUsize,
    /// When set, each pass waits for a permit before returning.
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeEngine {
    pub fn new(fallback: usize) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            load_failures: AtomicU32::new(0),
            loads: AtomicUsize::new(0),
            detects: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn scripted(results: Vec<Result<Vec<FaceDetection>, DetectionError>>, fallback: usize) -> Self {
        let engine = Self::new(fallback);
        *engine.script.lock().unwrap() = results.into();
        engine
    }

    pub fn detect_count(&self) -> usize {
        self.detects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionEngine for FakeEngine {
    async fn load_model(&self, bundle: ModelBundle, _base_path: &str) -> Result<(), ModelLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.load_failures.load(Ordering::SeqCst);
        if remaining > 0 && bundle == ModelBundle::TinyFaceDetector {
            self.load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ModelLoadError::Bundle {
                bundle: bundle.name(),
                reason: "HTTP 404".into(),
            });
        }
        Ok(())
    }

    async fn detect(
        &self,
        _frame: &RgbImage,
        _options: &DetectOptions,
    ) -> Result<Vec<FaceDetection>, DetectionError> {
        self.detects.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(faces(self.fallback)))
    }
}

/// Verification transport with scripted replies; defaults to a network error.
pub struct FakeTransport {
    replies: Mutex<VecDeque<Result<VerifyResponse, TransportError>>>,
    pub calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(replies: Vec<Result<VerifyResponse, TransportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationTransport for FakeTransport {
    async fn verify(&self, _face: &FaceData) -> Result<VerifyResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or(Err(TransportError::Network("connection refused".into())))
    }
}

pub fn check_in(name: &str, confidence: f64) -> VerifyResponse {
    VerifyResponse {
        success: true,
        action: Some("check_in".into()),
        name: Some(name.into()),
        confidence: Some(confidence),
        ..Default::default()
    }
}

pub fn no_match() -> VerifyResponse {
    VerifyResponse {
        success: false,
        message: Some("No matching employee found".into()),
        confidence: Some(12.5),
        ..Default::default()
    }
}

pub fn rgb_frame(seq: u32) -> Frame {
    Frame::new(vec![120; 8 * 6 * 3], 8, 6, seq)
}

struct FakeTrack {
    seq: u32,
}

impl VideoTrack for FakeTrack {
    fn settings(&self) -> TrackSettings {
        TrackSettings {
            label: "Fake Camera".into(),
            width: 8,
            height: 6,
        }
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        std::thread::sleep(Duration::from_millis(1));
        self.seq += 1;
        Ok(rgb_frame(self.seq))
    }

    fn stop(&mut self) {}
}

/// Camera backend that either fails with `error` or opens one fake track.
pub struct FakeCamera {
    pub error: Option<CameraError>,
    pub opens: AtomicUsize,
}

impl FakeCamera {
    pub fn working() -> Self {
        Self {
            error: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CameraError) -> Self {
        Self {
            error: Some(error),
            opens: AtomicUsize::new(0),
        }
    }
}

impl CameraBackend for FakeCamera {
    fn open(&self, _c: &StreamConstraints) -> Result<Vec<Box<dyn VideoTrack>>, CameraError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(vec![Box::new(FakeTrack { seq: 0 })]),
        }
    }
}

#[derive(Default)]
pub struct ViewLog {
    pub shown: Vec<StatusDisplay>,
    pub draws: usize,
    pub clears: usize,
}

/// View that records everything it is asked to render.
#[derive(Clone, Default)]
pub struct RecordingView(pub Arc<Mutex<ViewLog>>);

impl StatusView for RecordingView {
    fn show(&mut self, display: &StatusDisplay) {
        self.0.lock().unwrap().shown.push(display.clone());
    }

    fn draw_detections(&mut self, _detections: &[FaceDetection], _frame_size: (u32, u32)) {
        self.0.lock().unwrap().draws += 1;
    }

    fn clear_overlay(&mut self) {
        self.0.lock().unwrap().clears += 1;
    }
}
