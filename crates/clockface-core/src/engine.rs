//! Face detection capability consumed by the kiosk.
//!
//! The inference engine itself lives outside this workspace. The kiosk only
//! needs two things from it: load the named model bundles, and turn a frame
//! into a list of detections with landmarks and descriptors.

use crate::types::FaceDetection;
use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

/// Default minimum detector score.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// The three model bundles that must all be loaded before detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBundle {
    TinyFaceDetector,
    FaceLandmark68,
    FaceRecognition,
}

impl ModelBundle {
    /// Load order.
    pub const ALL: [ModelBundle; 3] = [
        ModelBundle::TinyFaceDetector,
        ModelBundle::FaceLandmark68,
        ModelBundle::FaceRecognition,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelBundle::TinyFaceDetector => "tiny_face_detector",
            ModelBundle::FaceLandmark68 => "face_landmark_68",
            ModelBundle::FaceRecognition => "face_recognition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    pub score_threshold: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelLoadError {
    #[error("failed to load model {bundle}: {reason}")]
    Bundle { bundle: &'static str, reason: String },
    #[error("face engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("models not loaded")]
    ModelsNotLoaded,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid engine output: {0}")]
    InvalidOutput(String),
    #[error("face engine unavailable: {0}")]
    Unavailable(String),
}

/// Opaque detection capability: frame in, faces out.
#[async_trait]
pub trait DetectionEngine: Send + Sync {
    /// Load one named model bundle from `base_path`.
    async fn load_model(&self, bundle: ModelBundle, base_path: &str) -> Result<(), ModelLoadError>;

    /// Detect every face scoring at least `options.score_threshold`.
    async fn detect(
        &self,
        frame: &RgbImage,
        options: &DetectOptions,
    ) -> Result<Vec<FaceDetection>, DetectionError>;
}
