//! One-shot face capture for employee registration.
//!
//! Same detect → encode contract as the kiosk, without a loop or retries:
//! a single user-initiated pass whose encoded descriptor is kept until it is
//! saved elsewhere or discarded with [`RegistrationCapture::retry`].

use crate::encoding::{encode_descriptor, EncodingError};
use crate::engine::{DetectOptions, DetectionEngine, DetectionError};
use crate::policy::{classify, FaceCount};
use crate::types::FaceDetection;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("models not loaded")]
    ModelsNotReady,
    #[error("camera not ready")]
    CameraNotReady,
    #[error("no face in frame")]
    NoFace,
    #[error("{0} faces in frame")]
    MultipleFaces(usize),
    #[error("detection: {0}")]
    Detection(#[from] DetectionError),
    #[error("encoding: {0}")]
    Encoding(#[from] EncodingError),
}

impl CaptureError {
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::ModelsNotReady => {
                "Face detection not ready yet. Please wait a moment.".into()
            }
            CaptureError::CameraNotReady => {
                "Camera not initialized. Please restart the capture.".into()
            }
            CaptureError::NoFace => {
                "No face detected. Please ensure your face is clearly visible.".into()
            }
            CaptureError::MultipleFaces(_) => {
                "Multiple faces detected. Please ensure only your face is in the frame.".into()
            }
            CaptureError::Detection(e) => format!("Error processing face: {e}"),
            CaptureError::Encoding(e) => format!("Error processing face: {e}"),
        }
    }
}

/// A successful capture.
#[derive(Debug, Clone)]
pub struct Captured {
    pub encoded: String,
    pub detection: FaceDetection,
}

#[derive(Debug, Default)]
pub struct RegistrationCapture {
    options: DetectOptions,
    stored: Option<String>,
}

impl RegistrationCapture {
    pub fn new(options: DetectOptions) -> Self {
        Self { options, stored: None }
    }

    /// Encoded descriptor of the last successful capture.
    pub fn stored(&self) -> Option<&str> {
        self.stored.as_deref()
    }

    /// Run one detection pass over `frame` and keep the descriptor of the
    /// single face found. A failed capture leaves the stored value as is.
    pub async fn capture(
        &mut self,
        engine: &dyn DetectionEngine,
        models_loaded: bool,
        frame: Option<&RgbImage>,
    ) -> Result<Captured, CaptureError> {
        if !models_loaded {
            return Err(CaptureError::ModelsNotReady);
        }
        let frame = frame.ok_or(CaptureError::CameraNotReady)?;

        let detections = engine.detect(frame, &self.options).await?;
        let face = match classify(&detections) {
            FaceCount::None => return Err(CaptureError::NoFace),
            FaceCount::Multiple(n) => return Err(CaptureError::MultipleFaces(n)),
            FaceCount::Single(face) => face.clone(),
        };

        let encoded = encode_descriptor(&face.descriptor)?;
        tracing::info!(score = face.bounding_box.score, "registration: face captured");
        self.stored = Some(encoded.clone());
        Ok(Captured {
            encoded,
            detection: face,
        })
    }

    /// Discard the stored capture.
    pub fn retry(&mut self) {
        self.stored = None;
    }
}
