//! Face-count policy: only a frame with exactly one face may proceed.

use crate::types::FaceDetection;

#[derive(Debug, PartialEq)]
pub enum FaceCount<'a> {
    None,
    Single(&'a FaceDetection),
    Multiple(usize),
}

pub fn classify(detections: &[FaceDetection]) -> FaceCount<'_> {
    match detections {
        [] => FaceCount::None,
        [face] => FaceCount::Single(face),
        many => FaceCount::Multiple(many.len()),
    }
}

/// Transient, self-clearing warning raised by a detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionWarning {
    NoFace,
    MultipleFaces,
}

impl DetectionWarning {
    pub fn message(&self) -> &'static str {
        match self {
            DetectionWarning::NoFace => "No face detected. Please center your face in the camera.",
            DetectionWarning::MultipleFaces => {
                "Multiple faces detected. Please ensure only one face is visible."
            }
        }
    }
}
