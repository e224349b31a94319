use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a face descriptor. Shared with the attendance server, which
/// compares descriptors element-wise.
pub const DESCRIPTOR_LEN: usize = 128;

/// Axis-aligned face box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score in [0, 1].
    pub score: f32,
}

impl BoundingBox {
    /// Scale the box from one coordinate space into another.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor has {actual} values, expected {DESCRIPTOR_LEN}")]
    WrongLength { actual: usize },
    #[error("descriptor value at index {index} is not finite")]
    NonFinite { index: usize },
}

/// Identity descriptor extracted from one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Validate and wrap raw model output.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(DescriptorError::WrongLength {
                actual: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// One face found in a detection pass. Produced per pass and consumed
/// immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    /// Ordered landmark points (68 for the landmark model in use).
    pub landmarks: Vec<Point>,
    pub descriptor: Descriptor,
}

/// Attendance action recorded by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceAction {
    CheckIn,
    CheckOut,
}

impl AttendanceAction {
    /// Parse the server's wire value (`check_in` / `check_out`).
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "check_in" => Some(Self::CheckIn),
            "check_out" => Some(Self::CheckOut),
            _ => None,
        }
    }
}

/// A recognised employee and the attendance event recorded for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessReport {
    pub employee_name: String,
    pub action: AttendanceAction,
    /// Match confidence in percent.
    pub confidence: Option<f64>,
    pub processing_time_secs: Option<f64>,
    pub employee_id: Option<i64>,
}

/// Well-formed negative answer from the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoMatchReport {
    pub message: String,
    /// Best confidence in percent, when the server reports one.
    pub confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_accepts_contract_length() {
        let d = Descriptor::new(vec![0.25; DESCRIPTOR_LEN]).unwrap();
        assert_eq!(d.values().len(), DESCRIPTOR_LEN);
    }

    #[test]
    fn test_descriptor_rejects_wrong_length() {
        let err = Descriptor::new(vec![0.0; 5]).unwrap_err();
        assert_eq!(err, DescriptorError::WrongLength { actual: 5 });
    }

    #[test]
    fn test_descriptor_rejects_nan() {
        let mut values = vec![0.0; DESCRIPTOR_LEN];
        values[17] = f32::NAN;
        assert_eq!(
            Descriptor::new(values).unwrap_err(),
            DescriptorError::NonFinite { index: 17 }
        );
    }

    #[test]
    fn test_bbox_scaled() {
        let b = BoundingBox { x: 10.0, y: 20.0, width: 30.0, height: 40.0, score: 0.9 };
        let s = b.scaled(0.5, 2.0);
        assert_eq!((s.x, s.y, s.width, s.height), (5.0, 40.0, 15.0, 80.0));
        assert_eq!(s.score, 0.9);
    }

    #[test]
    fn test_action_from_wire() {
        assert_eq!(AttendanceAction::from_wire("check_in"), Some(AttendanceAction::CheckIn));
        assert_eq!(AttendanceAction::from_wire("check_out"), Some(AttendanceAction::CheckOut));
        assert_eq!(AttendanceAction::from_wire("lunch"), None);
    }
}
