//! clockface-core: attendance kiosk building blocks.
//!
//! Face data model and wire encodings, the detection capability contract,
//! the kiosk status machine and the overlay renderer.

pub mod encoding;
pub mod engine;
pub mod models;
pub mod overlay;
pub mod policy;
pub mod registration;
pub mod status;
pub mod types;

pub use engine::{DetectOptions, DetectionEngine, DetectionError, ModelBundle, ModelLoadError};
pub use models::{ModelSet, ModelState};
pub use status::{Effect, KioskEvent, KioskStateMachine, KioskStatus, StatusDisplay};
pub use types::{
    AttendanceAction, BoundingBox, Descriptor, FaceDetection, NoMatchReport, Point, SuccessReport,
    DESCRIPTOR_LEN,
};
