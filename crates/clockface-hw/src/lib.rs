//! clockface-hw: camera access for the attendance kiosk.
//!
//! Provides the camera stream lifecycle (acquire/release, playback surface)
//! and the V4L2 backend that feeds it.

pub mod camera;
pub mod frame;
pub mod stream;
pub mod surface;

pub use camera::{list_devices, DeviceInfo, V4lBackend};
pub use frame::Frame;
pub use stream::{
    CameraBackend, CameraError, CameraErrorKind, MediaStreamManager, SessionInfo,
    StreamConstraints, TrackSettings, VideoTrack,
};
pub use surface::{ReadyState, VideoSurface};
