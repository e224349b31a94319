//! V4L2 camera backend via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::stream::{CameraBackend, CameraError, StreamConstraints, TrackSettings, VideoTrack};
use std::io;
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed.
    Yuyv,
    /// Motion JPEG, one JPEG per buffer.
    Mjpeg,
    /// Packed RGB24.
    Rgb24,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }
}

/// Map an OS error from opening or streaming a device to a camera error.
pub fn classify_io_error(device_path: &str, err: &io::Error) -> CameraError {
    let detail = format!("{device_path}: {err}");
    match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => CameraError::PermissionDenied(detail),
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
            CameraError::DeviceNotFound(detail)
        }
        Some(libc::EBUSY) => CameraError::DeviceBusy(detail),
        _ => match err.kind() {
            io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(detail),
            io::ErrorKind::NotFound => CameraError::DeviceNotFound(detail),
            _ => CameraError::CaptureFailed(detail),
        },
    }
}

/// Opens a single V4L2 capture device.
pub struct V4lBackend {
    device_path: String,
}

impl V4lBackend {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl CameraBackend for V4lBackend {
    fn open(&self, constraints: &StreamConstraints) -> Result<Vec<Box<dyn VideoTrack>>, CameraError> {
        let track = V4lTrack::open(&self.device_path, constraints)?;
        Ok(vec![Box::new(track)])
    }
}

/// A streaming V4L2 device.
pub struct V4lTrack {
    // Keeps the device handle open for the stream's lifetime.
    _device: Device,
    stream: Option<MmapStream<'static>>,
    settings: TrackSettings,
    pixel_format: PixelFormat,
}

impl V4lTrack {
    pub fn open(device_path: &str, constraints: &StreamConstraints) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device =
            Device::with_path(device_path).map_err(|e| classify_io_error(device_path, &e))?;

        let caps = device.query_caps().map_err(|e| classify_io_error(device_path, &e))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE)
            || !caps.capabilities.contains(v4l::capability::Flags::STREAMING)
        {
            return Err(CameraError::Unsupported(format!(
                "{device_path} ({}) cannot stream video",
                caps.card
            )));
        }
        tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "opened camera");

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::Unsupported(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = constraints.width;
        fmt.height = constraints.height;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| classify_io_error(device_path, &e))?;
        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::Unsupported(format!(
                "unsupported pixel format {} (need YUYV, MJPG or RGB3)",
                negotiated.fourcc
            ))
        })?;
        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = %negotiated.fourcc,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, 4)
            .map_err(|e| classify_io_error(device_path, &e))?;

        Ok(Self {
            _device: device,
            stream: Some(stream),
            settings: TrackSettings {
                label: caps.card,
                width: negotiated.width,
                height: negotiated.height,
            },
            pixel_format,
        })
    }

    fn decode(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let (w, h) = (self.settings.width, self.settings.height);
        let rgb = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, w, h),
            PixelFormat::Rgb24 => frame::rgb24_copy(buf, w, h),
            PixelFormat::Mjpeg => {
                let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}")))?
                    .to_rgb8();
                if img.dimensions() != (w, h) {
                    return Err(CameraError::CaptureFailed(format!(
                        "MJPG frame is {}x{}, expected {w}x{h}",
                        img.width(),
                        img.height()
                    )));
                }
                return Ok(img.into_raw());
            }
        };
        rgb.map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }
}

impl VideoTrack for V4lTrack {
    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::CaptureFailed("track stopped".into()))?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        let used = (meta.bytesused as usize).min(buf.len());
        let raw = if used > 0 { &buf[..used] } else { buf };
        let raw = raw.to_vec();
        let data = self.decode(&raw)?;
        Ok(Frame::new(data, self.settings.width, self.settings.height, sequence))
    }

    fn stop(&mut self) {
        // Dropping the stream issues VIDIOC_STREAMOFF and unmaps buffers.
        if self.stream.take().is_some() {
            tracing::debug!(label = %self.settings.label, "camera track stopped");
        }
    }
}

/// List available V4L2 video capture devices.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    for i in 0..16 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo {
            path,
            name: caps.card,
            driver: caps.driver,
            bus: caps.bus,
        });
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::CameraErrorKind;

    fn os(code: i32) -> CameraErrorKind {
        classify_io_error("/dev/video0", &io::Error::from_raw_os_error(code)).kind()
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(os(libc::EACCES), CameraErrorKind::PermissionDenied);
        assert_eq!(os(libc::EPERM), CameraErrorKind::PermissionDenied);
        assert_eq!(os(libc::ENOENT), CameraErrorKind::DeviceNotFound);
        assert_eq!(os(libc::ENODEV), CameraErrorKind::DeviceNotFound);
        assert_eq!(os(libc::EBUSY), CameraErrorKind::DeviceBusy);
        assert_eq!(os(libc::EIO), CameraErrorKind::CaptureFailed);
    }

    #[test]
    fn test_user_messages() {
        let busy = classify_io_error("/dev/video0", &io::Error::from_raw_os_error(libc::EBUSY));
        assert_eq!(
            busy.user_message(),
            "Camera is in use by another application. Please close other apps using the camera."
        );
        assert_eq!(
            CameraError::PermissionDenied(String::new()).user_message(),
            "Could not access camera. Please ensure you've given permission."
        );
    }

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), None);
    }

    #[test]
    fn test_missing_device_is_not_found() {
        let backend = V4lBackend::new("/dev/clockface-does-not-exist");
        let err = backend.open(&StreamConstraints::kiosk()).err().unwrap();
        assert_eq!(err.kind(), CameraErrorKind::DeviceNotFound);
    }
}
