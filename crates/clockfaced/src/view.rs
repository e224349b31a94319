//! Status rendering.

use clockface_core::overlay::OverlayRenderer;
use clockface_core::status::Tone;
use clockface_core::{FaceDetection, StatusDisplay};
use std::path::PathBuf;

/// Rendering interface the kiosk drives. No decision logic lives here.
pub trait StatusView: Send {
    fn show(&mut self, display: &StatusDisplay);
    fn draw_detections(&mut self, detections: &[FaceDetection], frame_size: (u32, u32));
    fn clear_overlay(&mut self);
}

/// Logs status through `tracing` and optionally mirrors the overlay canvas
/// to a PNG file.
pub struct ConsoleView {
    overlay: OverlayRenderer,
    overlay_path: Option<PathBuf>,
}

impl ConsoleView {
    pub fn new(canvas_size: (u32, u32), overlay_path: Option<PathBuf>) -> Self {
        Self {
            overlay: OverlayRenderer::new(canvas_size.0, canvas_size.1),
            overlay_path,
        }
    }

    fn flush_overlay(&self) {
        let Some(path) = &self.overlay_path else {
            return;
        };
        if let Err(e) = self.overlay.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write overlay");
        }
    }
}

impl StatusView for ConsoleView {
    fn show(&mut self, status: &StatusDisplay) {
        let employee = status.employee.as_deref().unwrap_or("");
        let message = status.message.replace('\n', " | ");
        match status.tone {
            Tone::Danger => tracing::error!(headline = %status.headline, message = %message, "status"),
            Tone::Warning => tracing::warn!(headline = %status.headline, message = %message, "status"),
            Tone::Success => tracing::info!(
                headline = %status.headline,
                employee,
                message = %message,
                "status"
            ),
            Tone::Neutral | Tone::Info => tracing::info!(
                headline = %status.headline,
                message = %message,
                busy = status.busy,
                "status"
            ),
        }
    }

    fn draw_detections(&mut self, detections: &[FaceDetection], frame_size: (u32, u32)) {
        if self.overlay.dimensions() != frame_size {
            self.overlay.resize(frame_size.0, frame_size.1);
        }
        self.overlay.draw(detections, frame_size);
        self.flush_overlay();
    }

    fn clear_overlay(&mut self) {
        self.overlay.clear();
        self.flush_overlay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::faces;
    use clockface_core::{AttendanceAction, KioskStatus, SuccessReport};

    #[test]
    fn test_console_view_shows_every_tone() {
        let mut view = ConsoleView::new((8, 6), None);
        let statuses = [
            KioskStatus::Idle,
            KioskStatus::LoadingModels,
            KioskStatus::Warning {
                message: "Multiple faces detected.".into(),
            },
            KioskStatus::Error {
                message: "Error accessing camera stream.".into(),
            },
            KioskStatus::Success(SuccessReport {
                employee_name: "Ada Lovelace".into(),
                action: AttendanceAction::CheckOut,
                confidence: Some(88.0),
                processing_time_secs: None,
                employee_id: None,
            }),
        ];
        for status in &statuses {
            view.show(&status.display());
        }
    }

    #[test]
    fn test_overlay_mirrored_to_png() {
        let path = std::env::temp_dir().join(format!("clockface-overlay-{}.png", std::process::id()));
        let mut view = ConsoleView::new((8, 6), Some(path.clone()));
        view.draw_detections(&faces(1), (160, 120));
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (160, 120));
        view.clear_overlay();
        let _ = std::fs::remove_file(&path);
    }
}
