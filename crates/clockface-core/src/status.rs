//! Kiosk status model.
//!
//! [`KioskStateMachine`] is the single owner of [`KioskStatus`]. Every
//! component reports what happened as a [`KioskEvent`]; the machine decides
//! the new status and hands back the side effects the caller must perform
//! (clear the overlay, arm the display-window timer).
//!
//! A shown verification result is held for a fixed display window. During
//! that window lower-priority events (detection progress, warnings) do not
//! replace it; only the matching `Reset`, a newer result, a camera failure
//! or an explicit stop do.

use crate::policy::DetectionWarning;
use crate::types::{AttendanceAction, NoMatchReport, SuccessReport};
use serde::Serialize;
use std::time::Duration;

/// Default time a verification result stays on screen.
pub const DEFAULT_DISPLAY_WINDOW: Duration = Duration::from_secs(5);

const MODEL_LOAD_FAILED: &str = "Failed to load face detection models. Retrying...";
const LOOKING_FOR_FACE: &str = "Looking for your face...";
const VERIFYING: &str = "Verifying identity...";
const NETWORK_EXHAUSTED: &str =
    "Error connecting to server after several attempts. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KioskStatus {
    Idle,
    LoadingModels,
    Streaming,
    AwaitingFace,
    Processing { message: String },
    Success(SuccessReport),
    NoMatch(NoMatchReport),
    Error { message: String },
    Warning { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KioskEvent {
    ModelLoadStarted,
    ModelLoadSucceeded,
    ModelLoadFailed { reason: String },
    StreamStarted,
    /// Camera could not be acquired or was lost. `message` is user-facing.
    CameraFailed { message: String },
    StreamStopped,
    DetectionStarted,
    DetectionWarning(DetectionWarning),
    DetectionFailed { message: String },
    VerificationStarted,
    VerificationRetrying { retry: u32, max_retries: u32 },
    VerificationSucceeded(SuccessReport),
    VerificationFailed(NoMatchReport),
    VerificationExhausted,
    VerificationRejected { reason: String },
    /// Display window for the result with this generation has elapsed.
    Reset { generation: u64 },
    /// Operator stopped detection.
    Stopped,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ClearOverlay,
    /// Deliver `KioskEvent::Reset { generation }` after `after`.
    ScheduleReset { after: Duration, generation: u64 },
}

#[derive(Debug, Default, PartialEq)]
pub struct Transition {
    pub changed: bool,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelPhase {
    NotLoaded,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug)]
pub struct KioskStateMachine {
    status: KioskStatus,
    models: ModelPhase,
    streaming: bool,
    camera_failed: bool,
    display_window: Duration,
    display_generation: u64,
    /// Set while a verification result is on screen.
    displaying: bool,
}

impl Default for KioskStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_WINDOW)
    }
}

impl KioskStateMachine {
    pub fn new(display_window: Duration) -> Self {
        Self {
            status: KioskStatus::Idle,
            models: ModelPhase::NotLoaded,
            streaming: false,
            camera_failed: false,
            display_window,
            display_generation: 0,
            displaying: false,
        }
    }

    pub fn status(&self) -> &KioskStatus {
        &self.status
    }

    pub fn is_displaying_result(&self) -> bool {
        self.displaying
    }

    /// Apply one event and return the resulting transition.
    pub fn apply(&mut self, event: KioskEvent) -> Transition {
        let mut effects = Vec::new();
        let next = self.next_status(event, &mut effects);
        let changed = match next {
            Some(status) if status != self.status => {
                tracing::debug!(from = ?self.status, to = ?status, "kiosk status");
                self.status = status;
                true
            }
            _ => false,
        };
        Transition { changed, effects }
    }

    fn next_status(&mut self, event: KioskEvent, effects: &mut Vec<Effect>) -> Option<KioskStatus> {
        match event {
            KioskEvent::ModelLoadStarted => {
                self.models = ModelPhase::Loading;
                self.resting_if_unblocked()
            }
            KioskEvent::ModelLoadSucceeded => {
                self.models = ModelPhase::Ready;
                self.resting_if_unblocked()
            }
            KioskEvent::ModelLoadFailed { reason } => {
                tracing::debug!(reason = %reason, "model load failed");
                self.models = ModelPhase::Failed;
                self.resting_if_unblocked()
            }
            KioskEvent::StreamStarted => {
                self.streaming = true;
                self.camera_failed = false;
                self.resting_if_unblocked()
            }
            KioskEvent::CameraFailed { message } => {
                self.streaming = false;
                self.camera_failed = true;
                self.displaying = false;
                effects.push(Effect::ClearOverlay);
                Some(KioskStatus::Error { message })
            }
            KioskEvent::StreamStopped => {
                self.streaming = false;
                self.resting_if_unblocked()
            }
            KioskEvent::DetectionStarted => self.transient(KioskStatus::Processing {
                message: LOOKING_FOR_FACE.into(),
            }),
            KioskEvent::DetectionWarning(warning) => self.transient(KioskStatus::Warning {
                message: warning.message().into(),
            }),
            KioskEvent::DetectionFailed { message } => {
                self.transient(KioskStatus::Error { message })
            }
            KioskEvent::VerificationStarted => self.transient(KioskStatus::Processing {
                message: VERIFYING.into(),
            }),
            KioskEvent::VerificationRetrying { retry, max_retries } => {
                self.transient(KioskStatus::Processing {
                    message: format!("Connection issue. Retrying... ({retry}/{max_retries})"),
                })
            }
            KioskEvent::VerificationSucceeded(report) => {
                Some(self.show_result(KioskStatus::Success(report), effects))
            }
            KioskEvent::VerificationFailed(report) => {
                Some(self.show_result(KioskStatus::NoMatch(report), effects))
            }
            KioskEvent::VerificationExhausted => self.transient(KioskStatus::Error {
                message: NETWORK_EXHAUSTED.into(),
            }),
            KioskEvent::VerificationRejected { reason } => self.transient(KioskStatus::Error {
                message: format!("Face verification failed: {reason}"),
            }),
            KioskEvent::Reset { generation } => {
                if !self.displaying || generation != self.display_generation {
                    tracing::debug!(generation, current = self.display_generation, "stale reset ignored");
                    return None;
                }
                self.displaying = false;
                effects.push(Effect::ClearOverlay);
                Some(self.resting())
            }
            KioskEvent::Stopped => {
                self.displaying = false;
                effects.push(Effect::ClearOverlay);
                self.resting_if_unblocked()
            }
        }
    }

    /// Status for loop progress: suppressed while a result is on screen or
    /// the camera is down.
    fn transient(&self, status: KioskStatus) -> Option<KioskStatus> {
        if self.displaying || self.camera_failed {
            None
        } else {
            Some(status)
        }
    }

    fn show_result(&mut self, status: KioskStatus, effects: &mut Vec<Effect>) -> KioskStatus {
        self.display_generation += 1;
        self.displaying = true;
        effects.push(Effect::ScheduleReset {
            after: self.display_window,
            generation: self.display_generation,
        });
        status
    }

    fn resting_if_unblocked(&self) -> Option<KioskStatus> {
        if self.displaying || self.camera_failed {
            None
        } else {
            Some(self.resting())
        }
    }

    /// Status shown when nothing is in progress.
    fn resting(&self) -> KioskStatus {
        match (self.models, self.streaming) {
            (ModelPhase::Failed, _) => KioskStatus::Error {
                message: MODEL_LOAD_FAILED.into(),
            },
            (ModelPhase::Loading, _) => KioskStatus::LoadingModels,
            (ModelPhase::Ready, true) => KioskStatus::AwaitingFace,
            (ModelPhase::NotLoaded, true) => KioskStatus::Streaming,
            (_, false) => KioskStatus::Idle,
        }
    }
}

/// Visual tone of the status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Info,
    Success,
    Warning,
    Danger,
}

/// User-facing text for a status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDisplay {
    pub headline: String,
    pub employee: Option<String>,
    pub message: String,
    pub tone: Tone,
    /// Show the progress spinner.
    pub busy: bool,
}

impl StatusDisplay {
    fn new(headline: &str, message: impl Into<String>, tone: Tone, busy: bool) -> Self {
        Self {
            headline: headline.into(),
            employee: None,
            message: message.into(),
            tone,
            busy,
        }
    }
}

impl KioskStatus {
    pub fn display(&self) -> StatusDisplay {
        match self {
            KioskStatus::Idle => StatusDisplay::new("Scan Your Face", "", Tone::Neutral, false),
            KioskStatus::LoadingModels => StatusDisplay::new(
                "Scan Your Face",
                "Loading face detection models...",
                Tone::Info,
                true,
            ),
            KioskStatus::Streaming => {
                StatusDisplay::new("Scan Your Face", "Camera ready.", Tone::Info, false)
            }
            KioskStatus::AwaitingFace => StatusDisplay::new("Scan Your Face", "", Tone::Neutral, false),
            KioskStatus::Processing { message } => {
                StatusDisplay::new("Scan Your Face", message.as_str(), Tone::Info, true)
            }
            KioskStatus::Success(report) => {
                let (headline, done) = match report.action {
                    AttendanceAction::CheckIn => {
                        ("Welcome", "You have been successfully checked in!")
                    }
                    AttendanceAction::CheckOut => {
                        ("Goodbye", "You have been successfully checked out!")
                    }
                };
                let mut message = String::from(done);
                if let Some(confidence) = report.confidence {
                    message.push_str(&format!("\nConfidence: {confidence:.1}%"));
                }
                if let Some(secs) = report.processing_time_secs {
                    message.push_str(&format!(" (Processed in {:.0}ms)", secs * 1000.0));
                }
                let mut display = StatusDisplay::new(headline, message, Tone::Success, false);
                display.employee = Some(report.employee_name.clone());
                display
            }
            KioskStatus::NoMatch(report) => {
                let confidence = report
                    .confidence
                    .map(|c| format!("{c:.2}%"))
                    .unwrap_or_else(|| "N/A".into());
                StatusDisplay::new(
                    "Recognition Failed",
                    format!("{}\nConfidence: {confidence}", report.message),
                    Tone::Danger,
                    false,
                )
            }
            KioskStatus::Error { message } => {
                StatusDisplay::new("Scan Your Face", message.as_str(), Tone::Danger, false)
            }
            KioskStatus::Warning { message } => {
                StatusDisplay::new("Scan Your Face", message.as_str(), Tone::Warning, false)
            }
        }
    }
}
