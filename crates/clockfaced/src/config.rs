use crate::detection_loop::LoopConfig;
use crate::kiosk::KioskSettings;
use clockface_client::{HttpConfig, RetryPolicy};
use clockface_core::DetectOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Attendance server base URL.
    pub server_url: String,
    /// Session cookie sent with every RPC.
    pub session_id: Option<String>,
    /// Base path the face engine loads model bundles from.
    pub model_base: String,
    /// Minimum detector score.
    pub score_threshold: f32,
    pub repass_delay_ms: u64,
    pub readiness_delay_ms: u64,
    pub model_retry_secs: u64,
    /// Verification retries after the first call.
    pub max_retries: u32,
    pub retry_base_ms: u64,
    /// How long a verification result stays on screen.
    pub display_window_secs: u64,
    pub request_timeout_secs: u64,
    /// Frames decoded before the video surface reports enough data
    /// (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    pub snapshot_quality: u8,
    /// Restart detection after every cycle without operator input.
    pub auto_loop: bool,
    /// Where to write the overlay canvas, if anywhere.
    pub overlay_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `CLOCKFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            camera_device: std::env::var("CLOCKFACE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            server_url: std::env::var("CLOCKFACE_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8069".to_string()),
            session_id: std::env::var("CLOCKFACE_SESSION_ID")
                .ok()
                .filter(|s| !s.is_empty()),
            model_base: std::env::var("CLOCKFACE_MODEL_BASE")
                .unwrap_or_else(|_| "/hr_attendance_face_recognition/static/models".to_string()),
            score_threshold: env_parse("CLOCKFACE_SCORE_THRESHOLD", 0.5),
            repass_delay_ms: env_parse("CLOCKFACE_REPASS_DELAY_MS", 500),
            readiness_delay_ms: env_parse("CLOCKFACE_READINESS_DELAY_MS", 300),
            model_retry_secs: env_parse("CLOCKFACE_MODEL_RETRY_SECS", 3),
            max_retries: env_parse("CLOCKFACE_MAX_RETRIES", 3),
            retry_base_ms: env_parse("CLOCKFACE_RETRY_BASE_MS", 1000),
            display_window_secs: env_parse("CLOCKFACE_DISPLAY_WINDOW_SECS", 5),
            request_timeout_secs: env_parse("CLOCKFACE_REQUEST_TIMEOUT_SECS", 10),
            warmup_frames: env_parse("CLOCKFACE_WARMUP_FRAMES", 4),
            snapshot_quality: env_parse::<u8>("CLOCKFACE_SNAPSHOT_QUALITY", 80).clamp(1, 100),
            auto_loop: std::env::var("CLOCKFACE_AUTO_LOOP")
                .map(|v| v != "0")
                .unwrap_or(true),
            overlay_path: std::env::var("CLOCKFACE_OVERLAY_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn http(&self) -> HttpConfig {
        HttpConfig {
            server_url: self.server_url.clone(),
            session_id: self.session_id.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            detect: DetectOptions {
                score_threshold: self.score_threshold,
            },
            repass_delay: Duration::from_millis(self.repass_delay_ms),
            readiness_delay: Duration::from_millis(self.readiness_delay_ms),
            snapshot_quality: self.snapshot_quality,
        }
    }

    pub fn kiosk_settings(&self) -> KioskSettings {
        KioskSettings {
            model_base: self.model_base.clone(),
            model_retry: Duration::from_secs(self.model_retry_secs),
            display_window: Duration::from_secs(self.display_window_secs),
            auto_loop: self.auto_loop,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
