use crate::kiosk::{KioskError, KioskHandle};
use zbus::interface;

pub const BUS_NAME: &str = "org.clockface.Kiosk";
pub const OBJECT_PATH: &str = "/org/clockface/Kiosk1";

/// D-Bus control surface for the kiosk daemon.
///
/// Bus name: org.clockface.Kiosk
/// Object path: /org/clockface/Kiosk1
pub struct KioskService {
    pub kiosk: KioskHandle,
}

fn failed(e: KioskError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.clockface.Kiosk1")]
impl KioskService {
    /// Start a detection cycle. Returns the outcome
    /// (`started`, `already_running`, `models_pending`, `camera_unavailable`).
    async fn start_detection(&self) -> zbus::fdo::Result<String> {
        let outcome = self.kiosk.start_detection().await.map_err(failed)?;
        Ok(outcome.as_str().to_string())
    }

    /// Stop detection and clear any shown result.
    async fn stop(&self) -> zbus::fdo::Result<()> {
        self.kiosk.stop().await.map_err(failed)
    }

    /// Kiosk status, loop state, model state and camera info as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.kiosk.snapshot().await.map_err(failed)?;
        let mut value = serde_json::to_value(&snapshot)
            .map_err(|e| zbus::fdo::Error::Failed(format!("serialization failed: {e}")))?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("version".into(), env!("CARGO_PKG_VERSION").into());
        }
        Ok(value.to_string())
    }
}
