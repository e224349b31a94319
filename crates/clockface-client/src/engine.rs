//! D-Bus client for the external face engine service.
//!
//! Inference runs in a separate process exposing `org.clockface.FaceEngine1`.
//! Detections come back as JSON and are validated into [`FaceDetection`]s
//! here, so a misbehaving engine can never hand the loop a descriptor of the
//! wrong length.

use async_trait::async_trait;
use clockface_core::{
    BoundingBox, DetectOptions, DetectionEngine, DetectionError, Descriptor, FaceDetection,
    ModelBundle, ModelLoadError, Point,
};
use image::RgbImage;
use serde::Deserialize;

#[zbus::proxy(
    interface = "org.clockface.FaceEngine1",
    default_service = "org.clockface.FaceEngine",
    default_path = "/org/clockface/FaceEngine1"
)]
pub trait FaceEngine {
    /// Load one named model bundle from `base_path`.
    fn load_model(&self, name: &str, base_path: &str) -> zbus::Result<()>;

    /// Detect faces in a packed RGB24 frame. Returns a JSON array.
    fn detect(
        &self,
        width: u32,
        height: u32,
        rgb: &[u8],
        score_threshold: f64,
    ) -> zbus::Result<String>;
}

#[derive(Debug, Deserialize)]
struct WireBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(rename = "box")]
    bounding_box: WireBox,
    #[serde(default)]
    landmarks: Vec<[f32; 2]>,
    descriptor: Vec<f32>,
}

/// Parse and validate the engine's JSON reply.
pub fn parse_detections(json: &str) -> Result<Vec<FaceDetection>, DetectionError> {
    let wire: Vec<WireDetection> = serde_json::from_str(json)
        .map_err(|e| DetectionError::InvalidOutput(format!("detections: {e}")))?;
    wire.into_iter()
        .map(|d| {
            let descriptor = Descriptor::new(d.descriptor)
                .map_err(|e| DetectionError::InvalidOutput(e.to_string()))?;
            Ok(FaceDetection {
                bounding_box: BoundingBox {
                    x: d.bounding_box.x,
                    y: d.bounding_box.y,
                    width: d.bounding_box.width,
                    height: d.bounding_box.height,
                    score: d.bounding_box.score,
                },
                landmarks: d.landmarks.into_iter().map(|[x, y]| Point { x, y }).collect(),
                descriptor,
            })
        })
        .collect()
}

fn unavailable(e: zbus::Error) -> DetectionError {
    match e {
        zbus::Error::MethodError(name, msg, _) if name.as_str().ends_with("ModelsNotLoaded") => {
            tracing::debug!(message = ?msg, "engine reports models not loaded");
            DetectionError::ModelsNotLoaded
        }
        zbus::Error::MethodError(_, msg, _) => {
            DetectionError::InferenceFailed(msg.unwrap_or_else(|| "engine error".into()))
        }
        other => DetectionError::Unavailable(other.to_string()),
    }
}

/// [`DetectionEngine`] backed by the face engine service.
pub struct FaceEngineClient {
    proxy: FaceEngineProxy<'static>,
}

impl FaceEngineClient {
    pub async fn connect(connection: &zbus::Connection) -> zbus::Result<Self> {
        let proxy = FaceEngineProxy::new(connection).await?;
        Ok(Self { proxy })
    }
}

#[async_trait]
impl DetectionEngine for FaceEngineClient {
    async fn load_model(&self, bundle: ModelBundle, base_path: &str) -> Result<(), ModelLoadError> {
        self.proxy
            .load_model(bundle.name(), base_path)
            .await
            .map_err(|e| match e {
                zbus::Error::MethodError(_, msg, _) => ModelLoadError::Bundle {
                    bundle: bundle.name(),
                    reason: msg.unwrap_or_else(|| "load failed".into()),
                },
                other => ModelLoadError::Unavailable(other.to_string()),
            })
    }

    async fn detect(
        &self,
        frame: &RgbImage,
        options: &DetectOptions,
    ) -> Result<Vec<FaceDetection>, DetectionError> {
        let json = self
            .proxy
            .detect(
                frame.width(),
                frame.height(),
                frame.as_raw(),
                f64::from(options.score_threshold),
            )
            .await
            .map_err(unavailable)?;
        parse_detections(&json)
    }
}
