//! Detection model set lifecycle: not-loaded → loading → loaded | failed.

use crate::engine::{DetectionEngine, ModelBundle, ModelLoadError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ModelState {
    NotLoaded,
    Loading,
    Loaded,
    Failed(String),
}

/// Tracks whether the engine's model bundles are ready. One per kiosk.
#[derive(Debug)]
pub struct ModelSet {
    base_path: String,
    state: ModelState,
    attempts: u32,
}

impl ModelSet {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            state: ModelState::NotLoaded,
            attempts: 0,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ModelState::Loaded
    }

    /// Number of load attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Mark a load attempt as started. Returns false when a load is already
    /// running or the models are loaded.
    pub fn begin(&mut self) -> bool {
        if matches!(self.state, ModelState::Loading | ModelState::Loaded) {
            return false;
        }
        self.attempts += 1;
        self.state = ModelState::Loading;
        true
    }

    /// Record the outcome of the attempt started by [`begin`](Self::begin).
    pub fn complete(&mut self, result: &Result<(), ModelLoadError>) {
        self.state = match result {
            Ok(()) => ModelState::Loaded,
            Err(e) => ModelState::Failed(e.to_string()),
        };
    }

    /// The engine reported that it no longer holds the models (for example
    /// after a restart). The next [`begin`](Self::begin) starts a reload.
    pub fn invalidate(&mut self) {
        if self.state == ModelState::Loaded {
            self.state = ModelState::NotLoaded;
        }
    }

    /// Load every bundle in order. Stops at the first failure.
    pub async fn load_all(
        engine: &dyn DetectionEngine,
        base_path: &str,
    ) -> Result<(), ModelLoadError> {
        for bundle in ModelBundle::ALL {
            tracing::info!(model = bundle.name(), base = base_path, "loading model");
            engine.load_model(bundle, base_path).await?;
            tracing::info!(model = bundle.name(), "model loaded");
        }
        Ok(())
    }
}
