use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::ml::ModelArtifact;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup; read-only afterwards
    pub artifact: Arc<ModelArtifact>,

    /// Upper bound on a single prediction
    pub request_timeout: Duration,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(artifact: ModelArtifact, request_timeout: Duration) -> Self {
        Self {
            artifact: Arc::new(artifact),
            request_timeout,
            start_time: Utc::now(),
        }
    }

    /// Load the artifact from disk. A missing or corrupt file fails here so
    /// the service never starts without a model.
    pub fn load(artifact_path: &Path, request_timeout: Duration) -> Result<Self> {
        let artifact = ModelArtifact::load(artifact_path)?;
        Ok(Self::new(artifact, request_timeout))
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
