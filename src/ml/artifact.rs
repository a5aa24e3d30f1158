//! Model artifact: a fitted forest plus the feature schema it expects.
//!
//! Written once by the trainer, loaded read-only by the prediction service.
//! The file is JSON so it can be inspected and diffed; `format_version`
//! guards against loading a layout this build does not understand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::forest::{ForestParams, RandomForest, Task};
use super::schema::FeatureSchema;
use crate::dataset::flat_file::write_atomic;
use crate::error::{ArborError, Result};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Scalar model output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Class(u32),
    Value(f64),
}

impl Prediction {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Class(c) => *c as f64,
            Self::Value(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub name: String,
    pub schema: FeatureSchema,
    pub params: ForestParams,
    pub forest: RandomForest,
    /// Evaluation scores recorded at training time (accuracy, r2, mse)
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn new(
        name: impl Into<String>,
        schema: FeatureSchema,
        params: ForestParams,
        forest: RandomForest,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            name: name.into(),
            schema,
            params,
            forest,
            metrics: BTreeMap::new(),
            trained_at: Utc::now(),
        }
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn task(&self) -> Task {
        self.forest.task
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(format!(
                "unsupported artifact format {} (expected {ARTIFACT_FORMAT_VERSION})",
                self.format_version
            ));
        }
        self.schema.validate()?;
        if self.schema.width() != self.forest.n_features {
            return Err(format!(
                "schema lists {} features, forest expects {}",
                self.schema.width(),
                self.forest.n_features
            ));
        }
        self.forest.validate()
    }

    /// Load and validate an artifact. Any problem is an error, never a
    /// partially usable model.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ArborError::Artifact(format!("cannot read {}: {e}", path.display()))
        })?;
        let artifact: Self = serde_json::from_str(&content)
            .map_err(|e| ArborError::Artifact(format!("{} is not a model artifact: {e}", path.display())))?;
        artifact.validate().map_err(ArborError::Artifact)?;
        info!(
            path = %path.display(),
            name = %artifact.name,
            task = artifact.task().as_str(),
            trees = artifact.forest.trees.len(),
            "Loaded model artifact"
        );
        Ok(artifact)
    }

    /// Persist atomically; rerunning replaces the previous artifact in one step
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload = serde_json::to_vec(self)?;
        write_atomic(path, &payload)?;
        info!(path = %path.display(), bytes = payload.len(), "Saved model artifact");
        Ok(())
    }

    pub fn predict(&self, row: &[f64]) -> Result<Prediction> {
        let raw = self.forest.predict_row(row)?;
        Ok(match self.task() {
            Task::Classification { .. } => Prediction::Class(raw as u32),
            Task::Regression => Prediction::Value(raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::iris;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("arbor-artifact-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    fn small_iris_artifact() -> ModelArtifact {
        let data = iris::load().unwrap();
        let params = ForestParams::classifier(10, 42);
        let forest = RandomForest::fit(&data, iris::TASK, &params).unwrap();
        ModelArtifact::new("iris-classifier", data.schema().clone(), params, forest)
    }

    #[test]
    fn save_load_preserves_predictions() {
        let artifact = small_iris_artifact().with_metric("accuracy", 1.0);
        let path = scratch_path("iris_model.json");
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
        for row in iris::load().unwrap().features() {
            assert_eq!(loaded.predict(row).unwrap(), artifact.predict(row).unwrap());
        }

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn load_fails_for_missing_or_foreign_files() {
        let missing = scratch_path("absent.json");
        assert!(matches!(
            ModelArtifact::load(&missing),
            Err(ArborError::Artifact(_))
        ));

        let garbage = scratch_path("garbage.json");
        write_atomic(&garbage, b"{\"weights\": []}").unwrap();
        assert!(matches!(
            ModelArtifact::load(&garbage),
            Err(ArborError::Artifact(_))
        ));
        let _ = std::fs::remove_dir_all(garbage.parent().unwrap());
    }

    #[test]
    fn validate_rejects_schema_forest_mismatch() {
        let mut artifact = small_iris_artifact();
        artifact.schema.features.pop();
        assert!(artifact.validate().is_err());

        let mut artifact = small_iris_artifact();
        artifact.format_version = 99;
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn class_predictions_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&Prediction::Class(0)).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Prediction::Value(1.5)).unwrap(), "1.5");
    }
}
