//! The three pipeline units. Each reads the previous unit's flat files
//! from the shared work directory and writes its own.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use super::definition::UnitName;
use crate::adapters::HousingStore;
use crate::config::PipelineConfig;
use crate::dataset::{self, housing, HOUSING_TARGET};
use crate::error::{ArborError, Result};
use crate::ml::{ForestParams, Task};
use crate::training::{self, HOUSING_MODEL_NAME};

/// Files exchanged between units
#[derive(Debug, Clone, PartialEq)]
pub struct PipelinePaths {
    pub raw_data: PathBuf,
    pub features: PathBuf,
    pub target: PathBuf,
    pub artifact: PathBuf,
}

impl PipelinePaths {
    pub fn new(work_dir: &Path, artifact: &Path) -> Self {
        Self {
            raw_data: work_dir.join("raw_data.csv"),
            features: work_dir.join("X.csv"),
            target: work_dir.join("y.csv"),
            artifact: artifact.to_path_buf(),
        }
    }
}

/// Executes one named unit. The runner only sees this trait so tests can
/// substitute failing units.
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    async fn execute(&self, unit: UnitName) -> Result<()>;
}

pub struct PipelineContext {
    store: Arc<dyn HousingStore>,
    paths: PipelinePaths,
    params: ForestParams,
}

impl PipelineContext {
    pub fn new(store: Arc<dyn HousingStore>, cfg: &PipelineConfig) -> Self {
        Self {
            store,
            paths: PipelinePaths::new(&cfg.work_dir, &cfg.artifact_path),
            params: ForestParams::regressor(cfg.n_estimators, cfg.seed),
        }
    }

    pub fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    /// housing_data -> raw_data.csv
    #[instrument(skip(self))]
    pub async fn extract_data(&self) -> Result<()> {
        let rows = self.store.fetch_all().await?;
        if rows.is_empty() {
            return Err(ArborError::Dataset(
                "housing_data is empty; run `arbor ingest` first".to_string(),
            ));
        }
        let table = housing::raw_table(&rows);
        dataset::write_numeric_csv(&self.paths.raw_data, &table)?;
        info!(rows = rows.len(), path = %self.paths.raw_data.display(), "Extracted data");
        Ok(())
    }

    /// raw_data.csv -> X.csv (every column but id and target) + y.csv
    #[instrument(skip(self))]
    pub async fn prepare_data(&self) -> Result<()> {
        let raw = dataset::read_numeric_csv(&self.paths.raw_data)?;
        let x = raw.drop_columns(&[housing::ID_COLUMN, HOUSING_TARGET])?;
        let y = dataset::Table::new(
            vec![HOUSING_TARGET.to_string()],
            raw.column(HOUSING_TARGET)?.into_iter().map(|v| vec![v]).collect(),
        )?;
        dataset::write_numeric_csv(&self.paths.features, &x)?;
        dataset::write_numeric_csv(&self.paths.target, &y)?;
        info!(rows = x.rows.len(), features = x.header.len(), "Prepared data");
        Ok(())
    }

    /// X.csv + y.csv -> regressor artifact
    #[instrument(skip(self))]
    pub async fn train_model(&self) -> Result<()> {
        let paths = self.paths.clone();
        let params = self.params.clone();
        let artifact = tokio::task::spawn_blocking(move || {
            training::train_from_files(
                &paths.features,
                &paths.target,
                HOUSING_MODEL_NAME,
                Task::Regression,
                &params,
                &paths.artifact,
            )
        })
        .await
        .map_err(|e| ArborError::Internal(format!("training task panicked: {e}")))??;
        info!(trees = artifact.forest.trees.len(), "Trained model");
        Ok(())
    }
}

#[async_trait]
impl UnitExecutor for PipelineContext {
    async fn execute(&self, unit: UnitName) -> Result<()> {
        match unit {
            UnitName::ExtractData => self.extract_data().await,
            UnitName::PrepareData => self.prepare_data().await,
            UnitName::TrainModel => self.train_model().await,
        }
    }
}
