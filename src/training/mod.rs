//! Trainer: fit a forest, score it, persist the artifact.
//!
//! Runs once to completion. Load and serialization failures propagate to
//! the caller; there is no retry here (the pipeline runner owns retries).

use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::config::TrainingConfig;
use crate::dataset::{self, iris, Dataset};
use crate::error::Result;
use crate::ml::{metrics, ForestParams, ModelArtifact, RandomForest, Task};

pub const IRIS_MODEL_NAME: &str = "iris-classifier";
pub const HOUSING_MODEL_NAME: &str = "housing-regressor";

/// Fit a forest on `dataset` and wrap it with the dataset's schema
pub fn fit(name: &str, dataset: &Dataset, task: Task, params: &ForestParams) -> Result<ModelArtifact> {
    let started = Instant::now();
    let forest = RandomForest::fit(dataset, task, params)?;
    info!(
        model = name,
        task = task.as_str(),
        rows = dataset.len(),
        features = dataset.width(),
        trees = forest.trees.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fitted random forest"
    );
    Ok(ModelArtifact::new(
        name,
        dataset.schema().clone(),
        params.clone(),
        forest,
    ))
}

/// Score `artifact` on `dataset` and record the metrics in the artifact
pub fn evaluate(artifact: ModelArtifact, dataset: &Dataset, split: &str) -> Result<ModelArtifact> {
    let predictions = artifact.forest.predict(dataset.features())?;
    let artifact = match artifact.task() {
        Task::Classification { .. } => {
            let accuracy = metrics::accuracy(dataset.targets(), &predictions);
            info!(split, accuracy, "Evaluated classifier");
            artifact.with_metric(&format!("{split}_accuracy"), accuracy)
        }
        Task::Regression => {
            let r2 = metrics::r2_score(dataset.targets(), &predictions);
            let mse = metrics::mean_squared_error(dataset.targets(), &predictions);
            info!(split, r2, mse, "Evaluated regressor");
            artifact
                .with_metric(&format!("{split}_r2"), r2)
                .with_metric(&format!("{split}_mse"), mse)
        }
    };
    Ok(artifact)
}

/// Train the Iris classifier on a seeded 70/30 split and save it to `out`
pub fn train_iris(cfg: &TrainingConfig, out: &Path) -> Result<ModelArtifact> {
    let data = iris::load()?;
    let (train, test) = data.train_test_split(cfg.test_size, cfg.seed)?;
    let params = ForestParams::classifier(cfg.n_estimators, cfg.seed).with_max_depth(cfg.max_depth);

    let artifact = fit(IRIS_MODEL_NAME, &train, iris::TASK, &params)?;
    let artifact = evaluate(artifact, &test, "test")?;
    artifact.save(out)?;
    info!(path = %out.display(), "Model trained and saved");
    Ok(artifact)
}

/// Train from a feature CSV and a target CSV (the pipeline's `train_model`
/// unit) and save to `out`
pub fn train_from_files(
    x_csv: &Path,
    y_csv: &Path,
    name: &str,
    task: Task,
    params: &ForestParams,
    out: &Path,
) -> Result<ModelArtifact> {
    let x = dataset::read_numeric_csv(x_csv)?;
    let y = dataset::read_numeric_csv(y_csv)?;
    let data = Dataset::from_tables(&x, &y, dataset::HOUSING_TARGET)?;

    let artifact = fit(name, &data, task, params)?;
    let artifact = evaluate(artifact, &data, "train")?;
    artifact.save(out)?;
    info!(path = %out.display(), "Model trained and saved");
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Table;

    fn scratch_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("arbor-train-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            n_estimators: 15,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn iris_training_is_reproducible_and_accurate() {
        let dir = scratch_dir();
        let a = train_iris(&quick_config(), &dir.join("a.json")).unwrap();
        let b = train_iris(&quick_config(), &dir.join("b.json")).unwrap();

        assert_eq!(a.forest, b.forest);
        assert!(a.metrics["test_accuracy"] >= 0.85, "{:?}", a.metrics);

        let query = [5.1, 3.5, 1.4, 0.2];
        assert_eq!(a.predict(&query).unwrap(), b.predict(&query).unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn saved_artifact_predicts_like_the_fitted_model() {
        let dir = scratch_dir();
        let path = dir.join("iris_model.json");
        let fitted = train_iris(&quick_config(), &path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();

        for row in iris::load().unwrap().features() {
            assert_eq!(fitted.predict(row).unwrap(), loaded.predict(row).unwrap());
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn trains_regressor_from_flat_files() {
        let dir = scratch_dir();
        let x = Table::new(
            vec!["MedInc".into(), "HouseAge".into()],
            (0..30).map(|i| vec![i as f64 / 3.0, (i % 5) as f64]).collect(),
        )
        .unwrap();
        let y = Table::new(
            vec!["target".into()],
            (0..30).map(|i| vec![1.0 + i as f64 / 10.0]).collect(),
        )
        .unwrap();
        dataset::write_numeric_csv(dir.join("X.csv"), &x).unwrap();
        dataset::write_numeric_csv(dir.join("y.csv"), &y).unwrap();

        let artifact = train_from_files(
            &dir.join("X.csv"),
            &dir.join("y.csv"),
            HOUSING_MODEL_NAME,
            Task::Regression,
            &ForestParams::regressor(10, 42),
            &dir.join("model.json"),
        )
        .unwrap();

        assert_eq!(artifact.schema.features, vec!["MedInc", "HouseAge"]);
        assert!(artifact.metrics["train_r2"] > 0.8);
        assert!(dir.join("model.json").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_flat_file_propagates() {
        let dir = scratch_dir();
        let err = train_from_files(
            &dir.join("X.csv"),
            &dir.join("y.csv"),
            HOUSING_MODEL_NAME,
            Task::Regression,
            &ForestParams::regressor(1, 42),
            &dir.join("model.json"),
        );
        assert!(err.is_err());
        assert!(!dir.join("model.json").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
