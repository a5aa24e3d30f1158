//! Cloud deployment: register a trained artifact with the hosting
//! provider, then stand up a managed scoring endpoint for it.
//!
//! All durable state lives with the provider. Nothing here rolls back a
//! failed deployment.

use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::registry::{
    DeploymentRequest, DeploymentState, DeploymentStatus, EnvironmentSpec, InferenceConfig,
    ModelRegistry, RegisterModelRequest, RegisteredModel, ResourceConfig,
};
use crate::config::DeployConfig;
use crate::error::{ArborError, Result};
use crate::ml::ModelArtifact;

/// Parse the scoring environment description (TOML)
pub fn load_environment(path: &Path) -> Result<EnvironmentSpec> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ArborError::Deployment(format!("cannot read environment file {}: {e}", path.display()))
    })?;
    let env: EnvironmentSpec = toml::from_str(&content)?;
    if env.image.trim().is_empty() {
        return Err(ArborError::Validation(format!(
            "environment {} has no base image",
            env.name
        )));
    }
    Ok(env)
}

/// Entry script plus environment; the script must exist locally
pub fn build_inference_config(cfg: &DeployConfig) -> Result<InferenceConfig> {
    let script = &cfg.entry_script;
    let source = std::fs::read_to_string(script).map_err(|e| {
        ArborError::Deployment(format!("entry script {} is unavailable: {e}", script.display()))
    })?;
    let entry_script = script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ArborError::Validation(format!("{} is not a file", script.display())))?;

    Ok(InferenceConfig {
        entry_script,
        entry_script_source: source,
        environment: load_environment(&cfg.environment_file)?,
    })
}

/// Upload the artifact at `artifact_path` under `name`
pub async fn register(
    registry: &dyn ModelRegistry,
    artifact_path: &Path,
    name: &str,
) -> Result<RegisteredModel> {
    let artifact = ModelArtifact::load(artifact_path)?;
    let description = format!(
        "{} random forest, {} trees, features: {}",
        artifact.task().as_str(),
        artifact.forest.trees.len(),
        artifact.schema.features.join(", ")
    );
    let request = RegisterModelRequest {
        name: name.to_string(),
        description,
        artifact: serde_json::to_value(&artifact)?,
    };

    let model = registry.register_model(&request).await?;
    info!(
        name = %model.name,
        id = %model.id,
        version = model.version,
        "Model registered"
    );
    Ok(model)
}

/// Deploy the registered model named in `cfg` and wait for a terminal state.
/// Returns the final status; only `Healthy` counts as success.
pub async fn deploy(registry: &dyn ModelRegistry, cfg: &DeployConfig) -> Result<DeploymentStatus> {
    let model = match registry.get_model(&cfg.model_name).await {
        Ok(model) => model,
        Err(ArborError::NotFound(_)) => {
            return Err(ArborError::Deployment(format!(
                "model {} is not registered; run `arbor register` first",
                cfg.model_name
            )))
        }
        Err(e) => return Err(e),
    };

    let request = DeploymentRequest {
        name: cfg.service_name.clone(),
        model_ids: vec![model.id.clone()],
        inference: build_inference_config(cfg)?,
        resources: ResourceConfig {
            cpu_cores: cfg.cpu_cores,
            memory_gb: cfg.memory_gb,
        },
    };

    info!(
        service = %request.name,
        model = %model.name,
        version = model.version,
        "Requesting deployment"
    );
    let initial = registry.create_deployment(&request).await?;

    let timeout = Duration::from_secs(cfg.timeout_secs);
    let poll_interval = Duration::from_secs(cfg.poll_interval_secs);
    let status = tokio::time::timeout(timeout, wait_for_terminal(registry, initial, poll_interval))
        .await
        .map_err(|_| {
            ArborError::Timeout(format!(
                "deployment {} not ready after {}s",
                cfg.service_name, cfg.timeout_secs
            ))
        })??;

    match status.state {
        DeploymentState::Healthy => {
            info!(
                service = %status.name,
                scoring_uri = status.scoring_uri.as_deref().unwrap_or("-"),
                "Deployment healthy"
            );
            Ok(status)
        }
        state => Err(ArborError::Deployment(format!(
            "{} ended in state {state:?}: {}",
            status.name,
            status.error.as_deref().unwrap_or("no detail from provider")
        ))),
    }
}

async fn wait_for_terminal(
    registry: &dyn ModelRegistry,
    mut status: DeploymentStatus,
    poll_interval: Duration,
) -> Result<DeploymentStatus> {
    while !status.state.is_terminal() {
        tokio::time::sleep(poll_interval).await;
        let name = status.name.clone();
        status = registry.get_deployment(&name).await?;
        if status.state == DeploymentState::Unknown {
            warn!(service = %name, "Provider reported an unrecognised state");
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::registry::MockModelRegistry;
    use crate::config::TrainingConfig;
    use crate::training;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("arbor-deploy-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn deploy_config(dir: &Path) -> DeployConfig {
        let env = dir.join("environment.toml");
        std::fs::write(
            &env,
            "name = \"arbor-env\"\nimage = \"debian:bookworm-slim\"\npackages = [\"ca-certificates\"]\n\n[variables]\nARBOR_SERVER__PORT = \"5001\"\n",
        )
        .unwrap();
        let script = dir.join("score.sh");
        std::fs::write(&script, "#!/bin/sh\nexec arbor serve\n").unwrap();

        DeployConfig {
            environment_file: env,
            entry_script: script,
            poll_interval_secs: 0,
            timeout_secs: 5,
            ..DeployConfig::default()
        }
    }

    fn model() -> RegisteredModel {
        RegisteredModel {
            id: "iris-classifier:3".into(),
            name: "iris-classifier".into(),
            version: 3,
        }
    }

    fn status(state: DeploymentState) -> DeploymentStatus {
        DeploymentStatus {
            name: "iris-service".into(),
            state,
            scoring_uri: (state == DeploymentState::Healthy)
                .then(|| "https://iris-service.example.com/predict".to_string()),
            error: (state == DeploymentState::Failed).then(|| "image pull failed".to_string()),
        }
    }

    #[test]
    fn environment_and_entry_script_are_required() {
        let dir = scratch_dir();
        let cfg = deploy_config(&dir);

        let inference = build_inference_config(&cfg).unwrap();
        assert_eq!(inference.entry_script, "score.sh");
        assert_eq!(inference.environment.variables["ARBOR_SERVER__PORT"], "5001");

        let missing = DeployConfig {
            entry_script: dir.join("absent.sh"),
            ..cfg
        };
        assert!(build_inference_config(&missing).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn register_uploads_the_artifact_document() {
        let dir = scratch_dir();
        let path = dir.join("iris_model.json");
        let cfg = TrainingConfig {
            n_estimators: 5,
            ..TrainingConfig::default()
        };
        training::train_iris(&cfg, &path).unwrap();

        let mut registry = MockModelRegistry::new();
        registry
            .expect_register_model()
            .withf(|req: &RegisterModelRequest| {
                req.name == "iris-classifier" && req.artifact["format_version"] == 1
            })
            .times(1)
            .returning(|_| Ok(model()));

        let registered = register(&registry, &path, "iris-classifier").await.unwrap();
        assert_eq!(registered.version, 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn deploy_polls_until_healthy() {
        let dir = scratch_dir();
        let cfg = deploy_config(&dir);
        let polls = Arc::new(AtomicU32::new(0));

        let mut registry = MockModelRegistry::new();
        registry.expect_get_model().returning(|_| Ok(model()));
        registry
            .expect_create_deployment()
            .withf(|req: &DeploymentRequest| {
                req.model_ids == vec!["iris-classifier:3".to_string()]
                    && req.resources.cpu_cores == 1.0
                    && req.resources.memory_gb == 1.0
            })
            .times(1)
            .returning(|_| Ok(status(DeploymentState::Transitioning)));
        let counter = polls.clone();
        registry.expect_get_deployment().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(status(DeploymentState::Transitioning))
            } else {
                Ok(status(DeploymentState::Healthy))
            }
        });

        let result = deploy(&registry, &cfg).await.unwrap();
        assert_eq!(result.state, DeploymentState::Healthy);
        assert!(result.scoring_uri.is_some());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_deployment_is_an_error() {
        let dir = scratch_dir();
        let cfg = deploy_config(&dir);

        let mut registry = MockModelRegistry::new();
        registry.expect_get_model().returning(|_| Ok(model()));
        registry
            .expect_create_deployment()
            .returning(|_| Ok(status(DeploymentState::Failed)));

        let err = deploy(&registry, &cfg).await.unwrap_err();
        assert!(err.to_string().contains("image pull failed"), "{err}");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unregistered_model_is_reported() {
        let dir = scratch_dir();
        let cfg = deploy_config(&dir);

        let mut registry = MockModelRegistry::new();
        registry
            .expect_get_model()
            .returning(|name| Err(ArborError::NotFound(format!("model {name}"))));
        registry.expect_create_deployment().never();

        let err = deploy(&registry, &cfg).await.unwrap_err();
        assert!(matches!(err, ArborError::Deployment(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn stuck_deployment_times_out() {
        let dir = scratch_dir();
        let cfg = DeployConfig {
            timeout_secs: 1,
            ..deploy_config(&dir)
        };

        let mut registry = MockModelRegistry::new();
        registry.expect_get_model().returning(|_| Ok(model()));
        registry
            .expect_create_deployment()
            .returning(|_| Ok(status(DeploymentState::Transitioning)));
        registry
            .expect_get_deployment()
            .returning(|_| Ok(status(DeploymentState::Transitioning)));

        let err = deploy(&registry, &cfg).await.unwrap_err();
        assert!(matches!(err, ArborError::Timeout(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
