use arbor::{
    adapters::{DeploymentState, ModelRegistry, RegisterModelRequest, RegistryClient},
    config::{DeployConfig, TrainingConfig},
    deploy,
    error::ArborError,
    training,
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::net::TcpListener;
use uuid::Uuid;

const TOKEN: &str = "test-token";

/// Minimal in-process stand-in for the hosting provider
#[derive(Clone, Default)]
struct FakeProvider {
    models: Arc<Mutex<HashMap<String, u32>>>,
    deployment_polls: Arc<AtomicU32>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn register_model(
    State(provider): State<FakeProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if body["artifact"]["forest"].is_null() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut models = provider.models.lock().unwrap();
    let version = models.entry(name.clone()).or_insert(0);
    *version += 1;
    Ok(Json(json!({ "id": format!("{name}:{version}"), "name": name, "version": *version })))
}

async fn get_model(
    State(provider): State<FakeProvider>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let models = provider.models.lock().unwrap();
    let version = models.get(&name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "id": format!("{name}:{version}"), "name": name, "version": version })))
}

async fn create_deployment(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if body["inference"]["entry_script_source"].as_str().is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({ "name": body["name"], "state": "transitioning" })))
}

async fn get_deployment(
    State(provider): State<FakeProvider>,
    Path(name): Path<String>,
) -> Json<Value> {
    let polls = provider.deployment_polls.fetch_add(1, Ordering::SeqCst);
    if polls == 0 {
        Json(json!({ "name": name, "state": "transitioning" }))
    } else {
        Json(json!({
            "name": name,
            "state": "healthy",
            "scoring_uri": format!("http://scoring.local/{name}/predict")
        }))
    }
}

async fn spawn_provider() -> (String, FakeProvider) {
    let provider = FakeProvider::default();
    let app = Router::new()
        .route("/api/models", post(register_model))
        .route("/api/models/:name", get(get_model))
        .route("/api/deployments", post(create_deployment))
        .route("/api/deployments/:name", get(get_deployment))
        .with_state(provider.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/api"), provider)
}

fn client(base_url: &str, token: Option<&str>) -> RegistryClient {
    RegistryClient::new(base_url, token.map(str::to_string), Duration::from_secs(5)).unwrap()
}

struct Workspace(std::path::PathBuf);

impl Workspace {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("arbor-registry-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn trained_artifact(&self) -> std::path::PathBuf {
        let path = self.0.join("iris_model.json");
        let cfg = TrainingConfig {
            n_estimators: 5,
            ..TrainingConfig::default()
        };
        training::train_iris(&cfg, &path).unwrap();
        path
    }

    fn deploy_config(&self, base_url: &str) -> DeployConfig {
        let env = self.0.join("environment.toml");
        std::fs::write(&env, "name = \"arbor-env\"\nimage = \"debian:bookworm-slim\"\n").unwrap();
        let script = self.0.join("score.sh");
        std::fs::write(&script, "#!/bin/sh\nexec arbor serve\n").unwrap();
        DeployConfig {
            registry_url: base_url.to_string(),
            token: Some(TOKEN.to_string()),
            environment_file: env,
            entry_script: script,
            poll_interval_secs: 0,
            timeout_secs: 10,
            ..DeployConfig::default()
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[tokio::test]
async fn register_then_deploy_against_provider() {
    let (base_url, provider) = spawn_provider().await;
    let workspace = Workspace::new();
    let registry = client(&base_url, Some(TOKEN));

    let artifact = workspace.trained_artifact();
    let first = deploy::register(&registry, &artifact, "iris-classifier").await.unwrap();
    let second = deploy::register(&registry, &artifact, "iris-classifier").await.unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert_eq!(registry.get_model("iris-classifier").await.unwrap(), second);

    let status = deploy::deploy(&registry, &workspace.deploy_config(&base_url))
        .await
        .unwrap();
    assert_eq!(status.state, DeploymentState::Healthy);
    assert_eq!(
        status.scoring_uri.as_deref(),
        Some("http://scoring.local/iris-service/predict")
    );
    assert_eq!(provider.deployment_polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_model_maps_to_not_found() {
    let (base_url, _provider) = spawn_provider().await;
    let registry = client(&base_url, Some(TOKEN));

    let err = registry.get_model("never-registered").await.unwrap_err();
    assert!(matches!(err, ArborError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn rejected_credentials_surface_as_deployment_errors() {
    let (base_url, _provider) = spawn_provider().await;
    let registry = client(&base_url, None);

    let request = RegisterModelRequest {
        name: "iris-classifier".into(),
        description: "unauthenticated".into(),
        artifact: json!({ "forest": {} }),
    };
    let err = registry.register_model(&request).await.unwrap_err();
    match err {
        ArborError::Deployment(msg) => assert!(msg.contains("401"), "{msg}"),
        other => panic!("expected deployment error, got {other:?}"),
    }
}
