//! Model registry / managed hosting REST adapter.
//!
//! The provider owns all state (registered models, deployments). This
//! client only issues the calls the deployment workflow needs:
//!
//! - `POST /models`, `GET /models/{name}`
//! - `POST /deployments`, `GET /deployments/{name}`

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ArborError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub id: String,
    pub name: String,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterModelRequest {
    pub name: String,
    pub description: String,
    /// The artifact document itself
    pub artifact: serde_json::Value,
}

/// Runtime environment for the scoring container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceConfig {
    /// File name of the entry script as it will appear in the container
    pub entry_script: String,
    pub entry_script_source: String,
    pub environment: EnvironmentSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceConfig {
    pub cpu_cores: f64,
    pub memory_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentRequest {
    pub name: String,
    pub model_ids: Vec<String>,
    pub inference: InferenceConfig,
    pub resources: ResourceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Transitioning,
    Healthy,
    Unhealthy,
    Failed,
    #[serde(other)]
    Unknown,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Healthy | Self::Unhealthy | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub name: String,
    pub state: DeploymentState,
    #[serde(default)]
    pub scoring_uri: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Calls the deployment workflow makes against the provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn register_model(&self, request: &RegisterModelRequest) -> Result<RegisteredModel>;

    async fn get_model(&self, name: &str) -> Result<RegisteredModel>;

    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<DeploymentStatus>;

    async fn get_deployment(&self, name: &str) -> Result<DeploymentStatus>;
}

#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl RegistryClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(ArborError::Validation(format!(
                "registry URL {base_url} cannot be a base"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .user_agent(concat!("arbor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ArborError::Internal(format!("failed to build registry HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ArborError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArborError::Deployment(format!(
                "{what}: provider returned {status}: {}",
                body.trim()
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ModelRegistry for RegistryClient {
    #[instrument(skip(self, request), fields(model = %request.name))]
    async fn register_model(&self, request: &RegisterModelRequest) -> Result<RegisteredModel> {
        let url = self.endpoint(&["models"]);
        debug!(%url, "registering model");
        self.send(
            self.request(Method::POST, url).json(request),
            &format!("register model {}", request.name),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_model(&self, name: &str) -> Result<RegisteredModel> {
        let url = self.endpoint(&["models", name]);
        self.send(self.request(Method::GET, url), &format!("model {name}"))
            .await
    }

    #[instrument(skip(self, request), fields(service = %request.name))]
    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<DeploymentStatus> {
        let url = self.endpoint(&["deployments"]);
        debug!(%url, "requesting deployment");
        self.send(
            self.request(Method::POST, url).json(request),
            &format!("deploy {}", request.name),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_deployment(&self, name: &str) -> Result<DeploymentStatus> {
        let url = self.endpoint(&["deployments", name]);
        self.send(self.request(Method::GET, url), &format!("deployment {name}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_base_path_and_escape_names() {
        let client =
            RegistryClient::new("https://ml.example.com/api/v1", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.endpoint(&["models", "iris classifier"]).as_str(),
            "https://ml.example.com/api/v1/models/iris%20classifier"
        );
        assert_eq!(
            client.endpoint(&["deployments"]).as_str(),
            "https://ml.example.com/api/v1/deployments"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(RegistryClient::new("not a url", None, Duration::from_secs(1)).is_err());
        assert!(RegistryClient::new("mailto:ops@example.com", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn unknown_states_do_not_fail_parsing() {
        let status: DeploymentStatus =
            serde_json::from_str(r#"{"name":"svc","state":"warming_up"}"#).unwrap();
        assert_eq!(status.state, DeploymentState::Unknown);
        assert!(!status.state.is_terminal());
    }
}
