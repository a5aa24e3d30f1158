use axum::{extract::State, Json};

use crate::api::{
    state::AppState,
    types::{HealthResponse, SchemaResponse},
};

/// GET / -- liveness string
pub async fn index(State(state): State<AppState>) -> String {
    format!("{} prediction API is running", state.artifact.name)
}

/// GET /schema -- features the model expects, in order
pub async fn get_schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    let artifact = &state.artifact;
    Json(SchemaResponse {
        model: artifact.name.clone(),
        task: artifact.task().as_str().to_string(),
        features: artifact.schema.features.clone(),
        target: artifact.schema.target.clone(),
        schema_version: artifact.schema.version,
    })
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.artifact.name.clone(),
        trained_at: state.artifact.trained_at.to_rfc3339(),
        uptime_secs: state.uptime_seconds(),
        metrics: state.artifact.metrics.clone(),
    })
}
