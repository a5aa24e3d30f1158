use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use tracing::{debug, warn};

use crate::api::{
    state::AppState,
    types::{ErrorResponse, PredictResponse},
};
use crate::error::SchemaError;

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn schema_rejection(err: SchemaError) -> (StatusCode, Json<ErrorResponse>) {
    let mut body = ErrorResponse::new(err.to_string());
    match err {
        SchemaError::MissingFeatures { missing } => body.missing = missing,
        SchemaError::UnexpectedFeatures { unexpected } => body.unexpected = unexpected,
        _ => {}
    }
    (StatusCode::UNPROCESSABLE_ENTITY, Json(body))
}

/// POST /predict
///
/// Accepts `{"data": [..]}` in schema order or an object keyed by feature
/// name. The body is taken raw so malformed JSON maps to 400 rather than
/// the extractor's default rejection.
pub async fn predict(State(state): State<AppState>, body: Bytes) -> ApiResult<PredictResponse> {
    let value: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!("invalid JSON body: {e}"))),
        )
    })?;

    let row = state
        .artifact
        .schema
        .record_from_json(&value)
        .map_err(schema_rejection)?;

    let artifact = state.artifact.clone();
    let scoring = tokio::task::spawn_blocking(move || artifact.predict(&row));
    let prediction = match tokio::time::timeout(state.request_timeout, scoring).await {
        Ok(Ok(Ok(prediction))) => prediction,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Prediction failed");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            ));
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Prediction task aborted");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("prediction task aborted")),
            ));
        }
        Err(_) => {
            warn!(timeout_ms = state.request_timeout.as_millis() as u64, "Prediction timed out");
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("prediction timed out")),
            ));
        }
    };

    debug!(prediction = prediction.as_f64(), "Served prediction");
    Ok(Json(PredictResponse { prediction }))
}
