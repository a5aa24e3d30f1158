use thiserror::Error;

/// Main error type for the training / serving workflow
#[derive(Error, Debug)]
pub enum ArborError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // Data errors
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Feature schema mismatch: {0}")]
    Schema(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Orchestration errors
    #[error("Pipeline unit {unit} failed: {reason}")]
    Pipeline { unit: String, reason: String },

    // Cloud deployment errors
    #[error("Deployment failed: {0}")]
    Deployment(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ArborError
pub type Result<T> = std::result::Result<T, ArborError>;

/// Per-request validation failures raised while mapping a JSON body onto a
/// feature schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("missing features: {}", missing.join(", "))]
    MissingFeatures { missing: Vec<String> },

    #[error("unexpected features: {}", unexpected.join(", "))]
    UnexpectedFeatures { unexpected: Vec<String> },

    #[error("expected {expected} values, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("feature {name} is not a finite number")]
    NotNumeric { name: String },

    #[error("request body must be a JSON object")]
    NotAnObject,
}

impl From<SchemaError> for ArborError {
    fn from(err: SchemaError) -> Self {
        ArborError::Schema(err.to_string())
    }
}
