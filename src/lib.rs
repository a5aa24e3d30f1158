pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod deploy;
pub mod error;
pub mod ingest;
pub mod ml;
pub mod pipeline;
pub mod training;

pub use config::AppConfig;
pub use dataset::{Dataset, HousingRecord, Table};
pub use error::{ArborError, Result, SchemaError};
pub use ml::{FeatureSchema, ForestParams, ModelArtifact, Prediction, RandomForest, Task};
pub use pipeline::{PipelineDefinition, PipelineRunner, RunReport, UnitName};
