//! Tree-ensemble models (CPU-only, deterministic).
//!
//! Fitting and inference live in-crate so an artifact is plain JSON and a
//! serving process needs nothing beyond this library to load it.

pub mod artifact;
pub mod forest;
pub mod metrics;
pub mod schema;
pub mod tree;

pub use artifact::{ModelArtifact, Prediction, ARTIFACT_FORMAT_VERSION};
pub use forest::{ForestParams, MaxFeatures, RandomForest, Task};
pub use schema::FeatureSchema;
pub use tree::{Criterion, DecisionTree, Node};
