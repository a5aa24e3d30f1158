pub mod postgres;
pub mod registry;

pub use postgres::{HousingStore, MemoryStore, PostgresStore};
pub use registry::{
    DeploymentRequest, DeploymentState, DeploymentStatus, EnvironmentSpec, InferenceConfig,
    ModelRegistry, RegisterModelRequest, RegisteredModel, RegistryClient, ResourceConfig,
};
