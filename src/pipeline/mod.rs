//! Housing training pipeline: extract_data -> prepare_data -> train_model,
//! triggered daily with one retry per unit and no catch-up.

pub mod definition;
pub mod runner;
pub mod tasks;

pub use definition::{PipelineDefinition, Schedule, UnitName, UnitSpec};
pub use runner::{PipelineRunner, RunReport, UnitOutcome, UnitState};
pub use tasks::{PipelineContext, PipelinePaths, UnitExecutor};
