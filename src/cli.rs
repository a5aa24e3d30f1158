use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ingest::IngestMode;
use crate::pipeline::UnitName;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(version)]
#[command(about = "Train, serve and deploy random forest models", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, global = true, default_value = "config", env = "ARBOR_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the Iris classifier and save the artifact
    Train {
        /// Output path (defaults to model.artifact_path)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Serve predictions from a trained artifact over HTTP
    Serve {
        /// Artifact to load (defaults to model.artifact_path)
        #[arg(short, long)]
        artifact: Option<PathBuf>,
        /// Listen port (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load the housing dataset into the relational store
    Ingest {
        /// CSV path or http(s) URL (defaults to ingest.source)
        #[arg(short, long)]
        source: Option<String>,
        /// Behaviour when the table already has rows
        #[arg(short, long, value_enum)]
        mode: Option<IngestMode>,
        /// Parse and validate the source without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Housing training pipeline
    #[command(subcommand)]
    Pipeline(PipelineCommands),
    /// Upload a trained artifact to the model registry
    Register {
        /// Artifact to upload (defaults to model.artifact_path)
        #[arg(short, long)]
        artifact: Option<PathBuf>,
        /// Registry model name (defaults to deploy.model_name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Deploy the registered model as a managed scoring service
    Deploy,
}

#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Print the pipeline definition as JSON
    Describe,
    /// Run every unit once in dependency order
    Run,
    /// Run one unit without its upstream units
    Task {
        #[arg(value_enum)]
        unit: UnitName,
    },
    /// Run on the configured schedule until interrupted
    Schedule,
}
