use arbor::adapters::{HousingStore, MemoryStore, PostgresStore, RegistryClient};
use arbor::api::{self, AppState};
use arbor::cli::{Cli, Commands, PipelineCommands};
use arbor::config::AppConfig;
use arbor::deploy;
use arbor::error::{ArborError, Result};
use arbor::ingest::{self, IngestOutcome};
use arbor::pipeline::{PipelineContext, PipelineDefinition, PipelineRunner, UnitState};
use arbor::training;
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, load_config};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let _log_guard = match &cli.command {
        Commands::Pipeline(PipelineCommands::Describe) => {
            init_logging_simple();
            None
        }
        _ => init_logging(&config.logging),
    };

    match cli.command {
        Commands::Train { out } => {
            let out = out.unwrap_or_else(|| config.model.artifact_path.clone());
            let artifact = training::train_iris(&config.training, &out)?;
            println!("Model trained and saved to {}", out.display());
            for (name, value) in &artifact.metrics {
                println!("  {name}: {value:.4}");
            }
        }
        Commands::Serve { artifact, port } => {
            let path = artifact.unwrap_or_else(|| config.model.artifact_path.clone());
            let timeout = Duration::from_secs(config.server.request_timeout_secs);
            let state = AppState::load(&path, timeout)
                .with_context(|| format!("cannot serve {}", path.display()))?;
            let port = port.unwrap_or(config.server.port);
            api::start_server(state, &config.server.host, port).await?;
        }
        Commands::Ingest {
            source,
            mode,
            dry_run,
        } => {
            let source = source.unwrap_or_else(|| config.ingest.source.clone());
            let mode = mode.unwrap_or(config.ingest.mode);
            let records = ingest::load_records(&source).await?;

            let store: Arc<dyn HousingStore> = if dry_run {
                info!("Dry run: writing to an in-memory store");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(
                    PostgresStore::new(&config.database.url, config.database.max_connections)
                        .await?,
                )
            };

            match ingest::ingest(store.as_ref(), &records, mode).await? {
                IngestOutcome::Inserted { rows, replaced } => {
                    println!(
                        "Inserted {rows} rows{}",
                        if replaced { " (replaced existing data)" } else { "" }
                    );
                }
                IngestOutcome::Skipped { existing } => {
                    println!("housing_data already holds {existing} rows; nothing inserted");
                }
            }
        }
        Commands::Pipeline(cmd) => run_pipeline(cmd, &config).await?,
        Commands::Register { artifact, name } => {
            let path = artifact.unwrap_or_else(|| config.model.artifact_path.clone());
            let name = name.unwrap_or_else(|| config.deploy.model_name.clone());
            let registry = registry_client(&config)?;
            let model = deploy::register(&registry, &path, &name).await?;
            println!(
                "Model registered: {} (id {}, version {})",
                model.name, model.id, model.version
            );
        }
        Commands::Deploy => {
            let registry = registry_client(&config)?;
            let status = deploy::deploy(&registry, &config.deploy).await?;
            println!(
                "Deployment {} is {:?}; scoring URI: {}",
                status.name,
                status.state,
                status.scoring_uri.as_deref().unwrap_or("(none reported)")
            );
        }
    }

    Ok(())
}

fn registry_client(config: &AppConfig) -> Result<RegistryClient> {
    RegistryClient::new(
        &config.deploy.registry_url,
        config.deploy.token.clone(),
        Duration::from_secs(30),
    )
}

async fn run_pipeline(cmd: PipelineCommands, config: &AppConfig) -> Result<()> {
    let definition = PipelineDefinition::housing(&config.pipeline);
    if let PipelineCommands::Describe = cmd {
        println!("{}", serde_json::to_string_pretty(&definition)?);
        return Ok(());
    }

    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    let context = PipelineContext::new(Arc::new(store), &config.pipeline);
    let runner = PipelineRunner::new(definition, Arc::new(context));

    match cmd {
        PipelineCommands::Describe => {}
        PipelineCommands::Run => {
            let report = runner.run_once().await?;
            for unit in &report.units {
                println!(
                    "{:<14} {:<16} attempts={} {}",
                    unit.unit.as_str(),
                    format!("{:?}", unit.state),
                    unit.attempts,
                    unit.error.as_deref().unwrap_or("")
                );
            }
            report.into_result()?;
        }
        PipelineCommands::Task { unit } => {
            let outcome = runner.run_single(unit).await?;
            if outcome.state != UnitState::Success {
                return Err(ArborError::Pipeline {
                    unit: unit.to_string(),
                    reason: outcome.error.unwrap_or_default(),
                });
            }
            println!("{} succeeded after {} attempt(s)", unit, outcome.attempts);
        }
        PipelineCommands::Schedule => {
            let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
            tokio::spawn(async move {
                api::shutdown_signal().await;
                let _ = shutdown_tx.send(());
            });
            runner.run_scheduled(shutdown_rx).await?;
        }
    }
    Ok(())
}
