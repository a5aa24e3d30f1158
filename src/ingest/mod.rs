//! Data ingestion: copy the housing dataset into the relational store so
//! training no longer depends on the original download.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use crate::adapters::HousingStore;
use crate::dataset::{flat_file, housing, HousingRecord, Table};
use crate::error::{ArborError, Result};

/// What to do when `housing_data` already has rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Leave a populated table untouched
    #[default]
    SkipIfPopulated,
    /// Insert unconditionally; reruns duplicate every row
    Append,
    /// Delete existing rows and insert, in one transaction
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted { rows: u64, replaced: bool },
    Skipped { existing: i64 },
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetch the raw dataset from a local path or an http(s) URL
pub async fn fetch_source(source: &str) -> Result<Table> {
    let content = if is_remote(source) {
        info!(url = source, "Downloading dataset");
        reqwest::get(source)
            .await?
            .error_for_status()?
            .text()
            .await?
    } else {
        tokio::fs::read_to_string(source).await.map_err(|e| {
            ArborError::Dataset(format!("cannot read dataset {source}: {e}"))
        })?
    };
    flat_file::parse_numeric_csv(&content, source)
}

pub async fn load_records(source: &str) -> Result<Vec<HousingRecord>> {
    let table = fetch_source(source).await?;
    let records = housing::records_from_table(&table)?;
    if records.is_empty() {
        return Err(ArborError::Dataset(format!("{source} has no rows")));
    }
    info!(source, rows = records.len(), "Loaded housing dataset");
    Ok(records)
}

/// Write `records` into the store according to `mode`
pub async fn ingest(
    store: &dyn HousingStore,
    records: &[HousingRecord],
    mode: IngestMode,
) -> Result<IngestOutcome> {
    let started = Instant::now();
    store.migrate().await?;

    let existing = store.count_rows().await?;
    if existing > 0 {
        match mode {
            IngestMode::SkipIfPopulated => {
                warn!(
                    existing,
                    "housing_data already populated, skipping (use --mode replace or append)"
                );
                return Ok(IngestOutcome::Skipped { existing });
            }
            IngestMode::Append => {
                warn!(existing, "Appending to a populated table; rows will be duplicated");
            }
            IngestMode::Replace => {
                info!(existing, "Replacing existing rows");
            }
        }
    }

    let replace = mode == IngestMode::Replace;
    let rows = store.insert_records(records, replace).await?;
    info!(
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Data inserted successfully"
    );
    Ok(IngestOutcome::Inserted { rows, replaced: replace })
}
