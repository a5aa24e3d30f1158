//! Runs a [`PipelineDefinition`] against a [`UnitExecutor`]: dependency
//! order, per-unit retries, and the recurring trigger.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::definition::{PipelineDefinition, UnitName};
use super::tasks::UnitExecutor;
use crate::error::{ArborError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Success,
    Failed,
    /// Not started because a unit it depends on failed
    UpstreamFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub unit: UnitName,
    pub state: UnitState,
    pub attempts: u32,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units: Vec<UnitOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.units.iter().all(|u| u.state == UnitState::Success)
    }

    pub fn outcome(&self, unit: UnitName) -> Option<&UnitOutcome> {
        self.units.iter().find(|u| u.unit == unit)
    }

    /// Error for the first failed unit, if any
    pub fn into_result(self) -> Result<Self> {
        let failed = self.units.iter().find(|u| u.state == UnitState::Failed);
        match failed {
            Some(outcome) => Err(ArborError::Pipeline {
                unit: outcome.unit.to_string(),
                reason: outcome.error.clone().unwrap_or_default(),
            }),
            None => Ok(self),
        }
    }
}

pub struct PipelineRunner {
    definition: PipelineDefinition,
    executor: Arc<dyn UnitExecutor>,
    retry_delay: Duration,
}

impl PipelineRunner {
    pub fn new(definition: PipelineDefinition, executor: Arc<dyn UnitExecutor>) -> Self {
        let retry_delay = Duration::from_secs(definition.retry_delay_secs);
        Self {
            definition,
            executor,
            retry_delay,
        }
    }

    /// Override the wait between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// One attempt plus `retries` more, sleeping `retry_delay` in between
    async fn run_with_retries(&self, unit: UnitName) -> UnitOutcome {
        let started = Instant::now();
        let max_attempts = self.definition.retries + 1;
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            attempts += 1;
            match self.executor.execute(unit).await {
                Ok(()) => {
                    info!(unit = %unit, attempts, "Unit succeeded");
                    last_error = None;
                    break;
                }
                Err(e) => {
                    if attempts < max_attempts {
                        warn!(unit = %unit, attempt = attempts, error = %e, "Unit failed, retrying");
                        tokio::time::sleep(self.retry_delay).await;
                    } else {
                        error!(unit = %unit, attempts, error = %e, "Unit failed");
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        UnitOutcome {
            unit,
            state: if last_error.is_none() {
                UnitState::Success
            } else {
                UnitState::Failed
            },
            attempts,
            error: last_error,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Run every unit once in dependency order. A failed unit marks its
    /// downstream units as upstream-failed instead of running them.
    pub async fn run_once(&self) -> Result<RunReport> {
        let order = self.definition.execution_order()?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, pipeline = %self.definition.pipeline_id, "Pipeline run started");

        let mut units: Vec<UnitOutcome> = Vec::with_capacity(order.len());
        for name in order {
            let blocked = self
                .definition
                .unit(name)
                .map(|spec| {
                    spec.upstream.iter().any(|up| {
                        units
                            .iter()
                            .any(|o| o.unit == *up && o.state != UnitState::Success)
                    })
                })
                .unwrap_or(false);

            if blocked {
                warn!(unit = %name, "Skipping unit, upstream failed");
                units.push(UnitOutcome {
                    unit: name,
                    state: UnitState::UpstreamFailed,
                    attempts: 0,
                    error: None,
                    elapsed_ms: 0,
                });
                continue;
            }
            units.push(self.run_with_retries(name).await);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            units,
        };
        info!(%run_id, succeeded = report.succeeded(), "Pipeline run finished");
        Ok(report)
    }

    /// Run a single unit (with retries) without its upstream units
    pub async fn run_single(&self, unit: UnitName) -> Result<UnitOutcome> {
        if self.definition.unit(unit).is_none() {
            return Err(ArborError::NotFound(format!("pipeline unit {unit}")));
        }
        Ok(self.run_with_retries(unit).await)
    }

    /// Trigger `run_once` at each schedule boundary until `shutdown` fires.
    /// Boundaries missed while a run was in progress are dropped.
    pub async fn run_scheduled(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            let now = Utc::now();
            let next = self.definition.schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "Waiting for next scheduled run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    match self.run_once().await {
                        Ok(report) if report.succeeded() => {}
                        Ok(report) => warn!(run_id = %report.run_id, "Scheduled run failed"),
                        Err(e) => error!(error = %e, "Scheduled run could not start"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Scheduler shutting down");
                    return Ok(());
                }
            }
        }
    }
}
