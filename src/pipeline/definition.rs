//! Declarative description of the housing pipeline: named units, their
//! dependencies and the recurring trigger. This is what an external
//! scheduler consumes (`arbor pipeline describe`).

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::config::PipelineConfig;
use crate::error::{ArborError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum UnitName {
    ExtractData,
    PrepareData,
    TrainModel,
}

impl UnitName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractData => "extract_data",
            Self::PrepareData => "prepare_data",
            Self::TrainModel => "train_model",
        }
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    #[serde(rename = "@hourly")]
    Hourly,
    #[serde(rename = "@daily")]
    Daily,
}

impl Schedule {
    /// First trigger strictly after `now`. Only the next boundary is ever
    /// returned, so runs missed while nothing was scheduling are not
    /// backfilled.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        match self {
            Self::Daily => {
                let midnight = today.and_time(NaiveTime::MIN);
                DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc) + Duration::days(1)
            }
            Self::Hourly => {
                let hour = today
                    .and_hms_opt(now.hour(), 0, 0)
                    .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                    .unwrap_or(now);
                hour + Duration::hours(1)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSpec {
    pub name: UnitName,
    pub upstream: Vec<UnitName>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineDefinition {
    pub pipeline_id: String,
    pub owner: String,
    pub start_date: NaiveDate,
    pub schedule: Schedule,
    /// Never backfill intervals missed before the first scheduled run
    pub catchup: bool,
    /// Extra attempts per unit
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub units: Vec<UnitSpec>,
}

impl PipelineDefinition {
    /// extract_data -> prepare_data -> train_model
    pub fn housing(cfg: &PipelineConfig) -> Self {
        let unit = |name, upstream: &[UnitName], description: &str| UnitSpec {
            name,
            upstream: upstream.to_vec(),
            description: description.to_string(),
        };
        Self {
            pipeline_id: "housing_ml_pipeline".to_string(),
            owner: "ml-platform".to_string(),
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            schedule: cfg.schedule,
            catchup: false,
            retries: cfg.retries,
            retry_delay_secs: cfg.retry_delay_secs,
            units: vec![
                unit(
                    UnitName::ExtractData,
                    &[],
                    "housing_data table -> raw_data.csv",
                ),
                unit(
                    UnitName::PrepareData,
                    &[UnitName::ExtractData],
                    "raw_data.csv -> X.csv + y.csv",
                ),
                unit(
                    UnitName::TrainModel,
                    &[UnitName::PrepareData],
                    "X.csv + y.csv -> model artifact",
                ),
            ],
        }
    }

    pub fn unit(&self, name: UnitName) -> Option<&UnitSpec> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Units in dependency order; errors on unknown upstreams or cycles
    pub fn execution_order(&self) -> Result<Vec<UnitName>> {
        let mut indegree: HashMap<UnitName, usize> = HashMap::new();
        let mut downstream: HashMap<UnitName, Vec<UnitName>> = HashMap::new();
        for unit in &self.units {
            if indegree.insert(unit.name, unit.upstream.len()).is_some() {
                return Err(ArborError::Validation(format!("unit {} declared twice", unit.name)));
            }
        }
        for unit in &self.units {
            for up in &unit.upstream {
                if !indegree.contains_key(up) {
                    return Err(ArborError::Validation(format!(
                        "unit {} depends on unknown unit {up}",
                        unit.name
                    )));
                }
                downstream.entry(*up).or_default().push(unit.name);
            }
        }

        // Declaration order breaks ties.
        let mut ready: VecDeque<UnitName> = self
            .units
            .iter()
            .filter(|u| u.upstream.is_empty())
            .map(|u| u.name)
            .collect();
        let mut order = Vec::with_capacity(self.units.len());
        while let Some(name) = ready.pop_front() {
            order.push(name);
            for next in downstream.get(&name).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(*next);
                    }
                }
            }
        }

        if order.len() != self.units.len() {
            return Err(ArborError::Validation(
                "pipeline units form a cycle".to_string(),
            ));
        }
        Ok(order)
    }
}
