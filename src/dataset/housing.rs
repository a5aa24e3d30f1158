//! California housing layout: 8 numeric features and a continuous target
//! (median house value in units of $100k).

use super::Table;
use crate::error::{ArborError, Result};
use crate::ml::FeatureSchema;

/// Feature names as published with the dataset; also the JSON keys the
/// prediction service expects.
pub const HOUSING_FEATURES: [&str; 8] = [
    "MedInc",
    "HouseAge",
    "AveRooms",
    "AveBedrms",
    "Population",
    "AveOccup",
    "Latitude",
    "Longitude",
];

pub const HOUSING_TARGET: &str = "target";

/// Accepted spellings of the target column in source files
pub const TARGET_ALIASES: [&str; 2] = ["target", "MedHouseVal"];

/// Identity column written by the database, dropped before training
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HousingRecord {
    pub features: [f64; 8],
    pub target: f64,
}

pub fn schema() -> FeatureSchema {
    FeatureSchema::new(HOUSING_FEATURES, HOUSING_TARGET)
}

/// Extract housing records from a source table. Extra columns are ignored;
/// missing ones are an error.
pub fn records_from_table(table: &Table) -> Result<Vec<HousingRecord>> {
    let feature_idx = HOUSING_FEATURES
        .iter()
        .map(|name| {
            table
                .column_index(name)
                .ok_or_else(|| ArborError::Dataset(format!("source is missing column {name}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let target_idx = table.find_column(&TARGET_ALIASES).ok_or_else(|| {
        ArborError::Dataset(format!(
            "source has no target column (expected one of {})",
            TARGET_ALIASES.join(", ")
        ))
    })?;

    Ok(table
        .rows
        .iter()
        .map(|row| {
            let mut features = [0.0; 8];
            for (slot, &idx) in features.iter_mut().zip(&feature_idx) {
                *slot = row[idx];
            }
            HousingRecord {
                features,
                target: row[target_idx],
            }
        })
        .collect())
}

/// `id,<features>,target` table as extracted from the store
pub fn raw_table(rows: &[(i64, HousingRecord)]) -> Table {
    let header = std::iter::once(ID_COLUMN)
        .chain(HOUSING_FEATURES)
        .chain(std::iter::once(HOUSING_TARGET))
        .map(str::to_string)
        .collect();
    let rows = rows
        .iter()
        .map(|(id, rec)| {
            std::iter::once(*id as f64)
                .chain(rec.features)
                .chain(std::iter::once(rec.target))
                .collect()
        })
        .collect();
    Table { header, rows }
}
