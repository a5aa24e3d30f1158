//! In-memory datasets and the flat files they are exchanged through.

pub mod flat_file;
pub mod housing;
pub mod iris;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{ArborError, Result};
use crate::ml::FeatureSchema;

pub use flat_file::{read_numeric_csv, write_numeric_csv, Table};
pub use housing::{HousingRecord, HOUSING_FEATURES, HOUSING_TARGET};

/// Feature matrix plus aligned targets.
///
/// Invariants (checked in [`Dataset::new`]): at least one row, one target
/// per row, every row as wide as the schema, all values finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: FeatureSchema,
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

impl Dataset {
    pub fn new(schema: FeatureSchema, features: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self> {
        schema.validate().map_err(ArborError::Dataset)?;
        if features.is_empty() {
            return Err(ArborError::Dataset("dataset has no rows".to_string()));
        }
        if features.len() != targets.len() {
            return Err(ArborError::Dataset(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let width = schema.width();
        for (idx, row) in features.iter().enumerate() {
            if row.len() != width {
                return Err(ArborError::Dataset(format!(
                    "row {idx} has {} features, schema has {width}",
                    row.len()
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ArborError::Dataset(format!("row {idx} has non-finite values")));
            }
        }
        if let Some(idx) = targets.iter().position(|t| !t.is_finite()) {
            return Err(ArborError::Dataset(format!("target {idx} is not finite")));
        }
        Ok(Self {
            schema,
            features,
            targets,
        })
    }

    /// Build from a feature table and a single-column target table
    pub fn from_tables(x: &Table, y: &Table, target: &str) -> Result<Self> {
        let targets = if y.header.len() == 1 {
            y.rows.iter().map(|r| r[0]).collect()
        } else {
            y.column(target)?
        };
        let schema = FeatureSchema::new(x.header.clone(), target);
        Self::new(schema, x.rows.clone(), targets)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn width(&self) -> usize {
        self.schema.width()
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            schema: self.schema.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }

    /// Shuffle with `seed` and hold out `ceil(test_size * len)` rows
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ArborError::Validation(format!(
                "test_size must be between 0 and 1, got {test_size}"
            )));
        }
        let n = self.len();
        let n_test = (test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(ArborError::Dataset(format!(
                "cannot hold out {n_test} of {n} rows"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test, train) = indices.split_at(n_test);
        Ok((self.subset(train), self.subset(test)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Dataset {
        Dataset::new(
            FeatureSchema::new(["a", "b"], "t"),
            (0..10).map(|i| vec![i as f64, 1.0]).collect(),
            (0..10).map(|i| i as f64).collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_misaligned_inputs() {
        let schema = FeatureSchema::new(["a", "b"], "t");
        assert!(Dataset::new(schema.clone(), vec![vec![1.0, 2.0]], vec![]).is_err());
        assert!(Dataset::new(schema.clone(), vec![vec![1.0]], vec![0.0]).is_err());
        assert!(Dataset::new(schema.clone(), vec![], vec![]).is_err());
        assert!(Dataset::new(schema, vec![vec![1.0, f64::NAN]], vec![0.0]).is_err());
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let data = tiny();
        let (train, test) = data.train_test_split(0.3, 42).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);

        let mut all: Vec<f64> = train.targets().iter().chain(test.targets()).copied().collect();
        all.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(all, data.targets());

        let (train2, test2) = data.train_test_split(0.3, 42).unwrap();
        assert_eq!(train, train2);
        assert_eq!(test, test2);
    }

    #[test]
    fn from_tables_uses_header_as_schema() {
        let x = Table::new(vec!["a".into(), "b".into()], vec![vec![1.0, 2.0]]).unwrap();
        let y = Table::new(vec!["target".into()], vec![vec![3.0]]).unwrap();
        let data = Dataset::from_tables(&x, &y, "target").unwrap();
        assert_eq!(data.schema().features, vec!["a", "b"]);
        assert_eq!(data.targets(), &[3.0]);
    }
}
