//! Fisher's Iris data: 150 rows, 4 features, 3 classes. Embedded so the
//! classifier can be trained without any download.

use super::{flat_file, Dataset};
use crate::error::Result;
use crate::ml::{FeatureSchema, Task};

const RAW: &str = include_str!("iris.csv");

pub const FEATURES: [&str; 4] = ["sepal_length", "sepal_width", "petal_length", "petal_width"];
pub const TARGET: &str = "species";
pub const CLASS_NAMES: [&str; 3] = ["setosa", "versicolor", "virginica"];
pub const TASK: Task = Task::Classification { n_classes: 3 };

pub fn load() -> Result<Dataset> {
    let table = flat_file::parse_numeric_csv(RAW, "iris.csv")?;
    let names: Vec<String> = FEATURES.iter().map(|f| f.to_string()).collect();
    let features = table.select(&names)?;
    let targets = table.column(TARGET)?;
    Dataset::new(FeatureSchema::new(FEATURES, TARGET), features, targets)
}
