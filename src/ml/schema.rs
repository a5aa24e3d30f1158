//! Feature schema: the ordered input columns a model was trained on.
//!
//! The schema travels inside the artifact, so serving never relies on the
//! caller reproducing training-time column order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::SchemaError;

/// Body key for positional requests (`{"data": [..]}`)
pub const POSITIONAL_KEY: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub features: Vec<String>,
    pub target: String,
}

impl FeatureSchema {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new<I, S>(features: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: Self::CURRENT_VERSION,
            features: features.into_iter().map(Into::into).collect(),
            target: target.into(),
        }
    }

    pub fn width(&self) -> usize {
        self.features.len()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version != Self::CURRENT_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {})",
                self.version,
                Self::CURRENT_VERSION
            ));
        }
        if self.features.is_empty() {
            return Err("schema must name at least one feature".to_string());
        }
        let mut seen = HashSet::new();
        for name in &self.features {
            if name.trim().is_empty() {
                return Err("feature names must not be empty".to_string());
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("duplicate feature {name}"));
            }
        }
        if seen.contains(self.target.as_str()) {
            return Err(format!("target {} is also listed as a feature", self.target));
        }
        Ok(())
    }

    /// Map one JSON request body onto a feature vector in schema order.
    ///
    /// Accepts named features (`{"MedInc": 8.3, ...}`) or a positional
    /// array under `"data"`.
    pub fn record_from_json(&self, body: &Value) -> std::result::Result<Vec<f64>, SchemaError> {
        let obj = body.as_object().ok_or(SchemaError::NotAnObject)?;

        let positional = obj.len() == 1 && !self.features.iter().any(|f| f == POSITIONAL_KEY);
        if let (true, Some(Value::Array(values))) = (positional, obj.get(POSITIONAL_KEY)) {
            if values.len() != self.width() {
                return Err(SchemaError::WidthMismatch {
                    expected: self.width(),
                    actual: values.len(),
                });
            }
            return values
                .iter()
                .zip(&self.features)
                .map(|(v, name)| numeric(v, name))
                .collect();
        }

        let missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !obj.contains_key(f.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingFeatures { missing });
        }

        let mut unexpected: Vec<String> = obj
            .keys()
            .filter(|k| !self.features.iter().any(|f| f == *k))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(SchemaError::UnexpectedFeatures { unexpected });
        }

        self.features
            .iter()
            .map(|name| numeric(&obj[name.as_str()], name))
            .collect()
    }
}

fn numeric(value: &Value, name: &str) -> std::result::Result<f64, SchemaError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SchemaError::NotNumeric {
            name: name.to_string(),
        })
}
