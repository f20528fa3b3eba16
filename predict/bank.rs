//! The model bank: pre-trained per-category classifiers.
//!
//! These structs define the public, human-readable format of the model
//! artifact when serialized to a TOML file. The bank is loaded once at
//! startup and treated as read-only from then on; classifiers hold no
//! per-request state, so one shared bank may serve concurrent prediction
//! requests.

use crate::schema::FeatureSchema;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors for model-artifact loading, saving, and inference.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read or write model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML model artifact: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize model bank to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("classifier expects {expected} features, but the feature row has {found}")]
    FeatureWidthMismatch { expected: usize, found: usize },
    #[error("classifier produced a non-finite probability")]
    NonFiniteOutput,
    #[error(
        "model artifact was trained on a different feature list than the loaded schema \
         ({artifact} artifact features vs {schema} schema features); regenerate the \
         artifact or fix the schema sources"
    )]
    SchemaMismatch { artifact: usize, schema: usize },
}

/// One pre-trained binary classifier: a logistic model over the schema's
/// feature row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryClassifier {
    pub intercept: f64,
    /// One weight per schema feature, in schema order.
    pub weights: Vec<f64>,
}

impl CategoryClassifier {
    /// Produces `[P(class = 0), P(class = 1)]` for a single feature row.
    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Result<[f64; 2], ModelError> {
        if row.len() != self.weights.len() {
            return Err(ModelError::FeatureWidthMismatch {
                expected: self.weights.len(),
                found: row.len(),
            });
        }
        let z = self.intercept + row.dot(&ArrayView1::from(self.weights.as_slice()));
        let p = 1.0 / (1.0 + (-z).exp());
        if !p.is_finite() {
            return Err(ModelError::NonFiniteOutput);
        }
        Ok([1.0 - p, p])
    }
}

/// The top-level, self-contained model artifact: one classifier per monitored
/// category, keyed by category name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelBank {
    /// Training-time feature order. Older artifacts omit this; when present
    /// it is cross-checked against the loaded schema at predictor
    /// construction.
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub models: HashMap<String, CategoryClassifier>,
}

impl ModelBank {
    /// The degenerate bank: every category scores as the zero-risk fallback.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads the artifact, degrading to an empty bank if it is missing or
    /// unreadable. The system stays usable either way.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(bank) => {
                log::info!(
                    "loaded {} category classifiers from {}",
                    bank.len(),
                    path.display()
                );
                bank
            }
            Err(e) => {
                log::warn!(
                    "could not load model artifact from {}: {e}; continuing with an empty bank",
                    path.display()
                );
                Self::empty()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn classifier(&self, category: &str) -> Option<&CategoryClassifier> {
        self.models.get(category)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Fails when the artifact records a training feature list that diverges
    /// from the loaded schema. Per-classifier width problems are deliberately
    /// not fatal here; they are recovered per category at scoring time.
    pub fn validate_against(&self, schema: &FeatureSchema) -> Result<(), ModelError> {
        if !self.feature_names.is_empty() && self.feature_names != schema.feature_names() {
            return Err(ModelError::SchemaMismatch {
                artifact: self.feature_names.len(),
                schema: schema.width(),
            });
        }
        Ok(())
    }
}
