//! Feature schema and reference-catalog loading.
//!
//! This module is the exclusive entry point for the external tabular sources
//! that define the scoring layout: the ordered feature-name list, the ordered
//! category-name list, and the medication catalog. Order is authoritative.
//! The feature list defines vector indexing, the category list defines result
//! ordering, and both must remain stable across runs for stored records to
//! stay comparable.
//!
//! Failures here are assumed to be deployment problems (missing or empty
//! files); callers degrade to [`FeatureSchema::empty`] instead of aborting.

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading the schema sources.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema source: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse schema source: {0}")]
    Csv(#[from] csv::Error),
    #[error("schema source '{0}' contains no entries")]
    Empty(String),
    #[error("duplicate feature name '{0}' in the feature list")]
    DuplicateFeature(String),
}

/// The ordered list of feature names the model bank expects, plus the ordered
/// list of category names it scores.
///
/// Loaded once at startup and immutable for the process lifetime. Index `i`
/// of every feature vector corresponds to `feature_names()[i]`.
#[derive(Debug, Clone, Default)]
pub struct FeatureSchema {
    feature_names: Vec<String>,
    category_names: Vec<String>,
}

impl FeatureSchema {
    /// Validates feature-name uniqueness (case-insensitive). Fields stay
    /// private so a constructed schema cannot lose that invariant.
    pub fn new(
        feature_names: Vec<String>,
        category_names: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(feature_names.len());
        for name in &feature_names {
            if !seen.insert(name.to_lowercase()) {
                return Err(SchemaError::DuplicateFeature(name.clone()));
            }
        }
        Ok(Self {
            feature_names,
            category_names,
        })
    }

    /// The degraded schema used when the external sources are unavailable.
    /// Scoring against it yields an empty (but valid) result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn category_names(&self) -> &[String] {
        &self.category_names
    }

    /// The fixed feature-vector width.
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_names.is_empty() && self.category_names.is_empty()
    }
}

/// Loads the feature schema from its two single-column sources.
pub fn load_feature_schema(
    features_path: &Path,
    categories_path: &Path,
) -> Result<FeatureSchema, SchemaError> {
    let feature_names = load_name_column(features_path)?;
    let category_names = load_name_column(categories_path)?;
    FeatureSchema::new(feature_names, category_names)
}

/// Reads one trimmed, non-empty entry per line from a single-column source.
pub fn load_name_column(path: &Path) -> Result<Vec<String>, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(first) = record.get(0) {
            let name = first.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    if names.is_empty() {
        return Err(SchemaError::Empty(path.display().to_string()));
    }
    Ok(names)
}

/// Column index of the medication name in the reference catalog.
const CATALOG_NAME_COLUMN: usize = 2;

/// Loads medication names from the third column of the reference catalog,
/// deduplicated case-insensitively with the first-seen casing preserved.
///
/// The catalog is produced upstream in Latin-1, so rows are read as bytes and
/// decoded lossily. An empty catalog is valid: the presence map then covers
/// only the typed input tokens.
pub fn load_medication_catalog(path: &Path) -> Result<Vec<String>, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut seen = HashSet::new();
    let mut medications = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        let Some(raw) = record.get(CATALOG_NAME_COLUMN) else {
            continue;
        };
        let value = String::from_utf8_lossy(raw);
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.to_lowercase()) {
            medications.push(value.to_string());
        }
    }
    Ok(medications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_names_in_file_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let features = dir.path().join("feature_names.csv");
        let categories = dir.path().join("soc_columns.csv");
        fs::write(&features, "AGE_Y\nGENDER_CODE\nibuprofen\n")?;
        fs::write(&categories, "Cardiac disorders\nEye disorders\n")?;

        let schema = load_feature_schema(&features, &categories)?;
        assert_eq!(schema.feature_names(), ["AGE_Y", "GENDER_CODE", "ibuprofen"]);
        assert_eq!(schema.category_names(), ["Cardiac disorders", "Eye disorders"]);
        assert_eq!(schema.width(), 3);
        Ok(())
    }

    #[test]
    fn empty_source_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.csv");
        fs::write(&path, "\n\n")?;
        assert!(matches!(load_name_column(&path), Err(SchemaError::Empty(_))));
        Ok(())
    }

    #[test]
    fn missing_source_is_an_error() {
        let result = load_name_column(Path::new("does/not/exist.csv"));
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_feature_names_are_rejected() {
        let result = FeatureSchema::new(
            vec!["AGE_Y".into(), "age_y".into()],
            vec!["Cardiac disorders".into()],
        );
        assert!(matches!(result, Err(SchemaError::DuplicateFeature(_))));
    }

    #[test]
    fn catalog_keeps_first_seen_casing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("medications.csv");
        fs::write(
            &path,
            "1,N02BE01,Paracetamol\n2,M01AE01,IBUPROFEN\n3,M01AE01,ibuprofen\n4,,\n",
        )?;
        let catalog = load_medication_catalog(&path)?;
        assert_eq!(catalog, ["Paracetamol", "IBUPROFEN"]);
        Ok(())
    }

    #[test]
    fn catalog_ignores_short_rows() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("medications.csv");
        fs::write(&path, "1,short\n2,M01AE01,Ibuprofen\n")?;
        let catalog = load_medication_catalog(&path)?;
        assert_eq!(catalog, ["Ibuprofen"]);
        Ok(())
    }
}
