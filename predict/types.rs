// ========================================================================================
//                             Shared Data Contracts
// ========================================================================================

// This file is only for types that are shared between modules, not types that are
// used by a single file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for raw patient input.
///
/// These are user-correctable and are raised before any feature vector is
/// built: invalid input never produces a partial vector or a stored record.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("age must be a non-negative number, got '{0}'")]
    InvalidAge(String),
    #[error("weight must be a non-negative number, got '{0}'")]
    InvalidWeight(String),
    #[error("height must be a non-negative number, got '{0}'")]
    InvalidHeight(String),
    #[error("sex must be 'male' or 'female', got '{0}'")]
    InvalidSex(String),
}

/// Patient sex as consumed by the classifiers' `GENDER_CODE` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    /// The numeric feature encoding: male 1, female 0.
    #[inline]
    pub fn code(self) -> f64 {
        match self {
            Self::Male => 1.0,
            Self::Female => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Female => "female",
            Self::Male => "male",
        }
    }
}

impl FromStr for Sex {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("male") {
            Ok(Self::Male)
        } else if trimmed.eq_ignore_ascii_case("female") {
            Ok(Self::Female)
        } else {
            Err(InputError::InvalidSex(s.to_string()))
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prediction request's input. Created per request and never retained by
/// the scoring core.
#[derive(Debug, Clone)]
pub struct PatientInput {
    pub age: f64,
    pub sex: Sex,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    /// Free-text medication names, deduplicated case-insensitively with the
    /// first-seen casing preserved.
    pub medications: Vec<String>,
}

impl PatientInput {
    /// Builds a validated input from raw form text.
    ///
    /// Empty weight/height fields are treated as absent. Non-numeric or
    /// negative demographic values are rejected outright, never coerced.
    pub fn from_text(
        age: &str,
        sex: &str,
        weight: &str,
        height: &str,
        medications: &str,
    ) -> Result<Self, InputError> {
        let parsed_age =
            parse_non_negative(age).ok_or_else(|| InputError::InvalidAge(age.to_string()))?;
        let sex = Sex::from_str(sex)?;
        let weight_kg = match weight.trim() {
            "" => None,
            text => {
                Some(parse_non_negative(text).ok_or_else(|| InputError::InvalidWeight(text.to_string()))?)
            }
        };
        let height_cm = match height.trim() {
            "" => None,
            text => {
                Some(parse_non_negative(text).ok_or_else(|| InputError::InvalidHeight(text.to_string()))?)
            }
        };
        Ok(Self {
            age: parsed_age,
            sex,
            weight_kg,
            height_cm,
            medications: parse_medication_tokens(medications),
        })
    }
}

fn parse_non_negative(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Splits a comma-separated medication string into distinct tokens,
/// collapsing case-insensitive duplicates while keeping first-seen casing.
pub fn parse_medication_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for raw in text.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }
        if seen.insert(token.to_lowercase()) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

/// Severity bucket derived from a percentage probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "Not Severe")]
    NotSevere,
    Severe,
    Critical,
}

impl Severity {
    /// Buckets a clamped percentage into a severity level.
    ///
    /// The intervals are half-open: a value of exactly 33 or 66 belongs to
    /// the higher bucket. This boundary convention is a user-visible contract.
    pub fn from_percent(pct: f64) -> Self {
        if pct < 33.0 {
            Self::NotSevere
        } else if pct < 66.0 {
            Self::Severe
        } else {
            Self::Critical
        }
    }

    /// The display color token for a computed severity.
    pub fn display_color(self) -> &'static str {
        match self {
            Self::NotSevere => "#22c55e",
            Self::Severe => "#facc15",
            Self::Critical => "#ef4444",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSevere => "Not Severe",
            Self::Severe => "Severe",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Neutral color token for categories that could not be scored.
pub const FALLBACK_COLOR: &str = "#e2e8f0";

/// Per-category result. `prob` is a percentage in `[0, 100]`, rounded to two
/// decimals for storage and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub prob: f64,
    pub severity: Severity,
    pub color: String,
}

impl CategoryScore {
    /// The defined result for a category with no usable classifier.
    pub fn fallback() -> Self {
        Self {
            prob: 0.0,
            severity: Severity::NotSevere,
            color: FALLBACK_COLOR.to_string(),
        }
    }
}

/// A complete scoring result: exactly one entry per schema category.
///
/// Serializes to the persisted `{category: {prob, severity, color}}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskSummary(pub BTreeMap<String, CategoryScore>);

impl RiskSummary {
    pub fn get(&self, category: &str) -> Option<&CategoryScore> {
        self.0.get(category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryScore)> {
        self.0.iter().map(|(name, score)| (name.as_str(), score))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
