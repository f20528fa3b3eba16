//! Patient-to-feature-vector mapping.
//!
//! [`vectorize`] is a deterministic, pure mapping from one validated
//! [`PatientInput`] to a fixed-width numeric row aligned to the feature
//! schema. Every request gets a fresh vector owned by that request alone;
//! nothing here retains state between calls.

use crate::schema::FeatureSchema;
use crate::types::PatientInput;
use ndarray::Array1;

/// Reserved feature name for age in years.
pub const AGE_FEATURE: &str = "AGE_Y";
/// Reserved feature name for weight in kilograms.
pub const WEIGHT_FEATURE: &str = "WEIGHT_KG";
/// Reserved feature name for height in centimeters.
pub const HEIGHT_FEATURE: &str = "HEIGHT_CM";
/// Reserved feature name for the binarized sex code (male 1, female 0).
pub const SEX_FEATURE: &str = "GENDER_CODE";
/// Reserved feature name for the count of distinct recognized medications.
pub const MED_COUNT_FEATURE: &str = "N_MEDS";

/// How free-text medication names are matched against schema feature names.
///
/// The policy is chosen once per predictor and applied uniformly to every
/// request; mixing policies across calls would make otherwise identical
/// inputs vectorize differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Lowercase and trim both sides, then require exact equality. This is
    /// the same column assignment the training pipeline uses, and the
    /// default.
    #[default]
    Exact,
    /// Lowercase, strip commas and parentheses, trim, then accept a
    /// substring match in either direction. Tolerant of brand or dosage
    /// suffixes like "Ibuprofen (200mg)".
    Fuzzy,
}

/// Builds the feature row for one prediction request.
///
/// The row starts as all zeros. Reserved demographic slots are written only
/// when the schema contains them; absent weight/height contribute zero.
/// Medication tokens that match no feature are ignored silently.
pub fn vectorize(schema: &FeatureSchema, input: &PatientInput, policy: MatchPolicy) -> Array1<f64> {
    let mut row = Array1::zeros(schema.width());
    let mut recognized = 0usize;

    for medication in &input.medications {
        let mut hit = false;
        for (idx, feature) in schema.feature_names().iter().enumerate() {
            // Reserved slots are never medication columns.
            if is_reserved(feature) {
                continue;
            }
            if matches_feature(medication, feature, policy) {
                row[idx] = 1.0;
                hit = true;
            }
        }
        if hit {
            recognized += 1;
        }
    }

    for (idx, feature) in schema.feature_names().iter().enumerate() {
        match feature.as_str() {
            AGE_FEATURE => row[idx] = input.age,
            WEIGHT_FEATURE => row[idx] = input.weight_kg.unwrap_or(0.0),
            HEIGHT_FEATURE => row[idx] = input.height_cm.unwrap_or(0.0),
            SEX_FEATURE => row[idx] = input.sex.code(),
            MED_COUNT_FEATURE => row[idx] = recognized as f64,
            _ => {}
        }
    }

    row
}

fn is_reserved(feature: &str) -> bool {
    matches!(
        feature,
        AGE_FEATURE | WEIGHT_FEATURE | HEIGHT_FEATURE | SEX_FEATURE | MED_COUNT_FEATURE
    )
}

fn matches_feature(medication: &str, feature: &str, policy: MatchPolicy) -> bool {
    match policy {
        MatchPolicy::Exact => normalize_exact(medication) == normalize_exact(feature),
        MatchPolicy::Fuzzy => {
            let med = normalize_fuzzy(medication);
            let feat = normalize_fuzzy(feature);
            if med.is_empty() || feat.is_empty() {
                return false;
            }
            med.contains(&feat) || feat.contains(&med)
        }
    }
}

/// Exact-policy normalization: lowercase and trim.
pub fn normalize_exact(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Fuzzy-policy normalization: lowercase, strip commas and parentheses, trim.
pub fn normalize_fuzzy(name: &str) -> String {
    name.to_lowercase()
        .replace([',', '(', ')'], "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sex;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec![
                AGE_FEATURE.into(),
                WEIGHT_FEATURE.into(),
                HEIGHT_FEATURE.into(),
                SEX_FEATURE.into(),
                "ibuprofen".into(),
                MED_COUNT_FEATURE.into(),
            ],
            vec!["Cardiac disorders".into()],
        )
        .unwrap()
    }

    fn input(medications: &[&str]) -> PatientInput {
        PatientInput {
            age: 45.0,
            sex: Sex::Male,
            weight_kg: Some(80.0),
            height_cm: Some(175.0),
            medications: medications.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn reference_patient_vectorizes_in_schema_order() {
        let row = vectorize(&schema(), &input(&["Ibuprofen"]), MatchPolicy::Exact);
        assert_eq!(row.as_slice().unwrap(), &[45.0, 80.0, 175.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn unrecognized_medication_contributes_nothing() {
        let row = vectorize(&schema(), &input(&["Unobtanium"]), MatchPolicy::Exact);
        assert_eq!(row.as_slice().unwrap(), &[45.0, 80.0, 175.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_medication_input_is_valid() {
        let row = vectorize(&schema(), &input(&[]), MatchPolicy::Exact);
        assert_eq!(row.as_slice().unwrap(), &[45.0, 80.0, 175.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn absent_measurements_write_zero() {
        let mut patient = input(&[]);
        patient.weight_kg = None;
        patient.height_cm = None;
        let row = vectorize(&schema(), &patient, MatchPolicy::Exact);
        assert_eq!(row.as_slice().unwrap(), &[45.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn fuzzy_policy_matches_substrings_in_either_direction() {
        let fuzzy_schema = FeatureSchema::new(
            vec!["ibuprofen 200mg".into(), "warfarin".into()],
            vec![],
        )
        .unwrap();
        let patient = input(&["Ibuprofen", "warfarin sodium (oral)"]);
        let row = vectorize(&fuzzy_schema, &patient, MatchPolicy::Fuzzy);
        // "ibuprofen" is a substring of the feature; the feature "warfarin"
        // is a substring of the normalized input.
        assert_eq!(row.as_slice().unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn exact_policy_does_not_fall_back_to_substrings() {
        let strict_schema =
            FeatureSchema::new(vec!["ibuprofen 200mg".into()], vec![]).unwrap();
        let row = vectorize(&strict_schema, &input(&["Ibuprofen"]), MatchPolicy::Exact);
        assert_eq!(row.as_slice().unwrap(), &[0.0]);
    }

    #[test]
    fn med_count_tracks_distinct_recognized_tokens() {
        let two_med_schema = FeatureSchema::new(
            vec!["ibuprofen".into(), "warfarin".into(), MED_COUNT_FEATURE.into()],
            vec![],
        )
        .unwrap();
        let mut patient = input(&[]);
        patient.medications = vec!["Ibuprofen".into(), "Warfarin".into(), "Unknown".into()];
        let row = vectorize(&two_med_schema, &patient, MatchPolicy::Exact);
        assert_eq!(row.as_slice().unwrap(), &[1.0, 1.0, 2.0]);
    }

    #[test]
    fn same_input_always_produces_the_same_row() {
        let patient = input(&["Ibuprofen"]);
        let first = vectorize(&schema(), &patient, MatchPolicy::Exact);
        let second = vectorize(&schema(), &patient, MatchPolicy::Exact);
        assert_eq!(first, second);
    }
}
