//! Scoring orchestration.
//!
//! The [`Predictor`] is the immutable context object holding the loaded
//! schema, model bank and matching policy. It is constructed once at startup
//! and then only read: [`Predictor::score`] is a pure function of its input,
//! safe to call repeatedly and from several threads at once.

use crate::bank::{ModelBank, ModelError};
use crate::schema::FeatureSchema;
use crate::types::{CategoryScore, PatientInput, RiskSummary, Severity};
use crate::vectorize::{MatchPolicy, vectorize};
use ndarray::Array1;
use std::collections::BTreeMap;

/// The process-wide scoring context.
#[derive(Debug)]
pub struct Predictor {
    schema: FeatureSchema,
    bank: ModelBank,
    policy: MatchPolicy,
}

impl Predictor {
    /// Builds the scoring context.
    ///
    /// Fails only when the artifact's recorded feature list diverges from the
    /// schema; an empty schema or an empty bank is a valid degenerate state.
    pub fn new(
        schema: FeatureSchema,
        bank: ModelBank,
        policy: MatchPolicy,
    ) -> Result<Self, ModelError> {
        bank.validate_against(&schema)?;
        if bank.is_empty() {
            log::warn!("model bank is empty; every category will score as the zero-risk fallback");
        }
        Ok(Self {
            schema,
            bank,
            policy,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Exposed separately from [`Predictor::score`] so the mapping can be
    /// tested and so alternative shells can inspect the feature row.
    pub fn vectorize(&self, input: &PatientInput) -> Array1<f64> {
        vectorize(&self.schema, input, self.policy)
    }

    /// Scores every schema category.
    ///
    /// The result is total over the category list: a category without a
    /// usable classifier gets the zero-risk fallback, and one category's
    /// failure never aborts the rest of the pass.
    pub fn score(&self, input: &PatientInput) -> RiskSummary {
        let row = self.vectorize(input);
        let mut categories = BTreeMap::new();
        for category in self.schema.category_names() {
            let result = match self.bank.classifier(category) {
                None => CategoryScore::fallback(),
                Some(classifier) => match classifier.predict_proba(row.view()) {
                    Ok([_, p1]) => score_from_probability(p1),
                    Err(e) => {
                        log::warn!(
                            "classifier for '{category}' failed: {e}; using the zero-risk fallback"
                        );
                        CategoryScore::fallback()
                    }
                },
            };
            categories.insert(category.clone(), result);
        }
        RiskSummary(categories)
    }
}

/// Maps one raw classifier probability in `[0, 1]` to a category result.
///
/// The percentage is clamped into `[0, 100]` to defend against numerically
/// out-of-range classifier output. Severity is bucketed on the unrounded
/// value; only the stored probability is rounded to two decimals, so a value
/// like 33.0001 cannot round down across a severity boundary.
pub fn score_from_probability(probability: f64) -> CategoryScore {
    if !probability.is_finite() {
        return CategoryScore::fallback();
    }
    let pct = (probability * 100.0).clamp(0.0, 100.0);
    let severity = Severity::from_percent(pct);
    CategoryScore {
        prob: round2(pct),
        severity,
        color: severity.display_color().to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::CategoryClassifier;
    use crate::types::{FALLBACK_COLOR, Sex};

    fn patient() -> PatientInput {
        PatientInput {
            age: 45.0,
            sex: Sex::Male,
            weight_kg: Some(80.0),
            height_cm: Some(175.0),
            medications: vec!["Ibuprofen".into()],
        }
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            vec!["AGE_Y".into(), "GENDER_CODE".into(), "ibuprofen".into()],
            vec![
                "Cardiac disorders".into(),
                "Eye disorders".into(),
                "Nervous system disorders".into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn result_is_total_over_all_categories() {
        let mut bank = ModelBank::empty();
        bank.models.insert(
            "Cardiac disorders".into(),
            CategoryClassifier {
                intercept: 0.0,
                weights: vec![0.0, 0.0, 0.0],
            },
        );
        let predictor = Predictor::new(schema(), bank, MatchPolicy::Exact).unwrap();
        let summary = predictor.score(&patient());
        assert_eq!(summary.len(), 3);
        for category in predictor.schema().category_names() {
            assert!(summary.get(category).is_some());
        }
    }

    #[test]
    fn empty_bank_scores_every_category_as_fallback() {
        let predictor =
            Predictor::new(schema(), ModelBank::empty(), MatchPolicy::Exact).unwrap();
        let summary = predictor.score(&patient());
        assert_eq!(summary.len(), 3);
        for (_, score) in summary.iter() {
            assert_eq!(score.prob, 0.0);
            assert_eq!(score.severity, Severity::NotSevere);
            assert_eq!(score.color, FALLBACK_COLOR);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut bank = ModelBank::empty();
        bank.models.insert(
            "Eye disorders".into(),
            CategoryClassifier {
                intercept: -1.0,
                weights: vec![0.02, 0.5, 1.0],
            },
        );
        let predictor = Predictor::new(schema(), bank, MatchPolicy::Exact).unwrap();
        let first = predictor.score(&patient());
        let second = predictor.score(&patient());
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_classifier_is_isolated_to_its_category() {
        let mut bank = ModelBank::empty();
        // Wrong width: this classifier cannot consume the 3-wide row.
        bank.models.insert(
            "Cardiac disorders".into(),
            CategoryClassifier {
                intercept: 0.0,
                weights: vec![1.0],
            },
        );
        bank.models.insert(
            "Eye disorders".into(),
            CategoryClassifier {
                intercept: 0.0,
                weights: vec![0.0, 0.0, 0.0],
            },
        );
        let predictor = Predictor::new(schema(), bank, MatchPolicy::Exact).unwrap();
        let summary = predictor.score(&patient());

        let broken = summary.get("Cardiac disorders").unwrap();
        assert_eq!(broken.prob, 0.0);
        assert_eq!(broken.color, FALLBACK_COLOR);

        let healthy = summary.get("Eye disorders").unwrap();
        assert_eq!(healthy.prob, 50.0);
        assert_eq!(healthy.severity, Severity::Severe);
    }

    #[test]
    fn out_of_range_probability_is_clamped() {
        let score = score_from_probability(1.3);
        assert_eq!(score.prob, 100.0);
        assert_eq!(score.severity, Severity::Critical);

        let score = score_from_probability(-0.2);
        assert_eq!(score.prob, 0.0);
        assert_eq!(score.severity, Severity::NotSevere);
    }

    #[test]
    fn non_finite_probability_falls_back() {
        let score = score_from_probability(f64::NAN);
        assert_eq!(score, CategoryScore::fallback());
    }

    #[test]
    fn severity_buckets_on_the_unrounded_percentage() {
        // 32.9999% rounds to 33.00 for display but stays NotSevere.
        let score = score_from_probability(0.329_999);
        assert_eq!(score.prob, 33.0);
        assert_eq!(score.severity, Severity::NotSevere);

        let score = score_from_probability(0.5);
        assert_eq!(score.prob, 50.0);
        assert_eq!(score.severity, Severity::Severe);

        let score = score_from_probability(0.66);
        assert_eq!(score.severity, Severity::Critical);
    }

    #[test]
    fn empty_schema_yields_an_empty_but_valid_result() {
        let predictor = Predictor::new(
            FeatureSchema::empty(),
            ModelBank::empty(),
            MatchPolicy::Exact,
        )
        .unwrap();
        let summary = predictor.score(&patient());
        assert!(summary.is_empty());
    }
}
