#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod bank;
pub mod records;
pub mod schema;
pub mod score;
pub mod types;
pub mod vectorize;

pub use bank::{CategoryClassifier, ModelBank, ModelError};
pub use records::{MedicationMap, PatientRecord, RecordStore, StoreError, StoredRecord};
pub use schema::{FeatureSchema, SchemaError, load_feature_schema, load_medication_catalog};
pub use score::{Predictor, score_from_probability};
pub use types::{CategoryScore, InputError, PatientInput, RiskSummary, Severity, Sex};
pub use vectorize::{MatchPolicy, vectorize};
