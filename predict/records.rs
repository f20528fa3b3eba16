//! Patient record persistence.
//!
//! A thin repository over a local SQLite file. The row layout matches the
//! long-lived `patients` table: demographics as plain columns plus two JSON
//! payloads, `medications_json` (the `{medication: 0|1}` presence map) and
//! `summary_json` (the `{category: {prob, severity, color}}` result map).
//! Columns added after the first release are created in place, so databases
//! written by older builds keep working.

use crate::types::{RiskSummary, Sex};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored record is malformed: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("stored record has an invalid sex value '{0}'")]
    MalformedSex(String),
}

/// The persisted medication presence map: every known medication with 1 when
/// the patient takes it, 0 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicationMap(pub BTreeMap<String, u8>);

impl MedicationMap {
    /// Marks each catalog entry present when an input token matches it
    /// exactly (case-insensitive) or, failing that, by substring in either
    /// direction. With an empty catalog the map is built over the input
    /// tokens themselves so the record stays self-describing.
    pub fn build(catalog: &[String], tokens: &[String]) -> Self {
        if catalog.is_empty() {
            return Self(tokens.iter().map(|token| (token.clone(), 1)).collect());
        }
        let mut map: BTreeMap<String, u8> =
            catalog.iter().map(|name| (name.clone(), 0)).collect();
        for token in tokens {
            let key = token.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let exact = catalog.iter().find(|name| name.to_lowercase() == key);
            let matched = exact.or_else(|| {
                catalog.iter().find(|name| {
                    let lowered = name.to_lowercase();
                    lowered.contains(&key) || key.contains(&lowered)
                })
            });
            if let Some(name) = matched {
                map.insert(name.clone(), 1);
            }
        }
        Self(map)
    }

    /// Medications marked present, for re-populating an input form.
    pub fn present(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|&(_, &flag)| flag == 1)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// One patient row as written by a prediction request.
#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub name: String,
    pub age: f64,
    pub sex: Sex,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub medications: MedicationMap,
    pub summary: RiskSummary,
}

/// A stored row with its identity and timestamp, as returned by lookups.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: i64,
    pub recorded_at: String,
    pub record: PatientRecord,
}

/// Browse-level view of a stored row, without the JSON payloads.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub id: i64,
    pub name: String,
    pub age: f64,
    pub sex: Sex,
    pub recorded_at: String,
}

type RawRow = (
    i64,
    String,
    f64,
    String,
    Option<f64>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<String>,
);

const RECORD_COLUMNS: &str =
    "id, name, age, sex, weight, height, medications_json, summary_json, timestamp";

/// Repository over the `patients` table.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open(path)?,
        };
        store.ensure_layout()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_layout()?;
        Ok(store)
    }

    fn ensure_layout(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                age REAL,
                sex TEXT,
                summary_json TEXT
            )",
            [],
        )?;
        self.ensure_column("weight", "REAL")?;
        self.ensure_column("height", "REAL")?;
        self.ensure_column("medications_json", "TEXT")?;
        self.ensure_column("timestamp", "TEXT")?;
        Ok(())
    }

    fn ensure_column(&self, name: &str, sql_type: &str) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(patients)")?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;
        if !existing.iter().any(|column| column == name) {
            self.conn.execute(
                &format!("ALTER TABLE patients ADD COLUMN {name} {sql_type}"),
                [],
            )?;
        }
        Ok(())
    }

    /// Inserts a new row and returns its id. The row is written in one
    /// statement: a failed insert leaves no partial record.
    pub fn insert(&self, record: &PatientRecord) -> Result<i64, StoreError> {
        let medications_json = serde_json::to_string(&record.medications)?;
        let summary_json = serde_json::to_string(&record.summary)?;
        let timestamp = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO patients (name, age, sex, weight, height, medications_json, summary_json, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.name,
                record.age,
                record.sex.as_str(),
                record.weight_kg,
                record.height_cm,
                medications_json,
                summary_json,
                timestamp
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrites an existing row. Returns false when the id does not exist.
    pub fn update(&self, id: i64, record: &PatientRecord) -> Result<bool, StoreError> {
        let medications_json = serde_json::to_string(&record.medications)?;
        let summary_json = serde_json::to_string(&record.summary)?;
        let timestamp = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE patients
             SET name = ?1, age = ?2, sex = ?3, weight = ?4, height = ?5,
                 medications_json = ?6, summary_json = ?7, timestamp = ?8
             WHERE id = ?9",
            params![
                record.name,
                record.age,
                record.sex.as_str(),
                record.weight_kg,
                record.height_cm,
                medications_json,
                summary_json,
                timestamp,
                id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredRecord>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM patients WHERE id = ?1"),
                params![id],
                Self::raw_row,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    /// The most recently inserted row, if any.
    pub fn latest(&self) -> Result<Option<StoredRecord>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM patients ORDER BY id DESC LIMIT 1"),
                [],
                Self::raw_row,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    /// Browse headers, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<RecordHeader>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, age, sex, timestamp FROM patients ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        let mut headers = Vec::new();
        for row in rows {
            let (id, name, age, sex_text, timestamp) = row?;
            let sex = Sex::from_str(&sex_text)
                .map_err(|_| StoreError::MalformedSex(sex_text.clone()))?;
            headers.push(RecordHeader {
                id,
                name,
                age,
                sex,
                recorded_at: timestamp.unwrap_or_default(),
            });
        }
        Ok(headers)
    }

    /// Returns false when the id does not exist.
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ))
    }

    fn decode(raw: RawRow) -> Result<StoredRecord, StoreError> {
        let (id, name, age, sex_text, weight, height, medications_json, summary_json, timestamp) =
            raw;
        let sex =
            Sex::from_str(&sex_text).map_err(|_| StoreError::MalformedSex(sex_text.clone()))?;
        let medications = match medications_json {
            Some(json) => serde_json::from_str(&json)?,
            None => MedicationMap(BTreeMap::new()),
        };
        let summary = match summary_json {
            Some(json) => serde_json::from_str(&json)?,
            None => RiskSummary(BTreeMap::new()),
        };
        Ok(StoredRecord {
            id,
            recorded_at: timestamp.unwrap_or_default(),
            record: PatientRecord {
                name,
                age,
                sex,
                weight_kg: weight,
                height_cm: height,
                medications,
                summary,
            },
        })
    }
}
