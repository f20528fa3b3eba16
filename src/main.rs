#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::process;

use pharmakon::bank::ModelBank;
use pharmakon::records::{MedicationMap, PatientRecord, RecordStore, StoredRecord};
use pharmakon::schema::{FeatureSchema, load_feature_schema, load_medication_catalog};
use pharmakon::score::Predictor;
use pharmakon::types::{PatientInput, RiskSummary};
use pharmakon::vectorize::MatchPolicy;

const FEATURES_FILE: &str = "feature_names.csv";
const CATEGORIES_FILE: &str = "soc_columns.csv";
const CATALOG_FILE: &str = "medications.csv";
const MODELS_FILE: &str = "models.toml";

#[derive(Clone, Copy, ValueEnum)]
pub enum MedMatchCli {
    Exact,
    Fuzzy,
}

impl From<MedMatchCli> for MatchPolicy {
    fn from(value: MedMatchCli) -> Self {
        match value {
            MedMatchCli::Exact => MatchPolicy::Exact,
            MedMatchCli::Fuzzy => MatchPolicy::Fuzzy,
        }
    }
}

#[derive(Args)]
pub struct PredictArgs {
    /// Patient name for the stored record
    #[arg(long)]
    pub name: String,

    /// Age in years
    #[arg(long)]
    pub age: String,

    /// Sex: male or female
    #[arg(long)]
    pub sex: String,

    /// Weight in kilograms (optional)
    #[arg(long, default_value = "")]
    pub weight: String,

    /// Height in centimeters (optional)
    #[arg(long, default_value = "")]
    pub height: String,

    /// Comma-separated medication names
    #[arg(long, default_value = "")]
    pub meds: String,

    /// How medication names are matched against model features
    #[arg(long, value_enum, default_value_t = MedMatchCli::Exact)]
    pub med_match: MedMatchCli,

    /// Overwrite an existing record instead of inserting a new one
    #[arg(long, value_name = "ID")]
    pub update: Option<i64>,

    /// Score and print without touching the database
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser)]
#[command(name = "pharmakon")]
#[command(about = "Per-category adverse drug reaction risk scoring")]
struct Cli {
    /// Directory holding the schema, catalog and model files
    #[arg(long, default_value = "assets", global = true)]
    assets: PathBuf,

    /// Path to the patient record database
    #[arg(long, default_value = "patients.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one patient and store the record
    #[command(about = "Score a patient (writes one record to the database)")]
    Predict(PredictArgs),

    /// List stored records, newest first
    #[command(about = "List stored patient records")]
    History {
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Display one stored record in full
    #[command(about = "Display a stored record")]
    Show {
        /// Record id
        id: i64,
    },

    /// Delete one stored record
    #[command(about = "Delete a stored record")]
    Delete {
        /// Record id
        id: i64,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let Cli {
        assets,
        db,
        command,
    } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => run_predict(&assets, &db, args),
        Some(Commands::History { limit }) => run_history(&db, limit),
        Some(Commands::Show { id }) => run_show(&db, id),
        Some(Commands::Delete { id }) => run_delete(&db, id),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Loads the scoring context, degrading instead of aborting when schema or
/// model files are unavailable.
fn load_predictor(
    assets: &Path,
    policy: MatchPolicy,
) -> Result<Predictor, Box<dyn std::error::Error>> {
    let schema = match load_feature_schema(
        &assets.join(FEATURES_FILE),
        &assets.join(CATEGORIES_FILE),
    ) {
        Ok(schema) => schema,
        Err(e) => {
            log::warn!("could not load schema from {}: {e}; scoring is disabled", assets.display());
            FeatureSchema::empty()
        }
    };
    let bank = ModelBank::load_or_empty(&assets.join(MODELS_FILE));
    Ok(Predictor::new(schema, bank, policy)?)
}

fn run_predict(
    assets: &Path,
    db: &Path,
    args: PredictArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let PredictArgs {
        name,
        age,
        sex,
        weight,
        height,
        meds,
        med_match,
        update,
        dry_run,
    } = args;

    let input = PatientInput::from_text(&age, &sex, &weight, &height, &meds)?;
    let predictor = load_predictor(assets, med_match.into())?;
    let summary = predictor.score(&input);

    println!("Risk summary for {name}:");
    render_summary(predictor.schema(), &summary);

    if dry_run {
        return Ok(());
    }

    let catalog = match load_medication_catalog(&assets.join(CATALOG_FILE)) {
        Ok(catalog) => catalog,
        Err(e) => {
            log::warn!("could not load medication catalog: {e}; recording input tokens only");
            Vec::new()
        }
    };
    let record = PatientRecord {
        name,
        age: input.age,
        sex: input.sex,
        weight_kg: input.weight_kg,
        height_cm: input.height_cm,
        medications: MedicationMap::build(&catalog, &input.medications),
        summary,
    };

    let store = RecordStore::open(db)?;
    match update {
        Some(id) => {
            if store.update(id, &record)? {
                println!("Updated record {id}.");
            } else {
                return Err(format!("no stored record with id {id}").into());
            }
        }
        None => {
            let id = store.insert(&record)?;
            println!("Stored as record {id}.");
        }
    }
    Ok(())
}

/// Prints one line per category, in schema order so output is stable across
/// runs.
fn render_summary(schema: &FeatureSchema, summary: &RiskSummary) {
    if summary.is_empty() {
        println!("  (no categories scored)");
        return;
    }
    let width = schema
        .category_names()
        .iter()
        .map(|name| name.len())
        .max()
        .unwrap_or(0);
    for category in schema.category_names() {
        if let Some(score) = summary.get(category) {
            println!(
                "  {category:width$}  {prob:6.2}%  {severity}",
                prob = score.prob,
                severity = score.severity
            );
        }
    }
}

fn run_history(db: &Path, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(db)?;
    let headers = store.list(limit)?;
    if headers.is_empty() {
        println!("No stored records.");
        return Ok(());
    }
    for header in headers {
        println!(
            "{:>5}  {}  {} ({}, age {})",
            header.id, header.recorded_at, header.name, header.sex, header.age
        );
    }
    Ok(())
}

fn run_show(db: &Path, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(db)?;
    let Some(stored) = store.get(id)? else {
        return Err(format!("no stored record with id {id}").into());
    };
    let StoredRecord {
        id,
        recorded_at,
        record,
    } = stored;

    println!("Record {id} ({recorded_at})");
    println!("  Name:   {}", record.name);
    println!("  Age:    {}", record.age);
    println!("  Sex:    {}", record.sex);
    match record.weight_kg {
        Some(weight) => println!("  Weight: {weight} kg"),
        None => println!("  Weight: -"),
    }
    match record.height_cm {
        Some(height) => println!("  Height: {height} cm"),
        None => println!("  Height: -"),
    }
    let present = record.medications.present();
    if present.is_empty() {
        println!("  Medications: none");
    } else {
        println!("  Medications: {}", present.iter().join(", "));
    }
    println!("  Risk summary:");
    for (category, score) in record.summary.iter() {
        println!(
            "    {category}: {:.2}% ({})",
            score.prob, score.severity
        );
    }
    Ok(())
}

fn run_delete(db: &Path, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let store = RecordStore::open(db)?;
    if store.delete(id)? {
        println!("Deleted record {id}.");
        Ok(())
    } else {
        Err(format!("no stored record with id {id}").into())
    }
}
