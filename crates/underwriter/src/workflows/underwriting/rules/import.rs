use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::grades::{RiskGradeTable, RiskGradeThreshold};
use super::RuleEntry;

#[derive(Debug, thiserror::Error)]
pub enum RuleImportError {
    #[error("failed to read rule table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid rule CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("risk grade rows must name a grade")]
    BlankGrade,
    #[error("risk grade {grade} is listed more than once")]
    DuplicateGrade { grade: String },
    #[error("risk grade {grade} has an out-of-range minimum down payment {value}")]
    InvalidMinimum { grade: String, value: f64 },
}

/// Read `category,rule_key,value,value_type` rows.
pub fn read_rule_entries<R: Read>(reader: R) -> Result<Vec<RuleEntry>, RuleImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for record in csv_reader.deserialize::<RuleEntry>() {
        entries.push(record?);
    }

    Ok(entries)
}

pub fn load_rule_entries<P: AsRef<Path>>(path: P) -> Result<Vec<RuleEntry>, RuleImportError> {
    let file = std::fs::File::open(path)?;
    read_rule_entries(file)
}

/// Read `grade,min_pv,is_active` rows. A blank `is_active` counts as active.
pub fn read_risk_grades<R: Read>(reader: R) -> Result<RiskGradeTable, RuleImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut thresholds = Vec::new();
    for record in csv_reader.deserialize::<GradeRow>() {
        let row = record?;
        thresholds.push(RiskGradeThreshold {
            grade: row.grade,
            min_pv: row.min_pv,
            is_active: row.is_active.unwrap_or(true),
        });
    }

    RiskGradeTable::new(thresholds)
}

pub fn load_risk_grades<P: AsRef<Path>>(path: P) -> Result<RiskGradeTable, RuleImportError> {
    let file = std::fs::File::open(path)?;
    read_risk_grades(file)
}

#[derive(Debug, Deserialize)]
struct GradeRow {
    grade: String,
    min_pv: f64,
    #[serde(default, deserialize_with = "flexible_bool")]
    is_active: Option<bool>,
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean, got '{other}'"
        ))),
    }
}
