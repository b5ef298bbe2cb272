use serde::{Deserialize, Serialize};

use super::import::RuleImportError;

/// Minimum down payment enforced for a scoring grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGradeThreshold {
    pub grade: String,
    pub min_pv: f64,
    pub is_active: bool,
}

impl RiskGradeThreshold {
    pub fn new(grade: impl Into<String>, min_pv: f64) -> Self {
        Self {
            grade: grade.into(),
            min_pv,
            is_active: true,
        }
    }

    pub fn matches(&self, grade: &str) -> bool {
        self.is_active && self.grade.trim().eq_ignore_ascii_case(grade.trim())
    }
}

/// Ordered threshold rows, unique by case-insensitive grade.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskGradeTable {
    thresholds: Vec<RiskGradeThreshold>,
}

impl RiskGradeTable {
    pub fn new(thresholds: Vec<RiskGradeThreshold>) -> Result<Self, RuleImportError> {
        let mut seen: Vec<String> = Vec::with_capacity(thresholds.len());
        for threshold in &thresholds {
            let grade = threshold.grade.trim().to_ascii_uppercase();
            if grade.is_empty() {
                return Err(RuleImportError::BlankGrade);
            }
            if !threshold.min_pv.is_finite() || !(0.0..=100.0).contains(&threshold.min_pv) {
                return Err(RuleImportError::InvalidMinimum {
                    grade: threshold.grade.clone(),
                    value: threshold.min_pv,
                });
            }
            if seen.contains(&grade) {
                return Err(RuleImportError::DuplicateGrade {
                    grade: threshold.grade.clone(),
                });
            }
            seen.push(grade);
        }

        Ok(Self { thresholds })
    }

    /// The E and F families at a 20% floor.
    pub fn seeded() -> Self {
        let thresholds = ["E", "E1", "E2", "E3", "E4", "F", "F1", "F2", "F3", "F4"]
            .into_iter()
            .map(|grade| RiskGradeThreshold::new(grade, 20.0))
            .collect();
        Self { thresholds }
    }

    pub fn find_active(&self, grade: &str) -> Option<&RiskGradeThreshold> {
        self.thresholds
            .iter()
            .find(|threshold| threshold.matches(grade))
    }

    pub fn thresholds(&self) -> &[RiskGradeThreshold] {
        &self.thresholds
    }
}
