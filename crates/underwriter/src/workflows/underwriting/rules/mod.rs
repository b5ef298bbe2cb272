//! Underwriting rule configuration.
//!
//! Stored rule rows are resolved once into an immutable [`RuleBook`] against the declarative
//! [`RULE_SCHEMA`]. Every key the engine reads has a default, so a missing or broken row never
//! stops an evaluation.

mod grades;
mod import;
mod schema;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::workflows::underwriting::domain::Decision;

pub use grades::{RiskGradeTable, RiskGradeThreshold};
pub use import::{
    load_risk_grades, load_rule_entries, read_risk_grades, read_rule_entries, RuleImportError,
};
pub use schema::{RuleCategory, RuleKey, RuleSpec, RuleValue, ValueType, RULE_SCHEMA};

/// A rule row as persisted by the configuration store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(default)]
    pub category: Option<String>,
    pub rule_key: String,
    pub value: String,
    #[serde(default)]
    pub value_type: Option<ValueType>,
}

impl RuleEntry {
    pub fn new(key: RuleKey, value: impl Into<String>) -> Self {
        Self {
            category: Some(key.category().label().to_string()),
            rule_key: key.as_str().to_string(),
            value: value.into(),
            value_type: Some(key.default_value().value_type()),
        }
    }
}

/// Stored rule rows held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    entries: Vec<RuleEntry>,
}

impl RuleTable {
    pub fn new(entries: Vec<RuleEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Default,
    Stored,
}

/// Resolved rule as exposed to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleView {
    pub category: RuleCategory,
    pub key: RuleKey,
    pub label: &'static str,
    pub value: RuleValue,
    pub source: RuleSource,
}

/// Immutable snapshot of every rule value, taken once per evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleBook {
    overrides: BTreeMap<RuleKey, RuleValue>,
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::defaults()
    }
}

impl RuleBook {
    pub fn defaults() -> Self {
        Self {
            overrides: BTreeMap::new(),
        }
    }

    /// Resolve stored rows. Unknown keys and unparseable values are skipped with a warning.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a RuleEntry>,
    {
        let mut overrides = BTreeMap::new();

        for entry in entries {
            let Some(key) = RuleKey::parse(&entry.rule_key) else {
                warn!(rule_key = %entry.rule_key, "ignoring unknown underwriting rule");
                continue;
            };

            let expected = key.default_value().value_type();
            if let Some(declared) = entry.value_type {
                if declared != expected {
                    warn!(
                        rule_key = %key,
                        ?declared,
                        ?expected,
                        "rule stored with an unexpected value type"
                    );
                }
            }

            match RuleValue::parse(expected, &entry.value) {
                Some(value) => {
                    overrides.insert(key, value);
                }
                None => warn!(
                    rule_key = %key,
                    raw = %entry.value,
                    default = %key.default_value(),
                    "unparseable rule value, using default"
                ),
            }
        }

        for spec in RULE_SCHEMA.iter() {
            if !overrides.contains_key(&spec.key) {
                debug!(rule_key = spec.name, default = %spec.default, "rule resolved to default");
            }
        }

        Self { overrides }
    }

    pub fn with_override(mut self, key: RuleKey, value: RuleValue) -> Self {
        if value.value_type() == key.default_value().value_type() {
            self.overrides.insert(key, value);
        } else {
            warn!(rule_key = %key, value = %value, "override has the wrong type, ignored");
        }
        self
    }

    pub fn value(&self, key: RuleKey) -> RuleValue {
        self.overrides
            .get(&key)
            .copied()
            .unwrap_or_else(|| key.default_value())
    }

    pub fn float(&self, key: RuleKey) -> f64 {
        self.value(key)
            .as_f64()
            .or_else(|| key.default_value().as_f64())
            .unwrap_or(0.0)
    }

    pub fn months(&self, key: RuleKey) -> i64 {
        self.value(key)
            .as_i64()
            .or_else(|| key.default_value().as_i64())
            .unwrap_or(0)
    }

    pub fn decision(&self, key: RuleKey) -> Decision {
        self.value(key)
            .as_decision()
            .or_else(|| key.default_value().as_decision())
            .unwrap_or(Decision::Review)
    }

    pub fn views(&self) -> Vec<RuleView> {
        RULE_SCHEMA
            .iter()
            .map(|spec| RuleView {
                category: spec.category,
                key: spec.key,
                label: spec.label,
                value: self.value(spec.key),
                source: if self.overrides.contains_key(&spec.key) {
                    RuleSource::Stored
                } else {
                    RuleSource::Default
                },
            })
            .collect()
    }
}
