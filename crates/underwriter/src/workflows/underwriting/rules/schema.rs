use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::underwriting::domain::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Dti,
    Pv,
    Overdue,
}

impl RuleCategory {
    pub const fn label(self) -> &'static str {
        match self {
            RuleCategory::Dti => "dti",
            RuleCategory::Pv => "pv",
            RuleCategory::Overdue => "overdue",
        }
    }
}

/// Storage type of a rule value. Decision-valued rules were historically stored as `string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Int,
    #[serde(alias = "string", alias = "decision")]
    Enum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Int(i64),
    Float(f64),
    Decision(Decision),
}

impl RuleValue {
    pub const fn value_type(&self) -> ValueType {
        match self {
            RuleValue::Float(_) => ValueType::Float,
            RuleValue::Int(_) => ValueType::Int,
            RuleValue::Decision(_) => ValueType::Enum,
        }
    }

    /// Parse a stored raw value as the given type; `None` when it does not fit.
    pub fn parse(value_type: ValueType, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match value_type {
            ValueType::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(RuleValue::Float),
            ValueType::Int => raw.parse::<i64>().ok().map(RuleValue::Int).or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite() && value.fract() == 0.0)
                    .map(|value| RuleValue::Int(value as i64))
            }),
            ValueType::Enum => Decision::parse(raw).map(RuleValue::Decision),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RuleValue::Float(value) => Some(*value),
            RuleValue::Int(value) => Some(*value as f64),
            RuleValue::Decision(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RuleValue::Int(value) => Some(*value),
            RuleValue::Float(_) | RuleValue::Decision(_) => None,
        }
    }

    pub fn as_decision(&self) -> Option<Decision> {
        match self {
            RuleValue::Decision(decision) => Some(*decision),
            RuleValue::Float(_) | RuleValue::Int(_) => None,
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::Float(value) => write!(f, "{value}"),
            RuleValue::Int(value) => write!(f, "{value}"),
            RuleValue::Decision(decision) => f.write_str(decision.label()),
        }
    }
}

/// Every parameter the engine reads. Discriminants index into [`RULE_SCHEMA`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKey {
    MaxDtiApprove,
    MaxDtiReview,
    MinPvPercent,
    PvIncreaseStep,
    Overdue30Result,
    Overdue3160LtNearResult,
    Overdue3160NearToFarResult,
    Overdue3160NearToFarPvAdd,
    Overdue3160GtFarResult,
    Overdue3160GtFarPvAdd,
    Overdue3160ThresholdNear,
    Overdue3160ThresholdFar,
    Overdue6190GtResult,
    Overdue6190LteResult,
    Overdue6190Threshold,
    Overdue90PlusGtResult,
    Overdue90PlusLteResult,
    Overdue90PlusThreshold,
}

impl RuleKey {
    pub fn spec(self) -> &'static RuleSpec {
        &RULE_SCHEMA[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    pub fn category(self) -> RuleCategory {
        self.spec().category
    }

    pub fn default_value(self) -> RuleValue {
        self.spec().default
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        RULE_SCHEMA
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(raw))
            .map(|spec| spec.key)
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the declarative rule schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleSpec {
    pub key: RuleKey,
    pub name: &'static str,
    pub category: RuleCategory,
    pub default: RuleValue,
    pub label: &'static str,
}

const fn rule(
    key: RuleKey,
    name: &'static str,
    category: RuleCategory,
    default: RuleValue,
    label: &'static str,
) -> RuleSpec {
    RuleSpec {
        key,
        name,
        category,
        default,
        label,
    }
}

use RuleCategory::{Dti, Overdue, Pv};
use RuleValue::{Decision as Outcome, Float, Int};

pub const RULE_SCHEMA: [RuleSpec; 18] = [
    rule(RuleKey::MaxDtiApprove, "max_dti_approve", Dti, Float(50.0), "DTI ceiling for approval, %"),
    rule(RuleKey::MaxDtiReview, "max_dti_review", Dti, Float(60.0), "DTI ceiling for review, %"),
    rule(RuleKey::MinPvPercent, "min_pv_percent", Pv, Float(5.0), "Minimum down payment, %"),
    rule(RuleKey::PvIncreaseStep, "pv_increase_step", Pv, Float(5.0), "Down payment increase step, %"),
    rule(RuleKey::Overdue30Result, "overdue_30_result", Overdue, Outcome(Decision::Approved), "Delinquency under 30 days"),
    rule(RuleKey::Overdue3160LtNearResult, "overdue_31_60_lt_near_result", Overdue, Outcome(Decision::Rejected), "31-60 days, more recent than the near threshold"),
    rule(RuleKey::Overdue3160NearToFarResult, "overdue_31_60_near_to_far_result", Overdue, Outcome(Decision::Review), "31-60 days, between the near and far thresholds"),
    rule(RuleKey::Overdue3160NearToFarPvAdd, "overdue_31_60_near_to_far_pv_add", Overdue, Float(5.0), "31-60 days, near to far: down payment surcharge, %"),
    rule(RuleKey::Overdue3160GtFarResult, "overdue_31_60_gt_far_result", Overdue, Outcome(Decision::Approved), "31-60 days, older than the far threshold"),
    rule(RuleKey::Overdue3160GtFarPvAdd, "overdue_31_60_gt_far_pv_add", Overdue, Float(5.0), "31-60 days, beyond far: down payment surcharge, %"),
    rule(RuleKey::Overdue3160ThresholdNear, "overdue_31_60_threshold_near", Overdue, Int(6), "31-60 days: near threshold, months"),
    rule(RuleKey::Overdue3160ThresholdFar, "overdue_31_60_threshold_far", Overdue, Int(12), "31-60 days: far threshold, months"),
    rule(RuleKey::Overdue6190GtResult, "overdue_61_90_gt_result", Overdue, Outcome(Decision::Review), "61-90 days, older than the threshold"),
    rule(RuleKey::Overdue6190LteResult, "overdue_61_90_lte_result", Overdue, Outcome(Decision::Rejected), "61-90 days, within the threshold"),
    rule(RuleKey::Overdue6190Threshold, "overdue_61_90_threshold", Overdue, Int(12), "61-90 days: threshold, months"),
    rule(RuleKey::Overdue90PlusGtResult, "overdue_90plus_gt_result", Overdue, Outcome(Decision::Review), "Over 90 days, older than the threshold"),
    rule(RuleKey::Overdue90PlusLteResult, "overdue_90plus_lte_result", Overdue, Outcome(Decision::Rejected), "Over 90 days, within the threshold"),
    rule(RuleKey::Overdue90PlusThreshold, "overdue_90plus_threshold", Overdue, Int(24), "Over 90 days: threshold, months"),
];
