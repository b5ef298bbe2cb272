use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::super::domain::{Decision, DelinquencyCategory, DelinquencyParty, DelinquencySource};
use super::super::rules::{RuleBook, RuleKey};
use super::format_percent;

/// Calendar months between the month of `date` and the month of `as_of`. Days are ignored.
pub fn months_since(date: NaiveDate, as_of: NaiveDate) -> i64 {
    i64::from(as_of.year() - date.year()) * 12 + i64::from(as_of.month())
        - i64::from(date.month())
}

/// Result of classifying one party's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelinquencyOutcome {
    pub party: DelinquencyParty,
    pub category: Option<DelinquencyCategory>,
    pub months_since: Option<i64>,
    pub decision: Decision,
    pub pv_surcharge: f64,
    pub reason: Option<String>,
}

/// Combined classification across every party of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelinquencyAssessment {
    pub decision: Decision,
    pub pv_surcharge: f64,
    pub outcomes: Vec<DelinquencyOutcome>,
}

impl DelinquencyAssessment {
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.reason.as_deref())
    }
}

/// Classify each source independently; the worst decision wins and surcharges add up.
pub fn classify_sources(
    sources: &[DelinquencySource],
    rules: &RuleBook,
    as_of: NaiveDate,
) -> DelinquencyAssessment {
    let outcomes: Vec<DelinquencyOutcome> = sources
        .iter()
        .map(|source| classify(source, rules, as_of))
        .collect();

    let decision = outcomes
        .iter()
        .fold(Decision::Approved, |worst, outcome| worst.worse(outcome.decision));
    let pv_surcharge = outcomes.iter().map(|outcome| outcome.pv_surcharge).sum();

    DelinquencyAssessment {
        decision,
        pv_surcharge,
        outcomes,
    }
}

pub fn classify(source: &DelinquencySource, rules: &RuleBook, as_of: NaiveDate) -> DelinquencyOutcome {
    let months = source
        .last_overdue_date
        .map(|date| months_since(date, as_of));

    let Some(category) = source.category.filter(|c| *c != DelinquencyCategory::None) else {
        return DelinquencyOutcome {
            party: source.party,
            category: source.category,
            months_since: months,
            decision: Decision::Approved,
            pv_surcharge: 0.0,
            reason: None,
        };
    };

    let decision = branch_decision(category, months, rules);
    let pv_surcharge = surcharge(category, months, rules);

    let mut reason = format!(
        "{}Delinquency {}{}: {}",
        source.party.reason_prefix(),
        category_phrase(category),
        recency_phrase(category, months, rules),
        decision
    );
    if pv_surcharge > 0.0 {
        reason.push_str(&format!(", PV +{}%", format_percent(pv_surcharge)));
    }

    DelinquencyOutcome {
        party: source.party,
        category: Some(category),
        months_since: months,
        decision,
        pv_surcharge,
        reason: Some(reason),
    }
}

fn branch_decision(category: DelinquencyCategory, months: Option<i64>, rules: &RuleBook) -> Decision {
    match category {
        DelinquencyCategory::None => Decision::Approved,
        DelinquencyCategory::UpTo30Days => rules.decision(RuleKey::Overdue30Result),
        DelinquencyCategory::Days31To60 => {
            let near = rules.months(RuleKey::Overdue3160ThresholdNear);
            let far = rules.months(RuleKey::Overdue3160ThresholdFar);
            match months {
                Some(m) if m < near => rules.decision(RuleKey::Overdue3160LtNearResult),
                Some(m) if m <= far => rules.decision(RuleKey::Overdue3160NearToFarResult),
                // An unknown date is treated as older than the far threshold.
                _ => rules.decision(RuleKey::Overdue3160GtFarResult),
            }
        }
        DelinquencyCategory::Days61To90 => {
            let threshold = rules.months(RuleKey::Overdue6190Threshold);
            if months.is_some_and(|m| m > threshold) {
                rules.decision(RuleKey::Overdue6190GtResult)
            } else {
                rules.decision(RuleKey::Overdue6190LteResult)
            }
        }
        DelinquencyCategory::Over90Days => {
            let threshold = rules.months(RuleKey::Overdue90PlusThreshold);
            if months.is_some_and(|m| m > threshold) {
                rules.decision(RuleKey::Overdue90PlusGtResult)
            } else {
                rules.decision(RuleKey::Overdue90PlusLteResult)
            }
        }
    }
}

fn branch_surcharge(category: DelinquencyCategory, months: Option<i64>, rules: &RuleBook) -> f64 {
    match category {
        DelinquencyCategory::Days31To60 => {
            let near = rules.months(RuleKey::Overdue3160ThresholdNear);
            let far = rules.months(RuleKey::Overdue3160ThresholdFar);
            match months {
                Some(m) if m < near => 0.0,
                Some(m) if m <= far => rules.float(RuleKey::Overdue3160NearToFarPvAdd),
                _ => rules.float(RuleKey::Overdue3160GtFarPvAdd),
            }
        }
        DelinquencyCategory::None
        | DelinquencyCategory::UpTo30Days
        | DelinquencyCategory::Days61To90
        | DelinquencyCategory::Over90Days => 0.0,
    }
}

/// A bucket never earns less surcharge than a milder bucket at the same recency.
fn surcharge(category: DelinquencyCategory, months: Option<i64>, rules: &RuleBook) -> f64 {
    let own = branch_surcharge(category, months, rules).max(0.0);
    match category.milder() {
        Some(milder) => own.max(surcharge(milder, months, rules)),
        None => own,
    }
}

fn category_phrase(category: DelinquencyCategory) -> &'static str {
    match category {
        DelinquencyCategory::None => "none",
        DelinquencyCategory::UpTo30Days => "under 30 days",
        DelinquencyCategory::Days31To60 => "31-60 days",
        DelinquencyCategory::Days61To90 => "61-90 days",
        DelinquencyCategory::Over90Days => "over 90 days",
    }
}

fn recency_phrase(category: DelinquencyCategory, months: Option<i64>, rules: &RuleBook) -> String {
    let elapsed = match months {
        Some(m) => format!("{m} months since the last overdue"),
        None => "no overdue date on file".to_string(),
    };

    match category {
        DelinquencyCategory::None | DelinquencyCategory::UpTo30Days => String::new(),
        DelinquencyCategory::Days31To60 => format!(
            ", {elapsed} (near {}, far {})",
            rules.months(RuleKey::Overdue3160ThresholdNear),
            rules.months(RuleKey::Overdue3160ThresholdFar)
        ),
        DelinquencyCategory::Days61To90 => format!(
            ", {elapsed} (threshold {})",
            rules.months(RuleKey::Overdue6190Threshold)
        ),
        DelinquencyCategory::Over90Days => format!(
            ", {elapsed} (threshold {})",
            rules.months(RuleKey::Overdue90PlusThreshold)
        ),
    }
}
