mod delinquency;
mod policy;

pub use delinquency::{
    classify, classify_sources, months_since, DelinquencyAssessment, DelinquencyOutcome,
};
pub use policy::{dti_decision, recommended_pv};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calculator::calculate;
use super::domain::{Case, CaseInput, DerivedFields, Verdict};
use super::rules::RuleBook;

/// Compose the verdict for a case whose derived fields are current.
pub fn evaluate_verdict(case: &Case, rules: &RuleBook, as_of: NaiveDate) -> Verdict {
    compose_verdict(&case.input, &case.derived, rules, as_of)
}

/// Verdict from raw input plus derived fields. Pure; reasons are rebuilt on every call.
pub fn compose_verdict(
    input: &CaseInput,
    derived: &DerivedFields,
    rules: &RuleBook,
    as_of: NaiveDate,
) -> Verdict {
    let dti = dti_decision(derived.dti, rules);
    let delinquency = classify_sources(&input.profile.delinquency_sources(), rules, as_of);
    policy::compose(dti, &delinquency, input.deal.down_payment_percent, rules)
}

/// Stateless evaluator bound to one rule snapshot.
pub struct UnderwritingEngine {
    rules: RuleBook,
}

impl UnderwritingEngine {
    pub fn new(rules: RuleBook) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn assess(&self, input: &CaseInput, as_of: NaiveDate) -> Assessment {
        let derived = calculate(input);
        let verdict = compose_verdict(input, &derived, &self.rules, as_of);
        Assessment { derived, verdict }
    }
}

/// Derived fields and verdict produced together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub derived: DerivedFields,
    pub verdict: Verdict,
}

/// Percent rendering: whole numbers without decimals, otherwise up to two places.
pub(crate) fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let rendered = format!("{value:.2}");
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}
