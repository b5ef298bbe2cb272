use super::super::calculator::round_to;
use super::super::domain::{Decision, Verdict};
use super::super::rules::{RuleBook, RuleKey};
use super::delinquency::DelinquencyAssessment;
use super::format_percent;

/// DTI sub-decision with its reason line.
pub fn dti_decision(dti: Option<f64>, rules: &RuleBook) -> (Decision, String) {
    let Some(dti) = dti else {
        return (Decision::Approved, "DTI not computed".to_string());
    };

    let max_approve = rules.float(RuleKey::MaxDtiApprove);
    let max_review = rules.float(RuleKey::MaxDtiReview);

    if dti <= max_approve {
        (
            Decision::Approved,
            format!(
                "DTI {}% is within the {}% approval limit",
                format_percent(dti),
                format_percent(max_approve)
            ),
        )
    } else if dti <= max_review {
        (
            Decision::Review,
            format!(
                "DTI {}% exceeds {}% but is within the {}% review limit",
                format_percent(dti),
                format_percent(max_approve),
                format_percent(max_review)
            ),
        )
    } else {
        (
            Decision::Rejected,
            format!(
                "DTI {}% exceeds the {}% review limit",
                format_percent(dti),
                format_percent(max_review)
            ),
        )
    }
}

/// Recommended minimum down payment: the floor plus every delinquency surcharge.
pub fn recommended_pv(delinquency: &DelinquencyAssessment, rules: &RuleBook) -> f64 {
    round_to(rules.float(RuleKey::MinPvPercent) + delinquency.pv_surcharge, 1)
}

pub(super) fn compose(
    dti: (Decision, String),
    delinquency: &DelinquencyAssessment,
    current_pv: Option<f64>,
    rules: &RuleBook,
) -> Verdict {
    let (dti_decision, dti_reason) = dti;

    let mut reasons = vec![dti_reason];
    reasons.extend(delinquency.reasons().map(str::to_string));

    let recommended_pv = recommended_pv(delinquency, rules);
    let current_pv = current_pv.unwrap_or(0.0);
    if current_pv < recommended_pv {
        reasons.push(format!(
            "Current PV {}% is below the recommended {}%",
            format_percent(current_pv),
            format_percent(recommended_pv)
        ));
    }

    Verdict {
        decision: dti_decision.worse(delinquency.decision),
        dti_decision,
        delinquency_decision: delinquency.decision,
        reasons,
        recommended_pv,
    }
}
