use super::domain::{Case, CaseInput, CaseProfile, IndividualProfile, LegalEntityProfile};
use super::evaluation::format_percent;
use super::rules::RiskGradeThreshold;

/// A single problem blocking a transition. Callers collect and show them all at once.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("consent to personal data processing is required")]
    MissingConsent,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must contain exactly {length} digits")]
    MalformedIdentifier { field: &'static str, length: usize },
    #[error("at least {required} relative contacts with a phone number are required, found {found}")]
    InsufficientContacts { required: usize, found: usize },
    #[error("down payment {pv}% is below the {minimum}% minimum for risk grade {grade}")]
    BelowRiskGradeMinimum {
        grade: String,
        pv: String,
        minimum: String,
    },
    #[error("final down payment is required to conclude")]
    MissingFinalPv,
    #[error("client type cannot change after the case is created")]
    ClientTypeChanged,
}

const DEFAULT_MIN_RELATIVE_CONTACTS: usize = 2;
const IDENTIFIER_LENGTH: usize = 14;

/// Dials for the save-time field checks.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    min_relative_contacts: usize,
}

impl ValidationPolicy {
    pub fn new(min_relative_contacts: usize) -> Self {
        Self {
            min_relative_contacts,
        }
    }

    pub fn min_relative_contacts(&self) -> usize {
        self.min_relative_contacts
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RELATIVE_CONTACTS)
    }
}

/// Field validation for the save and conclusion transitions.
#[derive(Debug, Clone, Default)]
pub struct CaseValidator {
    policy: ValidationPolicy,
}

impl CaseValidator {
    pub fn with_policy(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Client-type specific required fields and identifier formats.
    pub fn validate_for_save(&self, case: &Case) -> Vec<ValidationIssue> {
        let input = &case.input;
        let mut issues = Vec::new();

        if !input.consent_personal_data {
            issues.push(ValidationIssue::MissingConsent);
        }

        match &input.profile {
            CaseProfile::Individual(profile) => self.individual_issues(profile, &mut issues),
            CaseProfile::LegalEntity(profile) => legal_entity_issues(profile, &mut issues),
        }

        deal_issues(input, &mut issues);
        issues
    }

    fn individual_issues(&self, profile: &IndividualProfile, issues: &mut Vec<ValidationIssue>) {
        require_text(profile.full_name.as_deref(), "full name", issues);
        if profile.birth_date.is_none() {
            issues.push(ValidationIssue::MissingField("birth date"));
        }
        require_text(profile.passport_series.as_deref(), "passport series", issues);

        if let Some(pinfl) = profile
            .pinfl
            .as_deref()
            .map(str::trim)
            .filter(|pinfl| !pinfl.is_empty())
        {
            if !is_identifier(pinfl) {
                issues.push(ValidationIssue::MalformedIdentifier {
                    field: "PINFL",
                    length: IDENTIFIER_LENGTH,
                });
            }
        }

        if profile.credit.has_obligations.is_none() {
            issues.push(ValidationIssue::MissingField("current obligations flag"));
        }
        if profile.credit.overdue_category.is_none() {
            issues.push(ValidationIssue::MissingField("overdue category"));
        }

        let required = self.policy.min_relative_contacts;
        let found = profile
            .relative_contacts
            .iter()
            .filter(|contact| contact.has_phone())
            .count();
        if found < required {
            issues.push(ValidationIssue::InsufficientContacts { required, found });
        }
    }
}

/// Field checks with the default policy.
pub fn validate_for_save(case: &Case) -> Vec<ValidationIssue> {
    CaseValidator::default().validate_for_save(case)
}

/// Hard floor on the down payment for graded cases. `pv` is the value being committed.
pub fn risk_grade_gate(
    input: &CaseInput,
    pv: Option<f64>,
    threshold: Option<&RiskGradeThreshold>,
) -> Option<ValidationIssue> {
    let grade = input.gating_risk_grade()?;
    let threshold = threshold.filter(|threshold| threshold.matches(grade))?;
    let pv = pv?;

    (pv < threshold.min_pv).then(|| ValidationIssue::BelowRiskGradeMinimum {
        grade: threshold.grade.clone(),
        pv: format_percent(pv),
        minimum: format_percent(threshold.min_pv),
    })
}

/// Conclusion needs a final down payment that clears the risk-grade floor.
pub fn validate_for_conclude(
    case: &Case,
    final_pv: Option<f64>,
    threshold: Option<&RiskGradeThreshold>,
) -> Result<f64, Vec<ValidationIssue>> {
    let Some(final_pv) = final_pv.filter(|pv| pv.is_finite()) else {
        return Err(vec![ValidationIssue::MissingFinalPv]);
    };

    match risk_grade_gate(&case.input, Some(final_pv), threshold) {
        Some(issue) => Err(vec![issue]),
        None => Ok(final_pv),
    }
}

fn legal_entity_issues(profile: &LegalEntityProfile, issues: &mut Vec<ValidationIssue>) {
    require_text(profile.company.name.as_deref(), "company name", issues);

    match profile
        .company
        .tax_id
        .as_deref()
        .map(str::trim)
        .filter(|tax_id| !tax_id.is_empty())
    {
        None => issues.push(ValidationIssue::MissingField("company tax ID")),
        Some(tax_id) if !is_identifier(tax_id) => {
            issues.push(ValidationIssue::MalformedIdentifier {
                field: "company tax ID",
                length: IDENTIFIER_LENGTH,
            })
        }
        Some(_) => {}
    }

    require_text(profile.director.full_name.as_deref(), "director name", issues);
}

fn deal_issues(input: &CaseInput, issues: &mut Vec<ValidationIssue>) {
    let deal = &input.deal;
    if !is_positive(deal.purchase_price) {
        issues.push(ValidationIssue::MissingField("purchase price"));
    }
    if !is_positive(deal.down_payment_percent) {
        issues.push(ValidationIssue::MissingField("down payment percent"));
    }
    if deal.lease_term_months.map_or(true, |months| months == 0) {
        issues.push(ValidationIssue::MissingField("lease term"));
    }
}

/// Zero and non-finite amounts count as not filled in.
fn is_positive(value: Option<f64>) -> bool {
    value.is_some_and(|value| value.is_finite() && value > 0.0)
}

fn require_text(value: Option<&str>, field: &'static str, issues: &mut Vec<ValidationIssue>) {
    if value.map(str::trim).map_or(true, str::is_empty) {
        issues.push(ValidationIssue::MissingField(field));
    }
}

fn is_identifier(value: &str) -> bool {
    value.len() == IDENTIFIER_LENGTH && value.chars().all(|c| c.is_ascii_digit())
}
