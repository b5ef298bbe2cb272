use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for leasing cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of the staff member acting on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

/// Capabilities granted to an actor by the surrounding role store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub create: bool,
    pub edit: bool,
    pub view_all: bool,
    pub conclude: bool,
    pub delete: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            create: true,
            edit: true,
            view_all: true,
            conclude: true,
            delete: true,
        }
    }

    /// Parse a comma separated grant list such as `create,edit,conclude`.
    pub fn from_grants(raw: &str) -> Self {
        let mut permissions = Self::default();
        for grant in raw.split(',').map(|grant| grant.trim().to_ascii_lowercase()) {
            match grant.as_str() {
                "create" => permissions.create = true,
                "edit" => permissions.edit = true,
                "view_all" => permissions.view_all = true,
                "conclude" => permissions.conclude = true,
                "delete" => permissions.delete = true,
                "all" => permissions = Self::all(),
                _ => {}
            }
        }
        permissions
    }
}

/// Identity asserted for the caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Individual,
    LegalEntity,
}

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Draft,
    Saved,
    Approved,
    Review,
    #[serde(rename = "rejected_underwriter")]
    RejectedByUnderwriter,
    #[serde(rename = "rejected_client")]
    RejectedByClient,
    Deleted,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Draft => "draft",
            CaseStatus::Saved => "saved",
            CaseStatus::Approved => "approved",
            CaseStatus::Review => "review",
            CaseStatus::RejectedByUnderwriter => "rejected_underwriter",
            CaseStatus::RejectedByClient => "rejected_client",
            CaseStatus::Deleted => "deleted",
        }
    }

    /// Statuses from which a conclusion (or re-conclusion) may be recorded.
    pub const fn accepts_conclusion(self) -> bool {
        matches!(
            self,
            CaseStatus::Saved
                | CaseStatus::Approved
                | CaseStatus::Review
                | CaseStatus::RejectedByUnderwriter
                | CaseStatus::RejectedByClient
        )
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Engine recommendation. Variant order is severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Review,
    Rejected,
}

impl Decision {
    pub const fn label(self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Review => "review",
            Decision::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Decision::Approved),
            "review" => Some(Decision::Review),
            "rejected" => Some(Decision::Rejected),
            _ => None,
        }
    }

    /// The more restrictive of two decisions; ties keep `self`.
    pub fn worse(self, other: Decision) -> Decision {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Human decision recorded at conclusion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConclusionDecision {
    Approved,
    Review,
    #[serde(rename = "rejected_underwriter")]
    RejectedByUnderwriter,
    #[serde(rename = "rejected_client")]
    RejectedByClient,
}

impl ConclusionDecision {
    pub const fn status(self) -> CaseStatus {
        match self {
            ConclusionDecision::Approved => CaseStatus::Approved,
            ConclusionDecision::Review => CaseStatus::Review,
            ConclusionDecision::RejectedByUnderwriter => CaseStatus::RejectedByUnderwriter,
            ConclusionDecision::RejectedByClient => CaseStatus::RejectedByClient,
        }
    }

    pub const fn label(self) -> &'static str {
        self.status().label()
    }
}

/// Worst overdue bucket reported by the credit bureau. Variant order is severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DelinquencyCategory {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "under-30-days")]
    UpTo30Days,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "90+")]
    Over90Days,
}

impl DelinquencyCategory {
    pub const fn label(self) -> &'static str {
        match self {
            DelinquencyCategory::None => "none",
            DelinquencyCategory::UpTo30Days => "under-30-days",
            DelinquencyCategory::Days31To60 => "31-60",
            DelinquencyCategory::Days61To90 => "61-90",
            DelinquencyCategory::Over90Days => "90+",
        }
    }

    /// The next milder bucket, used when flooring surcharges by severity.
    pub const fn milder(self) -> Option<Self> {
        match self {
            DelinquencyCategory::None => None,
            DelinquencyCategory::UpTo30Days => Some(DelinquencyCategory::None),
            DelinquencyCategory::Days31To60 => Some(DelinquencyCategory::UpTo30Days),
            DelinquencyCategory::Days61To90 => Some(DelinquencyCategory::Days31To60),
            DelinquencyCategory::Over90Days => Some(DelinquencyCategory::Days61To90),
        }
    }
}

/// Fixed label shown next to the worst delinquency bucket of a case.
pub fn overdue_check_label(category: Option<DelinquencyCategory>) -> &'static str {
    match category {
        Some(DelinquencyCategory::UpTo30Days) => "OK: acceptable delinquency",
        Some(DelinquencyCategory::Days31To60) => "Attention: moderate delinquency",
        Some(DelinquencyCategory::Days61To90) => "Risk: significant delinquency",
        Some(DelinquencyCategory::Over90Days) => "Reject: critical delinquency",
        Some(DelinquencyCategory::None) | None => "No data",
    }
}

/// Income earned over a number of months.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeSource {
    pub source: Option<String>,
    pub total: Option<f64>,
    pub period_months: Option<f64>,
}

impl IncomeSource {
    pub fn new(total: f64, period_months: f64) -> Self {
        Self {
            source: None,
            total: Some(total),
            period_months: Some(period_months),
        }
    }

    /// Monthly average; pairs with a missing or zero side contribute nothing.
    pub fn monthly_average(&self) -> f64 {
        match (self.total, self.period_months) {
            (Some(total), Some(period)) if total != 0.0 && period != 0.0 => total / period,
            _ => 0.0,
        }
    }
}

/// Obligations and delinquency history of one party.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditHistory {
    pub has_obligations: Option<bool>,
    pub obligations_amount: Option<f64>,
    pub obligations_count: Option<u32>,
    pub monthly_payment: Option<f64>,
    pub closed_obligations_count: Option<u32>,
    pub max_overdue_principal_days: Option<u32>,
    pub max_overdue_principal_amount: Option<f64>,
    pub max_continuous_overdue_interest_days: Option<u32>,
    pub max_overdue_interest_amount: Option<f64>,
    pub overdue_category: Option<DelinquencyCategory>,
    pub last_overdue_date: Option<NaiveDate>,
    pub overdue_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeContact {
    pub name: Option<String>,
    pub relation: Option<String>,
    pub phone: Option<String>,
}

impl RelativeContact {
    pub fn has_phone(&self) -> bool {
        self.phone
            .as_deref()
            .map(|phone| !phone.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualIncome {
    pub salary: IncomeSource,
    pub main_activity: IncomeSource,
    pub additional: IncomeSource,
    pub other: IncomeSource,
}

/// Raw input collected for a private applicant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualProfile {
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub passport_series: Option<String>,
    pub passport_issue_date: Option<NaiveDate>,
    pub passport_issued_by: Option<String>,
    pub pinfl: Option<String>,
    pub registration_address: Option<String>,
    pub actual_address: Option<String>,
    pub phone_numbers: Option<String>,
    pub relative_contacts: Vec<RelativeContact>,
    pub has_official_employment: Option<bool>,
    pub employer_name: Option<String>,
    pub income: IndividualIncome,
    pub property_type: Option<String>,
    pub property_details: Option<String>,
    pub credit: CreditHistory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyInfo {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub activity_code: Option<String>,
    pub legal_address: Option<String>,
    pub actual_address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorInfo {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub family_phone: Option<String>,
    pub family_relation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactPerson {
    pub name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalEntityIncome {
    pub company_revenue: IncomeSource,
    pub company_net_profit: Option<f64>,
    pub director_income: IncomeSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guarantor {
    pub full_name: Option<String>,
    pub pinfl: Option<String>,
    pub passport: Option<String>,
    pub phone: Option<String>,
    pub monthly_income: Option<f64>,
    pub overdue_category: Option<DelinquencyCategory>,
    pub last_overdue_date: Option<NaiveDate>,
}

/// Raw input collected for a company applicant, its director and an optional guarantor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalEntityProfile {
    pub company: CompanyInfo,
    pub director: DirectorInfo,
    pub contact_person: ContactPerson,
    pub income: LegalEntityIncome,
    pub company_credit: CreditHistory,
    pub director_credit: CreditHistory,
    pub guarantor: Option<Guarantor>,
}

/// Party whose credit history is classified on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelinquencyParty {
    Applicant,
    Company,
    Director,
    Guarantor,
}

impl DelinquencyParty {
    /// Prefix used in reason strings. The sole applicant of an individual case gets none.
    pub const fn reason_prefix(self) -> &'static str {
        match self {
            DelinquencyParty::Applicant => "",
            DelinquencyParty::Company => "[Company] ",
            DelinquencyParty::Director => "[Director] ",
            DelinquencyParty::Guarantor => "[Guarantor] ",
        }
    }
}

/// One delinquency record to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencySource {
    pub party: DelinquencyParty,
    pub category: Option<DelinquencyCategory>,
    pub last_overdue_date: Option<NaiveDate>,
}

impl DelinquencySource {
    fn from_history(party: DelinquencyParty, history: &CreditHistory) -> Self {
        Self {
            party,
            category: history.overdue_category,
            last_overdue_date: history.last_overdue_date,
        }
    }
}

/// Client-type specific raw input. The variant is the client type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "client_type", rename_all = "snake_case")]
pub enum CaseProfile {
    Individual(IndividualProfile),
    LegalEntity(LegalEntityProfile),
}

impl Default for CaseProfile {
    fn default() -> Self {
        CaseProfile::Individual(IndividualProfile::default())
    }
}

impl CaseProfile {
    pub fn empty(client_type: ClientType) -> Self {
        match client_type {
            ClientType::Individual => CaseProfile::Individual(IndividualProfile::default()),
            ClientType::LegalEntity => CaseProfile::LegalEntity(LegalEntityProfile::default()),
        }
    }

    pub fn client_type(&self) -> ClientType {
        match self {
            CaseProfile::Individual(_) => ClientType::Individual,
            CaseProfile::LegalEntity(_) => ClientType::LegalEntity,
        }
    }

    pub fn income_sources(&self) -> Vec<&IncomeSource> {
        match self {
            CaseProfile::Individual(profile) => vec![
                &profile.income.salary,
                &profile.income.main_activity,
                &profile.income.additional,
                &profile.income.other,
            ],
            CaseProfile::LegalEntity(profile) => vec![
                &profile.income.company_revenue,
                &profile.income.director_income,
            ],
        }
    }

    /// Monthly debt service on existing obligations, `None` when nothing was declared.
    pub fn monthly_obligations(&self) -> Option<f64> {
        match self {
            CaseProfile::Individual(profile) => profile.credit.monthly_payment,
            CaseProfile::LegalEntity(profile) => {
                match (
                    profile.company_credit.monthly_payment,
                    profile.director_credit.monthly_payment,
                ) {
                    (None, None) => None,
                    (company, director) => {
                        Some(company.unwrap_or(0.0) + director.unwrap_or(0.0))
                    }
                }
            }
        }
    }

    /// One source for an individual, three (company, director, guarantor) for a legal entity.
    pub fn delinquency_sources(&self) -> Vec<DelinquencySource> {
        match self {
            CaseProfile::Individual(profile) => vec![DelinquencySource::from_history(
                DelinquencyParty::Applicant,
                &profile.credit,
            )],
            CaseProfile::LegalEntity(profile) => {
                let guarantor = profile.guarantor.as_ref();
                vec![
                    DelinquencySource::from_history(
                        DelinquencyParty::Company,
                        &profile.company_credit,
                    ),
                    DelinquencySource::from_history(
                        DelinquencyParty::Director,
                        &profile.director_credit,
                    ),
                    DelinquencySource {
                        party: DelinquencyParty::Guarantor,
                        category: guarantor.and_then(|g| g.overdue_category),
                        last_overdue_date: guarantor.and_then(|g| g.last_overdue_date),
                    },
                ]
            }
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        let name = match self {
            CaseProfile::Individual(profile) => profile.full_name.as_deref(),
            CaseProfile::LegalEntity(profile) => profile.company.name.as_deref(),
        };
        name.map(str::trim).filter(|name| !name.is_empty())
    }

    /// Strip the spaces that formatted inputs like `AC 1234567` carry.
    pub fn normalize(&mut self) {
        match self {
            CaseProfile::Individual(profile) => {
                strip_spaces(&mut profile.passport_series);
            }
            CaseProfile::LegalEntity(profile) => {
                if let Some(guarantor) = profile.guarantor.as_mut() {
                    strip_spaces(&mut guarantor.passport);
                }
            }
        }
    }
}

fn strip_spaces(value: &mut Option<String>) {
    if let Some(raw) = value.as_mut() {
        raw.retain(|c| c != ' ');
    }
}

/// Commercial terms of the lease.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealTerms {
    pub partner: Option<String>,
    pub car_brand: Option<String>,
    pub car_model: Option<String>,
    pub car_specs: Option<String>,
    pub car_year: Option<u16>,
    pub mileage: Option<u32>,
    pub purchase_price: Option<f64>,
    pub down_payment_percent: Option<f64>,
    pub lease_term_months: Option<u32>,
    pub interest_rate: Option<f64>,
    pub purchase_purpose: Option<String>,
}

/// Everything a case editor may write while the case is a draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseInput {
    pub consent_personal_data: bool,
    pub deal: DealTerms,
    pub profile: CaseProfile,
    pub risk_grade: Option<String>,
    pub no_scoring_response: bool,
}

impl CaseInput {
    pub fn empty(client_type: ClientType) -> Self {
        Self {
            profile: CaseProfile::empty(client_type),
            ..Self::default()
        }
    }

    /// Risk grade that should gate the down payment, if scoring produced one.
    pub fn gating_risk_grade(&self) -> Option<&str> {
        if self.no_scoring_response {
            return None;
        }
        self.risk_grade
            .as_deref()
            .map(str::trim)
            .filter(|grade| !grade.is_empty())
    }
}

/// Values recomputed from raw input; never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub down_payment_amount: Option<f64>,
    pub remaining_amount: Option<f64>,
    pub monthly_payment: Option<f64>,
    pub total_monthly_income: f64,
    pub dti: Option<f64>,
    pub overdue_check_result: String,
}

impl Default for DerivedFields {
    fn default() -> Self {
        Self {
            down_payment_amount: None,
            remaining_amount: None,
            monthly_payment: None,
            total_monthly_income: 0.0,
            dti: None,
            overdue_check_result: overdue_check_label(None).to_string(),
        }
    }
}

/// Engine-owned recommendation attached to a case on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub dti_decision: Decision,
    pub delinquency_decision: Decision,
    pub reasons: Vec<String>,
    pub recommended_pv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub decision: ConclusionDecision,
    pub comment: Option<String>,
    pub final_pv: f64,
    pub concluded_by: UserId,
    pub concluded_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deletion {
    pub reason: String,
    pub deleted_by: UserId,
    pub deleted_at: NaiveDateTime,
}

/// A leasing application and everything the engine and underwriters attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub status: CaseStatus,
    pub created_by: UserId,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub input: CaseInput,
    pub derived: DerivedFields,
    pub verdict: Option<Verdict>,
    pub conclusion: Option<Conclusion>,
    pub conclusion_version: u32,
    pub deletion: Option<Deletion>,
}

impl Case {
    pub fn draft(
        id: CaseId,
        created_by: UserId,
        client_type: ClientType,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            status: CaseStatus::Draft,
            created_by,
            created_at: now,
            updated_at: now,
            input: CaseInput::empty(client_type),
            derived: DerivedFields::default(),
            verdict: None,
            conclusion: None,
            conclusion_version: 0,
            deletion: None,
        }
    }

    pub fn client_type(&self) -> ClientType {
        self.input.profile.client_type()
    }

    /// Person or company name, falling back to the case number.
    pub fn display_name(&self) -> String {
        self.input
            .profile
            .display_name()
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn is_deleted(&self) -> bool {
        self.status == CaseStatus::Deleted
    }
}
