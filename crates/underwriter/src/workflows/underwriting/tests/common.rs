use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{Months, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::workflows::underwriting::domain::{
    Actor, Case, CaseId, CaseInput, CaseProfile, CompanyInfo, CreditHistory, DealTerms,
    DelinquencyCategory, DirectorInfo, IncomeSource, IndividualIncome, IndividualProfile,
    LegalEntityIncome, LegalEntityProfile, Permissions, RelativeContact, UserId,
};
use crate::workflows::underwriting::repository::{
    AuditEntry, CaseEvent, CaseRepository, EditRequest, EditRequestId, NotificationError,
    NotificationSink, RepositoryError,
};
use crate::workflows::underwriting::rules::{RiskGradeTable, RuleTable};
use crate::workflows::underwriting::{underwriting_router, UnderwritingService};

pub(super) fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date")
}

pub(super) fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .expect("date in range")
}

pub(super) fn months_ago(months: u32) -> NaiveDate {
    months_before(Utc::now().date_naive(), months)
}

pub(super) fn timestamp() -> NaiveDateTime {
    as_of().and_hms_opt(9, 30, 0).expect("valid time")
}

pub(super) fn underwriter() -> Actor {
    Actor {
        id: UserId(1),
        permissions: Permissions::all(),
    }
}

pub(super) fn agent() -> Actor {
    Actor {
        id: UserId(2),
        permissions: Permissions {
            create: true,
            ..Permissions::default()
        },
    }
}

pub(super) fn other_agent() -> Actor {
    Actor {
        id: UserId(3),
        permissions: Permissions {
            create: true,
            ..Permissions::default()
        },
    }
}

pub(super) fn deal() -> DealTerms {
    DealTerms {
        partner: Some("Tashkent Motors".to_string()),
        car_brand: Some("Chevrolet".to_string()),
        car_model: Some("Tracker".to_string()),
        car_year: Some(2024),
        purchase_price: Some(100_000_000.0),
        down_payment_percent: Some(20.0),
        lease_term_months: Some(12),
        interest_rate: Some(24.0),
        ..DealTerms::default()
    }
}

pub(super) fn clean_credit() -> CreditHistory {
    CreditHistory {
        has_obligations: Some(false),
        overdue_category: Some(DelinquencyCategory::None),
        ..CreditHistory::default()
    }
}

pub(super) fn individual_profile() -> IndividualProfile {
    IndividualProfile {
        full_name: Some("Aziz Karimov".to_string()),
        birth_date: NaiveDate::from_ymd_opt(1988, 3, 14),
        passport_series: Some("AA1234567".to_string()),
        pinfl: Some("31403880010023".to_string()),
        phone_numbers: Some("+998 90 123-45-67".to_string()),
        relative_contacts: vec![
            RelativeContact {
                name: Some("Dilnoza Karimova".to_string()),
                relation: Some("spouse".to_string()),
                phone: Some("+998 90 765-43-21".to_string()),
            },
            RelativeContact {
                name: Some("Rustam Karimov".to_string()),
                relation: Some("brother".to_string()),
                phone: Some("+998 93 111-22-33".to_string()),
            },
        ],
        has_official_employment: Some(true),
        employer_name: Some("Uzbektelecom".to_string()),
        income: IndividualIncome {
            salary: IncomeSource::new(20_000_000.0, 1.0),
            ..IndividualIncome::default()
        },
        credit: clean_credit(),
        ..IndividualProfile::default()
    }
}

pub(super) fn individual_input() -> CaseInput {
    CaseInput {
        consent_personal_data: true,
        deal: deal(),
        profile: CaseProfile::Individual(individual_profile()),
        risk_grade: None,
        no_scoring_response: false,
    }
}

pub(super) fn legal_entity_profile() -> LegalEntityProfile {
    LegalEntityProfile {
        company: CompanyInfo {
            name: Some("Silk Road Logistics LLC".to_string()),
            tax_id: Some("30512345678901".to_string()),
            phone: Some("+998 71 200-10-20".to_string()),
            ..CompanyInfo::default()
        },
        director: DirectorInfo {
            full_name: Some("Bekzod Tursunov".to_string()),
            phone: Some("+998 90 555-66-77".to_string()),
            ..DirectorInfo::default()
        },
        income: LegalEntityIncome {
            company_revenue: IncomeSource::new(600_000_000.0, 6.0),
            company_net_profit: Some(90_000_000.0),
            director_income: IncomeSource::new(30_000_000.0, 3.0),
        },
        company_credit: clean_credit(),
        director_credit: clean_credit(),
        ..LegalEntityProfile::default()
    }
}

pub(super) fn legal_entity_input() -> CaseInput {
    CaseInput {
        consent_personal_data: true,
        deal: deal(),
        profile: CaseProfile::LegalEntity(legal_entity_profile()),
        risk_grade: None,
        no_scoring_response: false,
    }
}

pub(super) fn individual(input: &mut CaseInput) -> &mut IndividualProfile {
    match &mut input.profile {
        CaseProfile::Individual(profile) => profile,
        other => panic!("expected individual profile, got {other:?}"),
    }
}

pub(super) fn legal_entity(input: &mut CaseInput) -> &mut LegalEntityProfile {
    match &mut input.profile {
        CaseProfile::LegalEntity(profile) => profile,
        other => panic!("expected legal entity profile, got {other:?}"),
    }
}

/// A stored case built directly, bypassing the service.
pub(super) fn case_from(id: u64, input: CaseInput) -> Case {
    let mut case = Case::draft(CaseId(id), UserId(2), input.profile.client_type(), timestamp());
    case.input = input;
    case
}

pub(super) fn build_service() -> (
    UnderwritingService<MemoryRepository, MemoryNotifications>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
) {
    build_service_with(RuleTable::default())
}

pub(super) fn build_service_with(
    rules: RuleTable,
) -> (
    UnderwritingService<MemoryRepository, MemoryNotifications>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = UnderwritingService::new(
        repository.clone(),
        notifications.clone(),
        Arc::new(rules),
        Arc::new(RiskGradeTable::seeded()),
    );
    (service, repository, notifications)
}

#[derive(Default)]
pub(super) struct MemoryState {
    cases: BTreeMap<CaseId, Case>,
    audit: Vec<AuditEntry>,
    edit_requests: BTreeMap<EditRequestId, EditRequest>,
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub(super) fn seed(&self, case: Case) {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .cases
            .insert(case.id, case);
    }
}

impl CaseRepository for MemoryRepository {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        let mut guard = self.state.lock().expect("repository mutex poisoned");
        if guard.cases.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.cases.insert(case.id, case.clone());
        Ok(case)
    }

    fn fetch(&self, id: CaseId) -> Result<Option<Case>, RepositoryError> {
        let guard = self.state.lock().expect("repository mutex poisoned");
        Ok(guard.cases.get(&id).cloned())
    }

    fn active(&self) -> Result<Vec<Case>, RepositoryError> {
        let guard = self.state.lock().expect("repository mutex poisoned");
        Ok(guard
            .cases
            .values()
            .filter(|case| !case.is_deleted())
            .cloned()
            .collect())
    }

    fn commit(&self, case: Case, audit: Vec<AuditEntry>) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("repository mutex poisoned");
        guard.cases.insert(case.id, case);
        guard.audit.extend(audit);
        Ok(())
    }

    fn audit_log(&self, id: CaseId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let guard = self.state.lock().expect("repository mutex poisoned");
        Ok(guard
            .audit
            .iter()
            .filter(|entry| entry.case_id == id)
            .cloned()
            .collect())
    }

    fn insert_edit_request(&self, request: EditRequest) -> Result<EditRequest, RepositoryError> {
        let mut guard = self.state.lock().expect("repository mutex poisoned");
        guard.edit_requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn save_edit_request(&self, request: EditRequest) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().expect("repository mutex poisoned");
        guard.edit_requests.insert(request.id, request);
        Ok(())
    }

    fn fetch_edit_request(
        &self,
        id: EditRequestId,
    ) -> Result<Option<EditRequest>, RepositoryError> {
        let guard = self.state.lock().expect("repository mutex poisoned");
        Ok(guard.edit_requests.get(&id).cloned())
    }

    fn edit_requests(&self, case_id: CaseId) -> Result<Vec<EditRequest>, RepositoryError> {
        let guard = self.state.lock().expect("repository mutex poisoned");
        Ok(guard
            .edit_requests
            .values()
            .filter(|request| request.case_id == case_id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl CaseRepository for UnavailableRepository {
    fn insert(&self, _case: Case) -> Result<Case, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: CaseId) -> Result<Option<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn active(&self) -> Result<Vec<Case>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn commit(&self, _case: Case, _audit: Vec<AuditEntry>) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn audit_log(&self, _id: CaseId) -> Result<Vec<AuditEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_edit_request(&self, _request: EditRequest) -> Result<EditRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_edit_request(&self, _request: EditRequest) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_edit_request(
        &self,
        _id: EditRequestId,
    ) -> Result<Option<EditRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn edit_requests(&self, _case_id: CaseId) -> Result<Vec<EditRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<CaseEvent>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<CaseEvent> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSink for MemoryNotifications {
    fn publish(&self, event: CaseEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationSink for FailingNotifications {
    fn publish(&self, _event: CaseEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay down".to_string()))
    }
}

pub(super) fn router_with_service(
    service: UnderwritingService<MemoryRepository, MemoryNotifications>,
) -> axum::Router {
    underwriting_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
