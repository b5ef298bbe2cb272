//! Integration specifications for the leasing underwriting workflow.
//!
//! Scenarios run through the public engine, service facade, and HTTP router only, with
//! in-memory collaborators standing in for storage and notification delivery.

mod common {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;

    use underwriter::workflows::underwriting::{
        Actor, AuditEntry, Case, CaseEvent, CaseId, CaseInput, CaseProfile, CaseRepository,
        CompanyInfo, CreditHistory, DealTerms, DelinquencyCategory, DirectorInfo, EditRequest,
        EditRequestId, IncomeSource, IndividualIncome, IndividualProfile, LegalEntityIncome,
        LegalEntityProfile, NotificationError, NotificationSink, Permissions, RelativeContact,
        RepositoryError, RiskGradeTable, RuleTable, UnderwritingService, UserId,
    };

    pub(super) fn underwriter() -> Actor {
        Actor {
            id: UserId(10),
            permissions: Permissions::all(),
        }
    }

    pub(super) fn agent() -> Actor {
        Actor {
            id: UserId(20),
            permissions: Permissions::from_grants("create"),
        }
    }

    fn deal() -> DealTerms {
        DealTerms {
            partner: Some("Samarkand Auto".to_string()),
            car_brand: Some("Kia".to_string()),
            car_model: Some("Sonet".to_string()),
            purchase_price: Some(100_000_000.0),
            down_payment_percent: Some(20.0),
            lease_term_months: Some(12),
            interest_rate: Some(24.0),
            ..DealTerms::default()
        }
    }

    fn clean_credit() -> CreditHistory {
        CreditHistory {
            has_obligations: Some(false),
            overdue_category: Some(DelinquencyCategory::None),
            ..CreditHistory::default()
        }
    }

    pub(super) fn individual_input(phone: &str) -> CaseInput {
        CaseInput {
            consent_personal_data: true,
            deal: deal(),
            profile: CaseProfile::Individual(IndividualProfile {
                full_name: Some("Nodira Alimova".to_string()),
                birth_date: NaiveDate::from_ymd_opt(1991, 7, 2),
                passport_series: Some("AD 2468135".to_string()),
                pinfl: Some("40207910030045".to_string()),
                phone_numbers: Some(phone.to_string()),
                relative_contacts: vec![
                    RelativeContact {
                        name: Some("Jasur Alimov".to_string()),
                        relation: Some("spouse".to_string()),
                        phone: Some("+998 91 333-44-55".to_string()),
                    },
                    RelativeContact {
                        name: Some("Lola Alimova".to_string()),
                        relation: Some("sister".to_string()),
                        phone: Some("+998 94 666-77-88".to_string()),
                    },
                ],
                income: IndividualIncome {
                    salary: IncomeSource::new(60_000_000.0, 3.0),
                    ..IndividualIncome::default()
                },
                credit: clean_credit(),
                ..IndividualProfile::default()
            }),
            risk_grade: None,
            no_scoring_response: false,
        }
    }

    pub(super) fn legal_entity_input() -> CaseInput {
        CaseInput {
            consent_personal_data: true,
            deal: deal(),
            profile: CaseProfile::LegalEntity(LegalEntityProfile {
                company: CompanyInfo {
                    name: Some("Fergana Textile JSC".to_string()),
                    tax_id: Some("20987654321098".to_string()),
                    phone: Some("+998 73 244-00-11".to_string()),
                    ..CompanyInfo::default()
                },
                director: DirectorInfo {
                    full_name: Some("Sherzod Rakhimov".to_string()),
                    ..DirectorInfo::default()
                },
                income: LegalEntityIncome {
                    company_revenue: IncomeSource::new(240_000_000.0, 12.0),
                    company_net_profit: None,
                    director_income: IncomeSource::new(12_000_000.0, 3.0),
                },
                company_credit: clean_credit(),
                director_credit: clean_credit(),
                ..LegalEntityProfile::default()
            }),
            risk_grade: None,
            no_scoring_response: false,
        }
    }

    #[derive(Default)]
    struct Store {
        cases: BTreeMap<CaseId, Case>,
        audit: Vec<AuditEntry>,
        edit_requests: BTreeMap<EditRequestId, EditRequest>,
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryRepository {
        store: Arc<Mutex<Store>>,
    }

    impl CaseRepository for MemoryRepository {
        fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
            let mut guard = self.store.lock().expect("lock");
            if guard.cases.contains_key(&case.id) {
                return Err(RepositoryError::Conflict);
            }
            guard.cases.insert(case.id, case.clone());
            Ok(case)
        }

        fn fetch(&self, id: CaseId) -> Result<Option<Case>, RepositoryError> {
            Ok(self.store.lock().expect("lock").cases.get(&id).cloned())
        }

        fn active(&self) -> Result<Vec<Case>, RepositoryError> {
            let guard = self.store.lock().expect("lock");
            Ok(guard
                .cases
                .values()
                .filter(|case| !case.is_deleted())
                .cloned()
                .collect())
        }

        fn commit(&self, case: Case, audit: Vec<AuditEntry>) -> Result<(), RepositoryError> {
            let mut guard = self.store.lock().expect("lock");
            guard.cases.insert(case.id, case);
            guard.audit.extend(audit);
            Ok(())
        }

        fn audit_log(&self, id: CaseId) -> Result<Vec<AuditEntry>, RepositoryError> {
            let guard = self.store.lock().expect("lock");
            Ok(guard
                .audit
                .iter()
                .filter(|entry| entry.case_id == id)
                .cloned()
                .collect())
        }

        fn insert_edit_request(
            &self,
            request: EditRequest,
        ) -> Result<EditRequest, RepositoryError> {
            let mut guard = self.store.lock().expect("lock");
            guard.edit_requests.insert(request.id, request.clone());
            Ok(request)
        }

        fn save_edit_request(&self, request: EditRequest) -> Result<(), RepositoryError> {
            let mut guard = self.store.lock().expect("lock");
            guard.edit_requests.insert(request.id, request);
            Ok(())
        }

        fn fetch_edit_request(
            &self,
            id: EditRequestId,
        ) -> Result<Option<EditRequest>, RepositoryError> {
            Ok(self
                .store
                .lock()
                .expect("lock")
                .edit_requests
                .get(&id)
                .cloned())
        }

        fn edit_requests(&self, case_id: CaseId) -> Result<Vec<EditRequest>, RepositoryError> {
            let guard = self.store.lock().expect("lock");
            Ok(guard
                .edit_requests
                .values()
                .filter(|request| request.case_id == case_id)
                .cloned()
                .collect())
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct MemoryInbox {
        events: Arc<Mutex<Vec<CaseEvent>>>,
    }

    impl MemoryInbox {
        pub(super) fn events(&self) -> Vec<CaseEvent> {
            self.events.lock().expect("lock").clone()
        }
    }

    impl NotificationSink for MemoryInbox {
        fn publish(&self, event: CaseEvent) -> Result<(), NotificationError> {
            self.events.lock().expect("lock").push(event);
            Ok(())
        }
    }

    pub(super) fn build_service() -> (
        UnderwritingService<MemoryRepository, MemoryInbox>,
        Arc<MemoryRepository>,
        Arc<MemoryInbox>,
    ) {
        let repository = Arc::new(MemoryRepository::default());
        let inbox = Arc::new(MemoryInbox::default());
        let service = UnderwritingService::new(
            repository.clone(),
            inbox.clone(),
            Arc::new(RuleTable::default()),
            Arc::new(RiskGradeTable::seeded()),
        );
        (service, repository, inbox)
    }

    pub(super) fn saved(
        service: &UnderwritingService<MemoryRepository, MemoryInbox>,
        actor: &Actor,
        input: CaseInput,
    ) -> Case {
        let draft = service
            .create(actor, input.profile.client_type())
            .expect("create draft");
        service
            .update_draft(actor, draft.id, input)
            .expect("fill draft");
        service.save(actor, draft.id).expect("save").case
    }
}

mod evaluation {
    use super::common::*;
    use chrono::NaiveDate;
    use underwriter::workflows::underwriting::{
        CaseProfile, Decision, DelinquencyCategory, RuleBook, UnderwritingEngine,
    };

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 30).expect("valid date")
    }

    #[test]
    fn annuity_and_ratio_are_derived_from_raw_input() {
        let engine = UnderwritingEngine::new(RuleBook::defaults());

        let assessment = engine.assess(&individual_input("+998 90 111-22-33"), as_of());

        assert_eq!(assessment.derived.down_payment_amount, Some(20_000_000.0));
        assert_eq!(assessment.derived.remaining_amount, Some(80_000_000.0));
        let payment = assessment.derived.monthly_payment.expect("payment");
        assert!((payment - 7_564_767.73).abs() < 1.0, "payment {payment}");
        assert_eq!(assessment.derived.total_monthly_income, 20_000_000.0);
        assert_eq!(assessment.verdict.decision, Decision::Approved);
    }

    #[test]
    fn moderate_delinquency_raises_the_down_payment() {
        let engine = UnderwritingEngine::new(RuleBook::defaults());
        let mut input = individual_input("+998 90 111-22-33");
        if let CaseProfile::Individual(profile) =
            &mut input.profile
        {
            profile.credit.overdue_category = Some(DelinquencyCategory::Days31To60);
            profile.credit.last_overdue_date = NaiveDate::from_ymd_opt(2025, 2, 10);
        }

        let verdict = engine.assess(&input, as_of()).verdict;

        assert_eq!(verdict.delinquency_decision, Decision::Review);
        assert_eq!(verdict.decision, Decision::Review);
        assert_eq!(verdict.recommended_pv, 10.0);
        assert!(verdict.reasons.iter().any(|reason| reason.contains("PV +5%")));
    }
}

mod lifecycle {
    use super::common::*;
    use underwriter::workflows::underwriting::{
        CaseEventKind, CaseProfile, CaseRepository, CaseStatus, ConclusionDecision,
        ConclusionRequest, ServiceError,
    };

    #[test]
    fn formatted_phones_surface_duplicates_both_ways() {
        let (service, _, inbox) = build_service();
        let first = saved(&service, &agent(), individual_input("+998 (90) 123-45-67"));
        let mut second_input = individual_input("998901234567");
        if let CaseProfile::Individual(profile) =
            &mut second_input.profile
        {
            profile.passport_series = Some("AE1357924".to_string());
            profile.pinfl = None;
        }
        let second = saved(&service, &agent(), second_input);

        let forward = service.duplicates(&underwriter(), second.id).expect("dups");
        let backward = service.duplicates(&underwriter(), first.id).expect("dups");

        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].case_id, first.id);
        assert_eq!(forward[0].matched_fields, "phone");
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].case_id, second.id);
        assert!(inbox
            .events()
            .iter()
            .any(|event| event.kind == CaseEventKind::DuplicatesFound));
    }

    #[test]
    fn reconcluding_a_client_rejection_adds_one_version() {
        let (service, repository, _) = build_service();
        let case = saved(&service, &agent(), legal_entity_input());

        service
            .conclude(
                &underwriter(),
                case.id,
                ConclusionRequest {
                    decision: ConclusionDecision::RejectedByClient,
                    comment: Some("client found a cheaper offer".to_string()),
                    final_pv: Some(20.0),
                },
            )
            .expect("first conclusion");
        let before = repository.audit_log(case.id).expect("audit").len();

        let reconcluded = service
            .conclude(
                &underwriter(),
                case.id,
                ConclusionRequest {
                    decision: ConclusionDecision::Approved,
                    comment: Some("client came back".to_string()),
                    final_pv: Some(20.0),
                },
            )
            .expect("re-conclusion");

        assert_eq!(reconcluded.status, CaseStatus::Approved);
        assert_eq!(reconcluded.conclusion_version, 2);
        let fields: Vec<String> = repository.audit_log(case.id).expect("audit")[before..]
            .iter()
            .map(|entry| entry.field.clone())
            .collect();
        assert_eq!(fields, vec!["status", "decision", "conclusion_comment"]);
    }

    #[test]
    fn agents_cannot_conclude() {
        let (service, _, _) = build_service();
        let case = saved(&service, &agent(), legal_entity_input());

        let result = service.conclude(
            &agent(),
            case.id,
            ConclusionRequest {
                decision: ConclusionDecision::Approved,
                comment: None,
                final_pv: Some(20.0),
            },
        );

        assert!(matches!(result, Err(ServiceError::Forbidden { .. })));
    }
}

mod routing {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;
    use underwriter::workflows::underwriting::underwriting_router;

    #[tokio::test]
    async fn preview_returns_derived_fields_and_verdict() {
        let (service, _, _) = build_service();
        let router = underwriting_router(Arc::new(service));

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/underwriting/preview")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&legal_entity_input()).expect("serialize input"),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(
            payload.pointer("/derived/total_monthly_income"),
            Some(&Value::from(24_000_000.0))
        );
        assert_eq!(
            payload.pointer("/verdict/decision").and_then(Value::as_str),
            Some("approved")
        );
    }
}
