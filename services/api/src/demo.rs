use crate::infra::{
    load_risk_grade_table, load_rule_table, InMemoryCaseRepository, LoggingNotificationSink,
};
use chrono::{NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use underwriter::config::UnderwritingConfig;
use underwriter::error::AppError;
use underwriter::workflows::underwriting::{
    risk_grade_gate, validate_for_save, Actor, Assessment, Case, CaseId, CaseInput, CaseProfile,
    ClientType, CompanyInfo, ConclusionDecision, ConclusionRequest, CreditHistory, DealTerms,
    DelinquencyCategory, DirectorInfo, IncomeSource, IndividualIncome, IndividualProfile,
    LegalEntityIncome, LegalEntityProfile, Permissions, RelativeContact, RiskGradeStore,
    RuleBook, UnderwritingEngine, UnderwritingService, UserId,
};

type DemoService = UnderwritingService<InMemoryCaseRepository, LoggingNotificationSink>;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Case input JSON file (the body accepted by PATCH /api/v1/cases/:id)
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Optional rule CSV (category,rule_key,value,value_type) overriding the defaults
    #[arg(long)]
    pub(crate) rules_csv: Option<PathBuf>,
    /// Optional risk-grade CSV (grade,min_pv,is_active) replacing the seeded thresholds
    #[arg(long)]
    pub(crate) risk_grades_csv: Option<PathBuf>,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Print the assessment as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Optional rule CSV applied to every demo case
    #[arg(long)]
    pub(crate) rules_csv: Option<PathBuf>,
    /// Skip the legal-entity portion of the demo.
    #[arg(long)]
    pub(crate) skip_legal_entity: bool,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let EvaluateArgs {
        input,
        rules_csv,
        risk_grades_csv,
        as_of,
        json,
    } = args;

    let file = std::fs::File::open(&input)?;
    let case_input: CaseInput = serde_json::from_reader(std::io::BufReader::new(file))?;

    let config = UnderwritingConfig {
        rules_csv,
        risk_grades_csv,
    };
    let rules = load_rule_table(&config)?;
    let grades = load_risk_grade_table(&config)?;

    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let assessment =
        UnderwritingEngine::new(RuleBook::from_entries(rules.entries())).assess(&case_input, as_of);

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    println!("Underwriting evaluation ({})", input.display());
    println!("Evaluated as of {}", as_of);
    render_assessment(&assessment);

    let mut preview = Case::draft(
        CaseId(0),
        UserId(0),
        case_input.profile.client_type(),
        Utc::now().naive_utc(),
    );
    preview.input = case_input;
    let mut issues = validate_for_save(&preview);
    let threshold = preview
        .input
        .gating_risk_grade()
        .and_then(|grade| grades.active_threshold(grade).ok().flatten());
    if let Some(issue) = risk_grade_gate(
        &preview.input,
        Some(assessment.verdict.recommended_pv),
        threshold.as_ref(),
    ) {
        issues.push(issue);
    }

    if issues.is_empty() {
        println!("\nSave checks: passed");
    } else {
        println!("\nSave checks: {} issue(s)", issues.len());
        for issue in issues {
            println!("- {}", issue);
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        rules_csv,
        skip_legal_entity,
    } = args;

    let config = UnderwritingConfig {
        rules_csv,
        risk_grades_csv: None,
    };
    let repository = Arc::new(InMemoryCaseRepository::default());
    let notifications = Arc::new(LoggingNotificationSink::default());
    let service = UnderwritingService::new(
        repository,
        notifications.clone(),
        Arc::new(load_rule_table(&config)?),
        Arc::new(load_risk_grade_table(&config)?),
    );

    let agent = Actor {
        id: UserId(2),
        permissions: Permissions::from_grants("create"),
    };
    let underwriter = Actor {
        id: UserId(1),
        permissions: Permissions::all(),
    };

    println!("Leasing underwriting demo");

    println!("\nIndividual applicant");
    let Some(first) = walk_case(&service, &agent, &underwriter, demo_individual_input()) else {
        return Ok(());
    };

    println!("\nRepeat applicant sharing a phone number");
    let mut repeat = demo_individual_input();
    if let CaseProfile::Individual(profile) = &mut repeat.profile {
        profile.full_name = Some("Aziza Karimova".to_string());
        profile.passport_series = Some("AB7654321".to_string());
        profile.pinfl = None;
    }
    walk_case(&service, &agent, &underwriter, repeat);

    if !skip_legal_entity {
        println!("\nLegal entity applicant");
        walk_case(&service, &agent, &underwriter, demo_legal_entity_input());
    }

    match service.history(&underwriter, first) {
        Ok(history) => {
            println!("\nAudit trail for case {}", first);
            for entry in history {
                println!(
                    "- {}: {} -> {} (by {})",
                    entry.field,
                    entry.old_value.as_deref().unwrap_or("-"),
                    entry.new_value.as_deref().unwrap_or("-"),
                    entry.actor
                );
            }
        }
        Err(err) => println!("\nAudit trail unavailable: {}", err),
    }

    let events = notifications.events();
    if events.is_empty() {
        println!("\nNotifications: none dispatched");
    } else {
        println!("\nNotifications");
        for event in events {
            println!("- {:?} for {}: {}", event.kind, event.case_id, event.message);
        }
    }

    Ok(())
}

/// Create, fill, save, and conclude one case, printing each step.
fn walk_case(
    service: &DemoService,
    agent: &Actor,
    underwriter: &Actor,
    input: CaseInput,
) -> Option<CaseId> {
    let client_type: ClientType = input.profile.client_type();
    let draft = match service.create(agent, client_type) {
        Ok(draft) => draft,
        Err(err) => {
            println!("  Create rejected: {}", err);
            return None;
        }
    };
    println!("- Opened case {} ({:?})", draft.id, client_type);

    if let Err(err) = service.update_draft(agent, draft.id, input) {
        println!("  Draft update rejected: {}", err);
        return None;
    }

    let outcome = match service.save(agent, draft.id) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("  Save rejected: {}", err);
            return None;
        }
    };
    let case = &outcome.case;
    println!("  Saved {} -> status {}", case.display_name(), case.status);
    if let Some(verdict) = &case.verdict {
        render_assessment(&Assessment {
            derived: case.derived.clone(),
            verdict: verdict.clone(),
        });
    }
    for duplicate in &outcome.duplicates {
        println!(
            "  Possible duplicate: case {} ({}) on {}",
            duplicate.case_id, duplicate.display_name, duplicate.matched_fields
        );
    }

    let request = ConclusionRequest {
        decision: ConclusionDecision::Approved,
        comment: Some("Income verified with employer".to_string()),
        final_pv: case.verdict.as_ref().map(|verdict| verdict.recommended_pv.max(20.0)),
    };
    match service.conclude(underwriter, draft.id, request) {
        Ok(concluded) => println!(
            "  Concluded -> status {} (version {})",
            concluded.status, concluded.conclusion_version
        ),
        Err(err) => println!("  Conclusion rejected: {}", err),
    }

    Some(draft.id)
}

fn render_assessment(assessment: &Assessment) {
    let derived = &assessment.derived;
    let verdict = &assessment.verdict;

    println!(
        "  Remaining amount: {}",
        format_amount(derived.remaining_amount)
    );
    println!(
        "  Monthly payment: {}",
        format_amount(derived.monthly_payment)
    );
    println!(
        "  Total monthly income: {:.2}",
        derived.total_monthly_income
    );
    match derived.dti {
        Some(dti) => println!("  DTI: {:.2}%", dti),
        None => println!("  DTI: not computed"),
    }
    println!("  Overdue check: {}", derived.overdue_check_result);
    println!(
        "  Verdict: {} (DTI {}, delinquency {}), recommended PV {}%",
        verdict.decision,
        verdict.dti_decision,
        verdict.delinquency_decision,
        verdict.recommended_pv
    );
    for reason in &verdict.reasons {
        println!("    - {}", reason);
    }
}

fn format_amount(amount: Option<f64>) -> String {
    amount
        .map(|value| format!("{:.2}", value))
        .unwrap_or_else(|| "-".to_string())
}

fn demo_deal() -> DealTerms {
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

fn clean_credit() -> CreditHistory {
    CreditHistory {
        has_obligations: Some(false),
        overdue_category: Some(DelinquencyCategory::None),
        ..CreditHistory::default()
    }
}

fn demo_individual_input() -> CaseInput {
    CaseInput {
        consent_personal_data: true,
        deal: demo_deal(),
        profile: CaseProfile::Individual(IndividualProfile {
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
        }),
        risk_grade: None,
        no_scoring_response: false,
    }
}

fn demo_legal_entity_input() -> CaseInput {
    CaseInput {
        consent_personal_data: true,
        deal: demo_deal(),
        profile: CaseProfile::LegalEntity(LegalEntityProfile {
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
        }),
        risk_grade: Some("B1".to_string()),
        no_scoring_response: false,
    }
}
