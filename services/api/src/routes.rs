use crate::infra::{deserialize_optional_date, AppState};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use underwriter::error::AppError;
use underwriter::workflows::underwriting::rules::read_rule_entries;
use underwriter::workflows::underwriting::{
    underwriting_router, CaseInput, CaseRepository, DerivedFields, NotificationSink, RuleBook,
    UnderwritingEngine, UnderwritingService, Verdict,
};

/// Stateless evaluation of a case snapshot on a chosen date.
#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateRequest {
    pub(crate) input: CaseInput,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) as_of: Option<NaiveDate>,
    /// Inline `category,rule_key,value,value_type` rows replacing the configured table.
    #[serde(default)]
    pub(crate) rules_csv: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluateResponse {
    pub(crate) as_of: NaiveDate,
    pub(crate) rule_source: RuleTableSource,
    pub(crate) derived: DerivedFields,
    pub(crate) verdict: Verdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RuleTableSource {
    Inline,
    Configured,
}

pub(crate) fn with_underwriting_routes<R, N>(
    service: Arc<UnderwritingService<R, N>>,
) -> axum::Router
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    underwriting_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/underwriting/evaluate",
            axum::routing::post(evaluate_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn evaluate_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let EvaluateRequest {
        input,
        as_of,
        rules_csv,
    } = payload;

    let (rules, rule_source) = match rules_csv {
        Some(csv) => {
            let entries = read_rule_entries(Cursor::new(csv.into_bytes()))?;
            (RuleBook::from_entries(&entries), RuleTableSource::Inline)
        }
        None => (
            RuleBook::from_entries(state.rules.entries()),
            RuleTableSource::Configured,
        ),
    };

    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let assessment = UnderwritingEngine::new(rules).assess(&input, as_of);

    Ok(Json(EvaluateResponse {
        as_of,
        rule_source,
        derived: assessment.derived,
        verdict: assessment.verdict,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use underwriter::workflows::underwriting::{
        CaseProfile, CreditHistory, DealTerms, Decision, DelinquencyCategory, IncomeSource,
        IndividualIncome, IndividualProfile, RuleEntry, RuleKey, RuleTable,
    };

    fn state(ready: bool, rules: RuleTable) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            rules: Arc::new(rules),
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date")
    }

    fn applicant(salary: f64) -> CaseInput {
        CaseInput {
            consent_personal_data: true,
            deal: DealTerms {
                purchase_price: Some(100_000_000.0),
                down_payment_percent: Some(20.0),
                lease_term_months: Some(12),
                interest_rate: Some(24.0),
                ..DealTerms::default()
            },
            profile: CaseProfile::Individual(IndividualProfile {
                full_name: Some("Aziz Karimov".to_string()),
                income: IndividualIncome {
                    salary: IncomeSource::new(salary, 1.0),
                    ..IndividualIncome::default()
                },
                credit: CreditHistory {
                    has_obligations: Some(false),
                    overdue_category: Some(DelinquencyCategory::None),
                    ..CreditHistory::default()
                },
                ..IndividualProfile::default()
            }),
            risk_grade: None,
            no_scoring_response: false,
        }
    }

    #[tokio::test]
    async fn readiness_reflects_the_flag() {
        let pending = readiness_endpoint(Extension(state(false, RuleTable::default())))
            .await
            .into_response();
        let ready = readiness_endpoint(Extension(state(true, RuleTable::default())))
            .await
            .into_response();

        assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn evaluate_uses_configured_rules_by_default() {
        let request = EvaluateRequest {
            input: applicant(20_000_000.0),
            as_of: Some(as_of()),
            rules_csv: None,
        };

        let Json(body) = evaluate_endpoint(
            Extension(state(true, RuleTable::default())),
            Json(request),
        )
        .await
        .expect("evaluation succeeds");

        assert_eq!(body.rule_source, RuleTableSource::Configured);
        assert_eq!(body.as_of, as_of());
        assert_eq!(body.derived.remaining_amount, Some(80_000_000.0));
        assert_eq!(body.verdict.decision, Decision::Approved);
    }

    #[tokio::test]
    async fn missing_as_of_uses_the_utc_date() {
        let request = EvaluateRequest {
            input: applicant(20_000_000.0),
            as_of: None,
            rules_csv: None,
        };

        let before = Utc::now().date_naive();
        let Json(body) = evaluate_endpoint(
            Extension(state(true, RuleTable::default())),
            Json(request),
        )
        .await
        .expect("evaluation succeeds");
        let after = Utc::now().date_naive();

        assert!(
            body.as_of == before || body.as_of == after,
            "evaluated on {}",
            body.as_of
        );
    }

    #[tokio::test]
    async fn configured_rules_are_applied() {
        let rules = RuleTable::new(vec![RuleEntry::new(RuleKey::MaxDtiApprove, "30")]);
        let request = EvaluateRequest {
            input: applicant(20_000_000.0),
            as_of: Some(as_of()),
            rules_csv: None,
        };

        let Json(body) = evaluate_endpoint(Extension(state(true, rules)), Json(request))
            .await
            .expect("evaluation succeeds");

        assert_eq!(body.verdict.dti_decision, Decision::Review);
    }

    #[tokio::test]
    async fn inline_rules_replace_the_configured_table() {
        let request = EvaluateRequest {
            input: applicant(20_000_000.0),
            as_of: Some(as_of()),
            rules_csv: Some(
                "category,rule_key,value,value_type\ndti,max_dti_approve,30,float\ndti,max_dti_review,35,float\n"
                    .to_string(),
            ),
        };

        let Json(body) = evaluate_endpoint(
            Extension(state(true, RuleTable::default())),
            Json(request),
        )
        .await
        .expect("evaluation succeeds");

        assert_eq!(body.rule_source, RuleTableSource::Inline);
        assert_eq!(body.verdict.dti_decision, Decision::Rejected);
        assert_eq!(body.verdict.decision, Decision::Rejected);
    }

    #[tokio::test]
    async fn malformed_inline_rules_are_a_bad_request() {
        let request = EvaluateRequest {
            input: applicant(20_000_000.0),
            as_of: None,
            rules_csv: Some("category,rule_key\n\"unterminated".to_string()),
        };

        let response = evaluate_endpoint(
            Extension(state(true, RuleTable::default())),
            Json(request),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
