use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, CaseId, CaseInput, ClientType, Permissions, UserId};
use super::repository::{CaseRepository, EditRequestId, NotificationSink, RepositoryError};
use super::service::{ConclusionRequest, ServiceError, UnderwritingService};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const PERMISSIONS_HEADER: &str = "x-user-permissions";

/// Router builder exposing the case lifecycle and the stateless engine endpoints.
pub fn underwriting_router<R, N>(service: Arc<UnderwritingService<R, N>>) -> Router
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/cases",
            post(create_handler::<R, N>).get(list_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id",
            get(get_handler::<R, N>)
                .patch(update_handler::<R, N>)
                .delete(delete_handler::<R, N>),
        )
        .route("/api/v1/cases/:case_id/save", post(save_handler::<R, N>))
        .route(
            "/api/v1/cases/:case_id/conclude",
            post(conclude_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/duplicates",
            get(duplicates_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/history",
            get(history_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/edit-requests",
            post(request_edit_handler::<R, N>).get(edit_requests_handler::<R, N>),
        )
        .route(
            "/api/v1/edit-requests/:request_id/resolve",
            post(resolve_edit_handler::<R, N>),
        )
        .route(
            "/api/v1/underwriting/preview",
            post(preview_handler::<R, N>),
        )
        .route("/api/v1/underwriting/rules", get(rules_handler::<R, N>))
        .with_state(service)
}

/// Caller identity asserted by the gateway through request headers.
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                let payload = json!({ "error": format!("missing or invalid {USER_ID_HEADER} header") });
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            })?;

        let permissions = parts
            .headers
            .get(PERMISSIONS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Permissions::from_grants)
            .unwrap_or_default();

        Ok(Actor {
            id: UserId(id),
            permissions,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateCaseBody {
    client_type: ClientType,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReasonBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveBody {
    approve: bool,
    #[serde(default)]
    comment: Option<String>,
}

pub(crate) async fn create_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Json(body): Json<CreateCaseBody>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.create(&actor, body.client_type) {
        Ok(case) => (StatusCode::CREATED, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.list(&actor) {
        Ok(cases) => (StatusCode::OK, Json(cases)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.get(&actor, CaseId(case_id)) {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
    Json(input): Json<CaseInput>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.update_draft(&actor, CaseId(case_id), input) {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn save_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.save(&actor, CaseId(case_id)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn conclude_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
    Json(request): Json<ConclusionRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.conclude(&actor, CaseId(case_id), request) {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
    Json(body): Json<ReasonBody>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.delete(&actor, CaseId(case_id), &body.reason) {
        Ok(case) => (StatusCode::OK, Json(case)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn duplicates_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.duplicates(&actor, CaseId(case_id)) {
        Ok(matches) => (StatusCode::OK, Json(matches)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn history_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.history(&actor, CaseId(case_id)) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn request_edit_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
    Json(body): Json<ReasonBody>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.request_edit(&actor, CaseId(case_id), &body.reason) {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn edit_requests_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(case_id): Path<u64>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.edit_requests(&actor, CaseId(case_id)) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn resolve_edit_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    actor: Actor,
    Path(request_id): Path<u64>,
    Json(body): Json<ResolveBody>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    match service.resolve_edit_request(
        &actor,
        EditRequestId(request_id),
        body.approve,
        body.comment,
    ) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn preview_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
    Json(input): Json<CaseInput>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    (StatusCode::OK, Json(service.preview(&input))).into_response()
}

pub(crate) async fn rules_handler<R, N>(
    State(service): State<Arc<UnderwritingService<R, N>>>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    (StatusCode::OK, Json(service.rules())).into_response()
}

fn error_response(err: ServiceError) -> Response {
    let (status, payload) = match &err {
        ServiceError::Validation(issues) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": "validation failed",
                "errors": issues.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }),
        ),
        ServiceError::Forbidden { .. } => (StatusCode::FORBIDDEN, json!({ "error": err.to_string() })),
        ServiceError::CaseNotFound(_)
        | ServiceError::EditRequestNotFound(_)
        | ServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        ServiceError::Transition(_)
        | ServiceError::Conflict(_)
        | ServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }
        ServiceError::Repository(RepositoryError::Unavailable(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": err.to_string() }),
        ),
    };

    (status, Json(payload)).into_response()
}
