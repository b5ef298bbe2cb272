use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::calculator::calculate;
use super::compliance::{risk_grade_gate, validate_for_conclude, CaseValidator, ValidationIssue};
use super::domain::{
    Actor, Case, CaseId, CaseInput, CaseStatus, ClientType, Conclusion, ConclusionDecision,
    Deletion,
};
use super::duplicates::{find_duplicates, DuplicateMatch, IdentityKeys, MatchKey};
use super::evaluation::{evaluate_verdict, format_percent, Assessment, UnderwritingEngine};
use super::lifecycle::{next_status, Transition, TransitionError};
use super::repository::{
    AuditEntry, CaseEvent, CaseEventKind, CaseRepository, CaseSummary, EditRequest,
    EditRequestId, EditRequestStatus, NotificationSink, RepositoryError, RiskGradeStore,
    RuleStore,
};
use super::rules::{RiskGradeThreshold, RuleBook, RuleView};

/// Facade composing validation, the engine, duplicate detection, audit, and notifications.
pub struct UnderwritingService<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    rules: Arc<dyn RuleStore>,
    grades: Arc<dyn RiskGradeStore>,
    validator: Arc<CaseValidator>,
}

static CASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static EDIT_REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_case_id() -> CaseId {
    CaseId(CASE_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn next_edit_request_id() -> EditRequestId {
    EditRequestId(EDIT_REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Body of a conclusion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConclusionRequest {
    pub decision: ConclusionDecision,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub final_pv: Option<f64>,
}

/// Saved case together with the duplicates found at save time.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub case: Case,
    pub duplicates: Vec<DuplicateMatch>,
}

impl<R, N> UnderwritingService<R, N>
where
    R: CaseRepository + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<N>,
        rules: Arc<dyn RuleStore>,
        grades: Arc<dyn RiskGradeStore>,
    ) -> Self {
        Self::with_validator(
            CaseValidator::default(),
            repository,
            notifications,
            rules,
            grades,
        )
    }

    pub fn with_validator(
        validator: CaseValidator,
        repository: Arc<R>,
        notifications: Arc<N>,
        rules: Arc<dyn RuleStore>,
        grades: Arc<dyn RiskGradeStore>,
    ) -> Self {
        Self {
            repository,
            notifications,
            rules,
            grades,
            validator: Arc::new(validator),
        }
    }

    /// Open an empty draft.
    pub fn create(&self, actor: &Actor, client_type: ClientType) -> Result<Case, ServiceError> {
        ensure(actor.permissions.create, actor, "create cases")?;

        let case = Case::draft(next_case_id(), actor.id, client_type, now());
        let stored = self.repository.insert(case)?;
        info!(case_id = %stored.id, actor = %actor.id, ?client_type, "case created");
        Ok(stored)
    }

    pub fn get(&self, actor: &Actor, id: CaseId) -> Result<Case, ServiceError> {
        let case = self.load(id)?;
        ensure(can_view(actor, &case), actor, "view this case")?;
        Ok(case)
    }

    /// Non-deleted cases visible to the actor.
    pub fn list(&self, actor: &Actor) -> Result<Vec<CaseSummary>, ServiceError> {
        Ok(self
            .repository
            .active()?
            .iter()
            .filter(|case| can_view(actor, case))
            .map(Case::summary)
            .collect())
    }

    /// Replace the raw input of a draft, recording every changed field.
    pub fn update_draft(
        &self,
        actor: &Actor,
        id: CaseId,
        mut input: CaseInput,
    ) -> Result<Case, ServiceError> {
        let mut case = self.load(id)?;
        ensure(can_edit(actor, &case), actor, "edit this case")?;
        next_status(case.status, Transition::EditDraft)?;

        if input.profile.client_type() != case.client_type() {
            return Err(ServiceError::Validation(vec![
                ValidationIssue::ClientTypeChanged,
            ]));
        }

        input.profile.normalize();
        let recorded_at = now();
        let audit = diff_fields(&case.input, &input)
            .into_iter()
            .map(|(field, (old_value, new_value))| AuditEntry {
                case_id: case.id,
                field,
                old_value,
                new_value,
                actor: actor.id,
                recorded_at,
            })
            .collect::<Vec<_>>();

        case.input = input;
        case.derived = calculate(&case.input);
        case.updated_at = recorded_at;

        let changed = audit.len();
        self.repository.commit(case.clone(), audit)?;
        info!(case_id = %case.id, actor = %actor.id, changed, "draft updated");
        Ok(case)
    }

    /// Validate, evaluate, and move a draft to `saved` (or `review` after an approved edit).
    pub fn save(&self, actor: &Actor, id: CaseId) -> Result<SaveOutcome, ServiceError> {
        let mut case = self.load(id)?;
        ensure(can_edit(actor, &case), actor, "save this case")?;

        let approved_edits: Vec<EditRequest> = self
            .repository
            .edit_requests(case.id)?
            .into_iter()
            .filter(|request| request.status == EditRequestStatus::Approved)
            .collect();
        let edit_approved = !approved_edits.is_empty();
        let status = next_status(case.status, Transition::Save { edit_approved })?;

        let mut issues = self.validator.validate_for_save(&case);
        let threshold = self.threshold_for(&case.input)?;
        if let Some(issue) = risk_grade_gate(
            &case.input,
            case.input.deal.down_payment_percent,
            threshold.as_ref(),
        ) {
            issues.push(issue);
        }
        if !issues.is_empty() {
            return Err(ServiceError::Validation(issues));
        }

        let recorded_at = now();
        let rules = self.rule_book();
        case.derived = calculate(&case.input);
        case.verdict = Some(evaluate_verdict(&case, &rules, recorded_at.date()));

        let audit = vec![status_entry(&case, status, actor, recorded_at)];
        case.status = status;
        if edit_approved {
            case.conclusion = None;
        }
        case.updated_at = recorded_at;

        self.repository.commit(case.clone(), audit)?;
        for mut request in approved_edits {
            request.status = EditRequestStatus::Applied;
            self.repository.save_edit_request(request)?;
        }

        let decision = case
            .verdict
            .as_ref()
            .map(|verdict| verdict.decision.label())
            .unwrap_or("none");
        info!(
            case_id = %case.id,
            actor = %actor.id,
            status = %case.status,
            decision,
            "case saved"
        );
        self.notify(CaseEvent {
            kind: CaseEventKind::CaseSaved,
            case_id: case.id,
            actor: actor.id,
            message: format!(
                "Case {} ({}) saved with automatic decision {decision}",
                case.id,
                case.display_name()
            ),
        });

        let duplicates = self.duplicates_of(&case)?;
        if !duplicates.is_empty() {
            let ids = duplicates
                .iter()
                .map(|duplicate| duplicate.case_id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            self.notify(CaseEvent {
                kind: CaseEventKind::DuplicatesFound,
                case_id: case.id,
                actor: actor.id,
                message: format!("Case {} matches: {ids}", case.id),
            });
        }

        Ok(SaveOutcome { case, duplicates })
    }

    /// Record (or re-record) the underwriter's decision.
    pub fn conclude(
        &self,
        actor: &Actor,
        id: CaseId,
        request: ConclusionRequest,
    ) -> Result<Case, ServiceError> {
        ensure(actor.permissions.conclude, actor, "conclude cases")?;
        let mut case = self.load(id)?;
        ensure(can_view(actor, &case), actor, "view this case")?;
        let status = next_status(case.status, Transition::Conclude(request.decision))?;

        let threshold = self.threshold_for(&case.input)?;
        let final_pv = validate_for_conclude(&case, request.final_pv, threshold.as_ref())
            .map_err(ServiceError::Validation)?;

        let recorded_at = now();
        let rules = self.rule_book();
        case.derived = calculate(&case.input);
        case.verdict = Some(evaluate_verdict(&case, &rules, recorded_at.date()));

        let comment = request
            .comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());
        let previous = case.conclusion.as_ref();

        let mut audit = Vec::new();
        if case.status != status {
            audit.push(status_entry(&case, status, actor, recorded_at));
        }
        let changes = [
            (
                "decision",
                previous.map(|c| c.decision.label().to_string()),
                Some(request.decision.label().to_string()),
            ),
            (
                "conclusion_comment",
                previous.and_then(|c| c.comment.clone()),
                comment.clone(),
            ),
        ];
        for (field, old_value, new_value) in changes {
            if old_value != new_value {
                audit.push(AuditEntry {
                    case_id: case.id,
                    field: field.to_string(),
                    old_value,
                    new_value,
                    actor: actor.id,
                    recorded_at,
                });
            }
        }
        if previous.map_or(true, |c| c.final_pv != final_pv) {
            audit.push(AuditEntry {
                case_id: case.id,
                field: "final_pv".to_string(),
                old_value: previous.map(|c| format_percent(c.final_pv)),
                new_value: Some(format_percent(final_pv)),
                actor: actor.id,
                recorded_at,
            });
        }

        case.status = status;
        case.conclusion = Some(Conclusion {
            decision: request.decision,
            comment,
            final_pv,
            concluded_by: actor.id,
            concluded_at: recorded_at,
        });
        case.conclusion_version += 1;
        case.updated_at = recorded_at;

        self.repository.commit(case.clone(), audit)?;
        info!(
            case_id = %case.id,
            actor = %actor.id,
            status = %case.status,
            version = case.conclusion_version,
            "case concluded"
        );
        self.notify(CaseEvent {
            kind: CaseEventKind::CaseConcluded,
            case_id: case.id,
            actor: actor.id,
            message: format!(
                "Case {} concluded as {} (version {})",
                case.id,
                case.status,
                case.conclusion_version
            ),
        });

        Ok(case)
    }

    /// Soft-delete with a mandatory reason.
    pub fn delete(&self, actor: &Actor, id: CaseId, reason: &str) -> Result<Case, ServiceError> {
        let mut case = self.load(id)?;
        ensure(
            case.created_by == actor.id || actor.permissions.delete,
            actor,
            "delete this case",
        )?;
        let status = next_status(case.status, Transition::Delete)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation(vec![ValidationIssue::MissingField(
                "deletion reason",
            )]));
        }

        let recorded_at = now();
        let audit = vec![
            status_entry(&case, status, actor, recorded_at),
            AuditEntry {
                case_id: case.id,
                field: "deletion_reason".to_string(),
                old_value: None,
                new_value: Some(reason.to_string()),
                actor: actor.id,
                recorded_at,
            },
        ];

        case.status = status;
        case.deletion = Some(Deletion {
            reason: reason.to_string(),
            deleted_by: actor.id,
            deleted_at: recorded_at,
        });
        case.updated_at = recorded_at;

        self.repository.commit(case.clone(), audit)?;
        info!(case_id = %case.id, actor = %actor.id, status = %case.status, "case deleted");
        Ok(case)
    }

    pub fn duplicates(&self, actor: &Actor, id: CaseId) -> Result<Vec<DuplicateMatch>, ServiceError> {
        let case = self.get(actor, id)?;
        self.duplicates_of(&case)
    }

    pub fn history(&self, actor: &Actor, id: CaseId) -> Result<Vec<AuditEntry>, ServiceError> {
        let case = self.get(actor, id)?;
        Ok(self.repository.audit_log(case.id)?)
    }

    pub fn edit_requests(
        &self,
        actor: &Actor,
        id: CaseId,
    ) -> Result<Vec<EditRequest>, ServiceError> {
        let case = self.get(actor, id)?;
        Ok(self.repository.edit_requests(case.id)?)
    }

    /// Ask for a saved or concluded case to be reopened.
    pub fn request_edit(
        &self,
        actor: &Actor,
        id: CaseId,
        reason: &str,
    ) -> Result<EditRequest, ServiceError> {
        let case = self.get(actor, id)?;
        next_status(case.status, Transition::RequestEdit)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation(vec![ValidationIssue::MissingField(
                "edit request reason",
            )]));
        }

        let pending = self
            .repository
            .edit_requests(case.id)?
            .into_iter()
            .any(|request| request.status == EditRequestStatus::Pending);
        if pending {
            return Err(ServiceError::Conflict(format!(
                "case {} already has a pending edit request",
                case.id
            )));
        }

        let request = self.repository.insert_edit_request(EditRequest {
            id: next_edit_request_id(),
            case_id: case.id,
            requested_by: actor.id,
            reason: reason.to_string(),
            status: EditRequestStatus::Pending,
            reviewed_by: None,
            review_comment: None,
            created_at: now(),
            resolved_at: None,
        })?;

        info!(case_id = %case.id, actor = %actor.id, request = %request.id, "edit requested");
        self.notify(CaseEvent {
            kind: CaseEventKind::EditRequested,
            case_id: case.id,
            actor: actor.id,
            message: format!("Edit of case {} requested: {reason}", case.id),
        });

        Ok(request)
    }

    /// Approve (reopening the case to draft) or reject a pending edit request.
    pub fn resolve_edit_request(
        &self,
        actor: &Actor,
        request_id: EditRequestId,
        approve: bool,
        comment: Option<String>,
    ) -> Result<EditRequest, ServiceError> {
        ensure(actor.permissions.view_all, actor, "resolve edit requests")?;

        let mut request = self
            .repository
            .fetch_edit_request(request_id)?
            .ok_or(ServiceError::EditRequestNotFound(request_id))?;
        if request.status != EditRequestStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "{} is no longer pending",
                request.id
            )));
        }

        let recorded_at = now();
        if approve {
            let mut case = self.load(request.case_id)?;
            let status = next_status(case.status, Transition::Reopen)?;
            let audit = vec![status_entry(&case, status, actor, recorded_at)];
            case.status = status;
            case.updated_at = recorded_at;
            self.repository.commit(case, audit)?;
        }

        request.status = if approve {
            EditRequestStatus::Approved
        } else {
            EditRequestStatus::Rejected
        };
        request.reviewed_by = Some(actor.id);
        request.review_comment = comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());
        request.resolved_at = Some(recorded_at);
        self.repository.save_edit_request(request.clone())?;

        info!(
            case_id = %request.case_id,
            actor = %actor.id,
            request = %request.id,
            approved = approve,
            "edit request resolved"
        );
        Ok(request)
    }

    /// Stateless calculation and verdict for unsaved input.
    pub fn preview(&self, input: &CaseInput) -> Assessment {
        UnderwritingEngine::new(self.rule_book()).assess(input, now().date())
    }

    pub fn rules(&self) -> Vec<RuleView> {
        self.rule_book().views()
    }

    fn load(&self, id: CaseId) -> Result<Case, ServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(ServiceError::CaseNotFound(id))
    }

    /// Snapshot of the rule store. An unreachable store degrades to the defaults.
    fn rule_book(&self) -> RuleBook {
        match self.rules.rule_entries() {
            Ok(entries) => RuleBook::from_entries(&entries),
            Err(err) => {
                warn!(error = %err, "rule store unavailable, evaluating with default rules");
                RuleBook::defaults()
            }
        }
    }

    fn threshold_for(&self, input: &CaseInput) -> Result<Option<RiskGradeThreshold>, ServiceError> {
        match input.gating_risk_grade() {
            Some(grade) => Ok(self.grades.active_threshold(grade)?),
            None => Ok(None),
        }
    }

    fn duplicates_of(&self, case: &Case) -> Result<Vec<DuplicateMatch>, ServiceError> {
        let keys = IdentityKeys::of(case);
        let mut candidates = BTreeMap::new();
        for key in MatchKey::ALL {
            if let Some(value) = keys.get(key) {
                for candidate in self.repository.matching(key, value)? {
                    candidates.entry(candidate.id).or_insert(candidate);
                }
            }
        }

        let candidates: Vec<Case> = candidates.into_values().collect();
        Ok(find_duplicates(case, &candidates))
    }

    fn notify(&self, event: CaseEvent) {
        let kind = event.kind;
        let case_id = event.case_id;
        if let Err(err) = self.notifications.publish(event) {
            warn!(case_id = %case_id, ?kind, error = %err, "notification delivery failed");
        }
    }
}

fn can_view(actor: &Actor, case: &Case) -> bool {
    actor.permissions.view_all || case.created_by == actor.id
}

fn can_edit(actor: &Actor, case: &Case) -> bool {
    actor.permissions.edit || case.created_by == actor.id
}

fn ensure(allowed: bool, actor: &Actor, action: &'static str) -> Result<(), ServiceError> {
    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Forbidden {
            actor: actor.id.to_string(),
            action,
        })
    }
}

fn status_entry(
    case: &Case,
    status: CaseStatus,
    actor: &Actor,
    recorded_at: NaiveDateTime,
) -> AuditEntry {
    AuditEntry {
        case_id: case.id,
        field: "status".to_string(),
        old_value: Some(case.status.label().to_string()),
        new_value: Some(status.label().to_string()),
        actor: actor.id,
        recorded_at,
    }
}

type FieldChange = (Option<String>, Option<String>);

/// Field-level differences between two inputs, keyed by dotted path.
fn diff_fields(before: &CaseInput, after: &CaseInput) -> BTreeMap<String, FieldChange> {
    let mut old_fields = BTreeMap::new();
    let mut new_fields = BTreeMap::new();
    flatten("", &serde_json::to_value(before).unwrap_or(Value::Null), &mut old_fields);
    flatten("", &serde_json::to_value(after).unwrap_or(Value::Null), &mut new_fields);

    let mut changes = BTreeMap::new();
    for (field, old_value) in &old_fields {
        let new_value = new_fields.get(field).cloned().flatten();
        if *old_value != new_value {
            changes.insert(field.clone(), (old_value.clone(), new_value));
        }
    }
    for (field, new_value) in new_fields {
        if new_value.is_some() && !old_fields.contains_key(&field) {
            changes.insert(field, (None, new_value));
        }
    }
    changes
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, Option<String>>) {
    let path = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(&path(key), nested, out);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten(&path(&index.to_string()), nested, out);
            }
        }
        Value::Null => {
            out.insert(prefix.to_string(), None);
        }
        Value::String(text) => {
            out.insert(prefix.to_string(), Some(text.clone()));
        }
        other => {
            out.insert(prefix.to_string(), Some(other.to_string()));
        }
    }
}

/// Error raised by the underwriting service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("{0} not found")]
    EditRequestNotFound(EditRequestId),
    #[error("{actor} is not permitted to {action}")]
    Forbidden { actor: String, action: &'static str },
    #[error("validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
