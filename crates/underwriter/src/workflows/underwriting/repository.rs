use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::domain::{Case, CaseId, ClientType, Decision, UserId};
use super::duplicates::{IdentityKeys, MatchKey};
use super::rules::{RiskGradeTable, RiskGradeThreshold, RuleEntry, RuleTable};

/// One changed field, with the identity that changed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub case_id: CaseId,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor: UserId,
    pub recorded_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditRequestId(pub u64);

impl fmt::Display for EditRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edit-request-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditRequestStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

/// Request to reopen a saved or concluded case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub id: EditRequestId,
    pub case_id: CaseId,
    pub requested_by: UserId,
    pub reason: String,
    pub status: EditRequestStatus,
    pub reviewed_by: Option<UserId>,
    pub review_comment: Option<String>,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

/// Compact listing view of a case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseSummary {
    pub case_id: CaseId,
    pub client_type: ClientType,
    pub display_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_pv: Option<f64>,
    pub conclusion_version: u32,
    pub created_at: NaiveDateTime,
}

impl Case {
    pub fn summary(&self) -> CaseSummary {
        CaseSummary {
            case_id: self.id,
            client_type: self.client_type(),
            display_name: self.display_name(),
            status: self.status.label(),
            auto_decision: self.verdict.as_ref().map(|verdict| verdict.decision),
            recommended_pv: self.verdict.as_ref().map(|verdict| verdict.recommended_pv),
            conclusion_version: self.conclusion_version,
            created_at: self.created_at,
        }
    }
}

/// Case storage. Implementations must make `commit` atomic per case.
pub trait CaseRepository: Send + Sync {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError>;
    fn fetch(&self, id: CaseId) -> Result<Option<Case>, RepositoryError>;
    /// Every non-deleted case in creation order.
    fn active(&self) -> Result<Vec<Case>, RepositoryError>;
    /// Replace the stored case and append its audit entries in one write.
    fn commit(&self, case: Case, audit: Vec<AuditEntry>) -> Result<(), RepositoryError>;
    fn audit_log(&self, id: CaseId) -> Result<Vec<AuditEntry>, RepositoryError>;

    fn insert_edit_request(&self, request: EditRequest) -> Result<EditRequest, RepositoryError>;
    fn save_edit_request(&self, request: EditRequest) -> Result<(), RepositoryError>;
    fn fetch_edit_request(&self, id: EditRequestId)
        -> Result<Option<EditRequest>, RepositoryError>;
    fn edit_requests(&self, case_id: CaseId) -> Result<Vec<EditRequest>, RepositoryError>;

    /// Non-deleted cases whose normalized `key` equals `value`. Indexed stores should override.
    fn matching(&self, key: MatchKey, value: &str) -> Result<Vec<Case>, RepositoryError> {
        Ok(self
            .active()?
            .into_iter()
            .filter(|case| IdentityKeys::of(case).get(key) == Some(value))
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Source of stored rule rows, read at evaluation time.
pub trait RuleStore: Send + Sync {
    fn rule_entries(&self) -> Result<Vec<RuleEntry>, RepositoryError>;
}

pub trait RiskGradeStore: Send + Sync {
    /// Active threshold for `grade`, compared case-insensitively.
    fn active_threshold(&self, grade: &str) -> Result<Option<RiskGradeThreshold>, RepositoryError>;
}

impl RuleStore for RuleTable {
    fn rule_entries(&self) -> Result<Vec<RuleEntry>, RepositoryError> {
        Ok(self.entries().to_vec())
    }
}

impl RiskGradeStore for RiskGradeTable {
    fn active_threshold(&self, grade: &str) -> Result<Option<RiskGradeThreshold>, RepositoryError> {
        Ok(self.find_active(grade).cloned())
    }
}

/// Outbound notification hook (email, chat, in-app inbox adapters).
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: CaseEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseEventKind {
    CaseSaved,
    CaseConcluded,
    DuplicatesFound,
    EditRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseEvent {
    pub kind: CaseEventKind,
    pub case_id: CaseId,
    pub actor: UserId,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
