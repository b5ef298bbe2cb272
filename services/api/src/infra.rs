use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use underwriter::config::UnderwritingConfig;
use underwriter::workflows::underwriting::rules::{load_risk_grades, load_rule_entries};
use underwriter::workflows::underwriting::{
    AuditEntry, Case, CaseEvent, CaseId, CaseRepository, EditRequest, EditRequestId,
    NotificationError, NotificationSink, RepositoryError, RiskGradeTable, RuleImportError,
    RuleTable,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    /// Rule rows the service was started with; the evaluate endpoint falls back to them.
    pub(crate) rules: Arc<RuleTable>,
}

#[derive(Default)]
struct CaseStore {
    cases: BTreeMap<CaseId, Case>,
    audit: Vec<AuditEntry>,
    edit_requests: BTreeMap<EditRequestId, EditRequest>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCaseRepository {
    store: Arc<Mutex<CaseStore>>,
}

impl InMemoryCaseRepository {
    fn lock(&self) -> Result<MutexGuard<'_, CaseStore>, RepositoryError> {
        self.store
            .lock()
            .map_err(|_| RepositoryError::Unavailable("case store mutex poisoned".to_string()))
    }
}

impl CaseRepository for InMemoryCaseRepository {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.cases.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.cases.insert(case.id, case.clone());
        Ok(case)
    }

    fn fetch(&self, id: CaseId) -> Result<Option<Case>, RepositoryError> {
        Ok(self.lock()?.cases.get(&id).cloned())
    }

    fn active(&self) -> Result<Vec<Case>, RepositoryError> {
        Ok(self
            .lock()?
            .cases
            .values()
            .filter(|case| !case.is_deleted())
            .cloned()
            .collect())
    }

    fn commit(&self, case: Case, audit: Vec<AuditEntry>) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if !guard.cases.contains_key(&case.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.cases.insert(case.id, case);
        guard.audit.extend(audit);
        Ok(())
    }

    fn audit_log(&self, id: CaseId) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self
            .lock()?
            .audit
            .iter()
            .filter(|entry| entry.case_id == id)
            .cloned()
            .collect())
    }

    fn insert_edit_request(&self, request: EditRequest) -> Result<EditRequest, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.edit_requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.edit_requests.insert(request.id, request.clone());
        Ok(request)
    }

    fn save_edit_request(&self, request: EditRequest) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.edit_requests.get_mut(&request.id) {
            Some(stored) => {
                *stored = request;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_edit_request(
        &self,
        id: EditRequestId,
    ) -> Result<Option<EditRequest>, RepositoryError> {
        Ok(self.lock()?.edit_requests.get(&id).cloned())
    }

    fn edit_requests(&self, case_id: CaseId) -> Result<Vec<EditRequest>, RepositoryError> {
        Ok(self
            .lock()?
            .edit_requests
            .values()
            .filter(|request| request.case_id == case_id)
            .cloned()
            .collect())
    }
}

/// Logs every case event and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink {
    events: Arc<Mutex<Vec<CaseEvent>>>,
}

impl NotificationSink for LoggingNotificationSink {
    fn publish(&self, event: CaseEvent) -> Result<(), NotificationError> {
        info!(
            kind = ?event.kind,
            case_id = %event.case_id,
            actor = %event.actor,
            message = %event.message,
            "case notification"
        );
        self.events
            .lock()
            .map_err(|_| NotificationError::Transport("notification mutex poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl LoggingNotificationSink {
    pub(crate) fn events(&self) -> Vec<CaseEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

/// Stored rule rows from the configured CSV, or an empty table when none is set.
pub(crate) fn load_rule_table(config: &UnderwritingConfig) -> Result<RuleTable, RuleImportError> {
    match &config.rules_csv {
        Some(path) => {
            let entries = load_rule_entries(path)?;
            info!(path = %path.display(), rows = entries.len(), "loaded underwriting rules");
            Ok(RuleTable::new(entries))
        }
        None => Ok(RuleTable::default()),
    }
}

/// Risk-grade thresholds from the configured CSV, or the seeded grade table.
pub(crate) fn load_risk_grade_table(
    config: &UnderwritingConfig,
) -> Result<RiskGradeTable, RuleImportError> {
    match &config.risk_grades_csv {
        Some(path) => {
            let table = load_risk_grades(path)?;
            info!(
                path = %path.display(),
                grades = table.thresholds().len(),
                "loaded risk grade thresholds"
            );
            Ok(table)
        }
        None => Ok(RiskGradeTable::seeded()),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}
