//! Leasing-case underwriting.
//!
//! The pure engine (calculator, delinquency classifier, verdict composer, duplicate detector,
//! validation, lifecycle) takes explicit snapshots and never touches storage. The service and
//! router wrap it with persistence, audit, permissions, and notifications.

pub mod calculator;
pub mod compliance;
pub mod domain;
pub mod duplicates;
pub mod evaluation;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod rules;
pub mod service;

#[cfg(test)]
mod tests;

pub use calculator::{annuity_payment, calculate, debt_to_income};
pub use compliance::{
    risk_grade_gate, validate_for_conclude, validate_for_save, CaseValidator, ValidationIssue,
    ValidationPolicy,
};
pub use domain::{
    Actor, Case, CaseId, CaseInput, CaseProfile, CaseStatus, ClientType, CompanyInfo,
    Conclusion, ConclusionDecision, ContactPerson, CreditHistory, DealTerms, Decision,
    DelinquencyCategory, DelinquencyParty, DelinquencySource, DerivedFields, DirectorInfo,
    Guarantor, IncomeSource, IndividualIncome, IndividualProfile, LegalEntityIncome,
    LegalEntityProfile, Permissions, RelativeContact, UserId, Verdict,
};
pub use duplicates::{find_duplicates, normalize_phone, DuplicateMatch, IdentityKeys, MatchKey};
pub use evaluation::{
    compose_verdict, evaluate_verdict, months_since, Assessment, DelinquencyAssessment,
    UnderwritingEngine,
};
pub use lifecycle::{next_status, Transition, TransitionError};
pub use repository::{
    AuditEntry, CaseEvent, CaseEventKind, CaseRepository, CaseSummary, EditRequest,
    EditRequestId, EditRequestStatus, NotificationError, NotificationSink, RepositoryError,
    RiskGradeStore, RuleStore,
};
pub use router::underwriting_router;
pub use rules::{
    RiskGradeTable, RiskGradeThreshold, RuleBook, RuleEntry, RuleImportError, RuleKey, RuleTable,
    RuleValue,
};
pub use service::{ConclusionRequest, SaveOutcome, ServiceError, UnderwritingService};
