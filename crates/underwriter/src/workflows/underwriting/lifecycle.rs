use super::domain::{CaseStatus, ConclusionDecision};

/// Requested change of case state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    EditDraft,
    Save { edit_approved: bool },
    Conclude(ConclusionDecision),
    RequestEdit,
    Reopen,
    Delete,
}

impl Transition {
    pub const fn action(self) -> &'static str {
        match self {
            Transition::EditDraft => "edit",
            Transition::Save { .. } => "save",
            Transition::Conclude(_) => "conclude",
            Transition::RequestEdit => "request an edit of",
            Transition::Reopen => "reopen",
            Transition::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a case in status {status}")]
    NotAllowed {
        action: &'static str,
        status: CaseStatus,
    },
    #[error("case is deleted")]
    Deleted,
}

/// The state machine. Anything not listed is rejected.
pub fn next_status(
    current: CaseStatus,
    transition: Transition,
) -> Result<CaseStatus, TransitionError> {
    if current == CaseStatus::Deleted {
        return Err(TransitionError::Deleted);
    }

    let next = match (current, transition) {
        (CaseStatus::Draft, Transition::EditDraft) => Some(CaseStatus::Draft),
        (CaseStatus::Draft, Transition::Save { edit_approved }) => Some(if edit_approved {
            CaseStatus::Review
        } else {
            CaseStatus::Saved
        }),
        (status, Transition::Conclude(decision)) if status.accepts_conclusion() => {
            Some(decision.status())
        }
        (status, Transition::RequestEdit) if status != CaseStatus::Draft => Some(status),
        (status, Transition::Reopen) if status != CaseStatus::Draft => Some(CaseStatus::Draft),
        (_, Transition::Delete) => Some(CaseStatus::Deleted),
        _ => None,
    };

    next.ok_or(TransitionError::NotAllowed {
        action: transition.action(),
        status: current,
    })
}
