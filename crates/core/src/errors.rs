use thiserror::Error;

use crate::domain::requisition::{RequisitionId, RequisitionStatus};
use crate::repository::RepositoryError;

/// Deterministic rejections produced by the state machine and lifecycle.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("requisition `{id}` has no pending step to act on")]
    NoActionableStep { id: RequisitionId },
    #[error("requisition `{id}` is already {status:?}")]
    AlreadyResolved { id: RequisitionId, status: RequisitionStatus },
    #[error("level {level} has no access to requisitions")]
    AccessDenied { level: u8 },
    #[error("level {actor_level} may not act on a step requiring level {required_level}")]
    WrongReviewerLevel { actor_level: u8, required_level: u8 },
    #[error("requisition `{id}` is approved and cannot be deleted without administrative override")]
    DeleteForbidden { id: RequisitionId },
}

/// Failure of a notification or audit sink. Always logged, never surfaced
/// as a failure of the approval action that triggered it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("side effect dispatch failed: {0}")]
pub struct SideEffectError(pub String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("requisition `{0}` not found")]
    NotFound(RequisitionId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("concurrent modification of requisition `{0}` detected")]
    Conflict(RequisitionId),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    /// Stable, user-safe wording. Callers surface this directly so a user
    /// can tell "you are not the approver" apart from "already resolved"
    /// without seeing internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "The request could not be processed. Check inputs and try again.",
            Self::NotFound(_) => "The requisition does not exist or is not visible to you.",
            Self::Domain(DomainError::NoActionableStep { .. })
            | Self::Domain(DomainError::AlreadyResolved { .. }) => {
                "This requisition is already resolved; nothing is awaiting action."
            }
            Self::Domain(DomainError::AccessDenied { .. })
            | Self::Domain(DomainError::WrongReviewerLevel { .. }) => {
                "You are not the approver for the current step."
            }
            Self::Domain(DomainError::DeleteForbidden { .. }) => {
                "Approved requisitions can only be deleted by an administrator."
            }
            Self::Conflict(_) => "The requisition changed while you were acting. Reload and retry.",
            Self::Persistence(_) => "The service is temporarily unavailable. Please retry shortly.",
        }
    }

    /// Conflicts are the only retryable failure; the engine never retries
    /// on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<RepositoryError> for EngineError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::Conflict(id) => Self::Conflict(id),
            RepositoryError::Storage(message) => Self::Persistence(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::requisition::RequisitionId;
    use crate::repository::RepositoryError;

    use super::{DomainError, EngineError};

    #[test]
    fn wrong_level_and_nothing_pending_are_distinguishable() {
        let wrong_level =
            EngineError::from(DomainError::WrongReviewerLevel { actor_level: 7, required_level: 6 });
        let nothing_pending =
            EngineError::from(DomainError::NoActionableStep { id: RequisitionId("r".into()) });

        assert_ne!(wrong_level.user_message(), nothing_pending.user_message());
    }

    #[test]
    fn only_conflicts_are_retryable() {
        let conflict = EngineError::from(RepositoryError::Conflict(RequisitionId("r".into())));
        assert!(conflict.is_retryable());
        assert!(matches!(conflict, EngineError::Conflict(_)));

        let not_found = EngineError::from(RepositoryError::NotFound(RequisitionId("r".into())));
        assert!(!not_found.is_retryable());
    }
}
