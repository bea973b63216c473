//! Error types for the match lifecycle engine
//!
//! Every lifecycle operation fails with exactly one `MatchError` variant. Transport
//! layers map `MatchError::kind()` onto their own status codes.

use crate::types::{MatchState, Team};
use serde::{Deserialize, Serialize};

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MatchError>;

/// Custom error types for match lifecycle scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Match {match_id} is {state}, cannot {operation}")]
    InvalidState {
        match_id: String,
        state: MatchState,
        operation: &'static str,
    },

    #[error("User {user_id} may not perform this action: {reason}")]
    Forbidden { user_id: String, reason: String },

    #[error("Team {team} of match {match_id} is full (capacity {capacity})")]
    CapacityExceeded {
        match_id: String,
        team: Team,
        capacity: u32,
    },

    #[error("User {user_id} is already a member of match {match_id}")]
    AlreadyMember { match_id: String, user_id: String },

    #[error("Team {team} of match {match_id} already has a different voter")]
    ConflictingVoter { match_id: String, team: Team },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Dependency failure: {message}")]
    DependencyFailure { message: String },
}

/// Stable, transport-agnostic classification of a `MatchError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Forbidden,
    CapacityExceeded,
    AlreadyMember,
    ConflictingVoter,
    Validation,
    InvariantViolation,
    DependencyFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::AlreadyMember => "already_member",
            ErrorKind::ConflictingVoter => "conflicting_voter",
            ErrorKind::Validation => "validation_error",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::DependencyFailure => "dependency_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::NotFound { .. } => ErrorKind::NotFound,
            MatchError::InvalidState { .. } => ErrorKind::InvalidState,
            MatchError::Forbidden { .. } => ErrorKind::Forbidden,
            MatchError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            MatchError::AlreadyMember { .. } => ErrorKind::AlreadyMember,
            MatchError::ConflictingVoter { .. } => ErrorKind::ConflictingVoter,
            MatchError::Validation { .. } => ErrorKind::Validation,
            MatchError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            MatchError::DependencyFailure { .. } => ErrorKind::DependencyFailure,
        }
    }

    /// Conditions the caller can fix by changing the request
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::CapacityExceeded
                | ErrorKind::ConflictingVoter
                | ErrorKind::AlreadyMember
        )
    }

    pub fn match_not_found(match_id: impl ToString) -> Self {
        MatchError::NotFound {
            entity: "Match",
            id: match_id.to_string(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        MatchError::Validation {
            reason: reason.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        MatchError::DependencyFailure {
            message: message.into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for MatchError {
    fn from(err: sqlx::Error) -> Self {
        MatchError::dependency(format!("database error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_distinct() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::InvalidState,
            ErrorKind::Forbidden,
            ErrorKind::CapacityExceeded,
            ErrorKind::AlreadyMember,
            ErrorKind::ConflictingVoter,
            ErrorKind::Validation,
            ErrorKind::InvariantViolation,
            ErrorKind::DependencyFailure,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_user_recoverable_classification() {
        let capacity = MatchError::CapacityExceeded {
            match_id: "m".to_string(),
            team: Team::One,
            capacity: 1,
        };
        assert!(capacity.is_user_recoverable());
        assert!(MatchError::validation("bad team").is_user_recoverable());

        assert!(!MatchError::match_not_found("m").is_user_recoverable());
        assert!(!MatchError::dependency("store down").is_user_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = MatchError::InvalidState {
            match_id: "abc".to_string(),
            state: MatchState::Finished,
            operation: "submit score",
        };
        assert_eq!(err.to_string(), "Match abc is Finished, cannot submit score");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
