//! Unified error type for the budget-streak core.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants mirror the
//! failure classes callers need to tell apart: bad input, a collaborator breaking its
//! contract, a conflicting in-flight pass, and storage failures.

use crate::llm::LlmError;
use thiserror::Error;

/// Errors produced by the budget-streak core.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A raw calendar item (or other caller input) is malformed
    #[error("Validation error: {message}")]
    Validation {
        /// What went wrong
        message: String,
    },

    /// The allocation collaborator returned something that is not the agreed JSON shape
    #[error("Malformed allocation response: {reason}")]
    MalformedResponse {
        /// Why the response was rejected
        reason: String,
        /// The raw collaborator text, kept for diagnosis
        raw: String,
    },

    /// A well-formed allocation response exceeds the spendable cap
    #[error("Allocation total {total} exceeds spendable cap {cap}")]
    ConstraintViolation {
        /// Sum of the returned budgets
        total: i64,
        /// Cap supplied with the request
        cap: i64,
    },

    /// A sync/allocation pass is already running for this user
    #[error("A sync pass is already in flight for user {user_id}")]
    SyncConflict {
        /// User whose pass is in flight
        user_id: String,
    },

    /// Record-store read or write failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    /// Transport-level failure talking to a language-model collaborator
    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    /// A collaborator call exceeded its deadline
    #[error("Collaborator call timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds
        seconds: u64,
    },

    /// Calendar source failure
    #[error("Calendar source error: {message}")]
    Calendar {
        /// What went wrong
        message: String,
    },

    /// Amount is negative, zero where not allowed, or not finite
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// Offending amount
        amount: f64,
    },

    /// No active goal exists for the user
    #[error("No active goal for user {user_id}")]
    GoalNotFound {
        /// User that was looked up
        user_id: String,
    },

    /// The user already has an active goal
    #[error("Goal '{name}' is already active")]
    GoalAlreadyActive {
        /// Name of the active goal
        name: String,
    },

    /// JSON encoding failure while building a collaborator request
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Integer conversion error
    #[error("Integer conversion error: {0}")]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl Error {
    /// Whether the user may simply re-trigger the action that failed.
    ///
    /// Allocation and sync failures never commit partial state, so re-running the
    /// whole pass is always safe.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse { .. }
                | Self::ConstraintViolation { .. }
                | Self::SyncConflict { .. }
                | Self::Llm(_)
                | Self::Timeout { .. }
                | Self::Calendar { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(
            Error::MalformedResponse {
                reason: "not json".to_string(),
                raw: "oops".to_string(),
            }
            .is_retryable()
        );
        assert!(Error::ConstraintViolation { total: 10, cap: 5 }.is_retryable());
        assert!(
            Error::SyncConflict {
                user_id: "u1".to_string()
            }
            .is_retryable()
        );
        assert!(Error::Timeout { seconds: 1 }.is_retryable());
        assert!(
            !Error::Validation {
                message: "bad".to_string()
            }
            .is_retryable()
        );
        assert!(!Error::Persistence(sea_orm::DbErr::Custom("down".to_string())).is_retryable());
    }

    #[test]
    fn test_malformed_response_keeps_raw_text_out_of_display() {
        let err = Error::MalformedResponse {
            reason: "expected a JSON array".to_string(),
            raw: "{\"secret\": true}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed allocation response: expected a JSON array"
        );
    }
}
