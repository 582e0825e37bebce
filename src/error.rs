//! Error types for contact reconciliation
//!
//! Errors are classified by who can fix them:
//! - Client: the request itself is unusable (nothing to match on)
//! - Retryable: another writer got there first; re-run from matching
//! - Server: the store is unreachable or its data is beyond repair

use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    // Client errors
    #[error("Email or phoneNumber is required")]
    InvalidInput,

    // Retryable errors
    #[error("Concurrent update conflicted with reconciliation: {0}")]
    Conflict(String),

    // Server errors
    #[error("Contact store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Contact link integrity violated: {0}")]
    IntegrityViolation(String),
}

impl ReconcileError {
    /// Returns true if re-running the reconciliation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Conflict(_))
    }

    /// Returns true if the caller sent a request that can never succeed.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ReconcileError::InvalidInput)
    }
}

impl From<DbError> for ReconcileError {
    fn from(err: DbError) -> Self {
        if err.is_busy() {
            ReconcileError::Conflict(err.to_string())
        } else {
            ReconcileError::StoreUnavailable(err.to_string())
        }
    }
}

/// JSON error body: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl From<&ReconcileError> for ErrorBody {
    fn from(err: &ReconcileError) -> Self {
        ErrorBody::new(err.to_string())
    }
}
