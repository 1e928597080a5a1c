//! Error types for ledger, policy and claim operations.

use axum::http::StatusCode;
use thiserror::Error;

use crate::model::IntegrityViolation;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Rejected input: negative amount, empty party, malformed policy record.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The chain has no blocks. Unreachable after construction.
    #[error("ledger has no blocks")]
    EmptyLedger,

    /// Oracle event with no entry in the event table.
    #[error("unrecognized oracle event: {0}")]
    UnrecognizedEvent(String),

    #[error("integrity violation: {0}")]
    Integrity(IntegrityViolation),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot codec error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP status used when the error crosses the service boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnrecognizedEvent(_) | Self::Integrity(_) | Self::Snapshot(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::EmptyLedger => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for (StatusCode, String) {
    fn from(err: LedgerError) -> Self {
        (err.status(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            LedgerError::validation("amount").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::UnrecognizedEvent("Meteor".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            LedgerError::EmptyLedger.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn tuple_conversion_keeps_message() {
        let (code, msg): (StatusCode, String) =
            LedgerError::UnrecognizedEvent("Meteor".into()).into();
        assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(msg.contains("Meteor"));
    }
}
