//! Error types for the Brain state store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A batch was rolled back; nothing it contained was applied.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

/// Caller-facing classification of a [`StateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    PreconditionFailed,
    TransactionFailed,
    StorageUnavailable,
}

impl StateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StateError::NotFound(_) => ErrorKind::NotFound,
            StateError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            StateError::TransactionFailed(_) => ErrorKind::TransactionFailed,
            StateError::Open(_)
            | StateError::Transaction(_)
            | StateError::Table(_)
            | StateError::Read(_)
            | StateError::Write(_)
            | StateError::Serialize(_)
            | StateError::Deserialize(_) => ErrorKind::StorageUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_storage_unavailable() {
        for err in [
            StateError::Open("disk".into()),
            StateError::Write("full".into()),
            StateError::Deserialize("corrupt".into()),
        ] {
            assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        }
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::PreconditionFailed).unwrap();
        assert_eq!(json, "\"precondition_failed\"");
    }
}
