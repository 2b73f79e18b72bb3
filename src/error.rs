//! Error types for identilink.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific failure classes. Remote-scoring failures on the prediction path
//! never reach callers (they degrade to the fallback rule); administrative
//! calls and configuration problems do.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur during input or configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Entity id cannot be empty")]
    EmptyEntityId,

    #[error("Similarity score '{field}' is not finite: {value}")]
    NonFiniteScore {
        field: String,
        value: f64,
    },

    #[error("Confidence threshold {value} is out of range [0.0, 1.0]")]
    ThresholdOutOfRange {
        value: f64,
    },

    #[error("Invalid configuration for '{key}': {reason}")]
    InvalidConfig {
        key: String,
        reason: String,
    },
}

/// Errors raised while talking to the remote scoring service.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring request to {endpoint} timed out after {duration_ms}ms")]
    Timeout {
        endpoint: String,
        duration_ms: u64,
    },

    #[error("Connection to scoring service failed: {message}")]
    Connection {
        message: String,
    },

    #[error("Scoring service returned status {code}: {body}")]
    Status {
        code: u16,
        body: String,
    },

    #[error("Failed to decode scoring response: {message}")]
    Decode {
        message: String,
    },

    #[error("Batch response has {actual} predictions, expected {expected}")]
    Misaligned {
        expected: usize,
        actual: usize,
    },
}

impl ScoringError {
    /// Short label for metrics tags.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
            Self::Misaligned { .. } => "misaligned",
        }
    }
}

/// Top-level error type for identilink.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl MatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a remote scoring error.
    #[must_use]
    pub const fn is_scoring(&self) -> bool {
        matches!(self, Self::Scoring(_))
    }

    /// Returns true if the caller may reasonably retry.
    ///
    /// The engine itself never retries; this is advisory for hosts.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Scoring(e) => match e {
                ScoringError::Timeout { .. } | ScoringError::Connection { .. } => true,
                ScoringError::Status { code, .. } => *code >= 500,
                ScoringError::Decode { .. } | ScoringError::Misaligned { .. } => false,
            },
            Self::Storage(e) => matches!(e, StorageError::ConnectionError(_)),
        }
    }
}

/// Result type alias for identilink operations.
pub type MatchResult<T> = Result<T, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_threshold() {
        let err = ValidationError::ThresholdOutOfRange { value: 1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_scoring_error_timeout() {
        let err = ScoringError::Timeout {
            endpoint: "/predict/match".to_string(),
            duration_ms: 5000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("5000ms"));
        assert!(msg.contains("/predict/match"));
    }

    #[test]
    fn test_match_error_from_validation() {
        let err: MatchError = ValidationError::EmptyEntityId.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_match_error_retryable() {
        let err: MatchError = ScoringError::Connection {
            message: "refused".to_string(),
        }
        .into();
        assert!(err.is_scoring());
        assert!(err.is_retryable());

        let err: MatchError = ScoringError::Status {
            code: 503,
            body: "unavailable".to_string(),
        }
        .into();
        assert!(err.is_retryable());

        let err: MatchError = ScoringError::Status {
            code: 422,
            body: "bad features".to_string(),
        }
        .into();
        assert!(!err.is_retryable());

        let err: MatchError = ScoringError::Misaligned {
            expected: 3,
            actual: 2,
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_match_error_internal() {
        let err = MatchError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
