//! Error types for the causal engine.
//!
//! All errors are strongly typed using thiserror. Missing evidence is *not*
//! an error (it is `Evidence::Unknown`), and DAG edge rejections are plain
//! booleans; what remains here are validation, transport and storage failures.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur during input validation.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Symptom cannot be empty")]
    EmptySymptom,

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Configuration value '{field}' is invalid: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },
}

/// Transport errors raised by evidence adapters and notification dispatch.
///
/// These never cross into the agent loop: evidence failures are degraded to
/// `Evidence::Unknown` and notification failures to a rejected dispatch.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Evidence source '{source_name}' unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Evidence source '{source_name}' timed out after {duration_ms}ms")]
    Timeout {
        source_name: String,
        duration_ms: u64,
    },

    #[error("Notification dispatch failed: {message}")]
    NotificationFailed {
        message: String,
    },
}

/// Top-level error type for the causal engine.
#[derive(Debug, Error)]
pub enum CausalError {
    /// Bad input or configuration.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An adapter or notifier failure that was not degraded.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Trace store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CausalError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same query may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Transport(e) => matches!(
                e,
                TransportError::Timeout { .. } | TransportError::SourceUnavailable { .. }
            ),
            Self::Storage(e) => matches!(e, StorageError::BackendError(_)),
        }
    }
}

/// Result type alias for causal engine operations.
pub type CausalResult<T> = Result<T, CausalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_field_too_long() {
        let err = ValidationError::FieldTooLong {
            field: "symptom".to_string(),
            max_length: 512,
        };
        let msg = format!("{err}");
        assert!(msg.contains("symptom"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn test_transport_error_timeout() {
        let err = TransportError::Timeout {
            source_name: "cgm_stelo".to_string(),
            duration_ms: 5000,
        };
        let msg = format!("{err}");
        assert!(msg.contains("cgm_stelo"));
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_causal_error_from_validation() {
        let err: CausalError = ValidationError::EmptySymptom.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_causal_error_from_storage() {
        let err: CausalError = StorageError::BackendError("disk full".to_string()).into();
        assert!(err.is_storage());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_causal_error_trace_not_found() {
        let err: CausalError = StorageError::TraceNotFound(crate::trace::TraceId::new()).into();
        assert!(err.is_storage());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Trace not found"));
    }

    #[test]
    fn test_validation_error_invalid_field() {
        let err = ValidationError::InvalidField {
            field: "glucose".to_string(),
            reason: "expected glucose evidence".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("glucose"));
        assert!(msg.contains("expected glucose evidence"));
    }

    #[test]
    fn test_causal_error_retryable() {
        let err: CausalError = TransportError::NotificationFailed {
            message: "refused".to_string(),
        }
        .into();
        assert!(!err.is_retryable());

        let err: CausalError = TransportError::Timeout {
            source_name: "apple_health".to_string(),
            duration_ms: 100,
        }
        .into();
        assert!(err.is_retryable());
    }
}
