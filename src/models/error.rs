//! Error types for dynaschema.
//!
//! Epistemic taxonomy:
//! - B_i falsified: The model did not deliver (empty schema, exhausted
//!   validation, unresolved field)
//! - I^B materialized: Infrastructure failures (service unreachable)
//! - Input rejected: Precondition violations and bad configuration
//! - K_i violated: Internal invariant violations (bugs)

use crate::models::TypeTag;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for dynaschema.
#[derive(Debug, Error)]
pub enum DynaschemaError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Model output could not be accepted
    // ═══════════════════════════════════════════════════════════════════
    #[error("Schema inference for '{concept}' produced no properties")]
    EmptySchema { concept: String },

    #[error("Output for '{target}' failed validation after {attempts} attempts: {reason}")]
    SchemaValidation {
        target: String,
        attempts: u32,
        reason: String,
    },

    #[error("Field '{field}' could not be validated: {reason}")]
    UnresolvedValidation { field: String, reason: String },

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Completion service unavailable: {0}")]
    ServiceUnavailable(#[from] ServiceError),

    // ═══════════════════════════════════════════════════════════════════
    // INPUT REJECTED: Preconditions and configuration
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Duplicate property name: {0}")]
    DuplicateProperty(String),

    #[error("Property name '{0}' does not normalize to an identifier")]
    InvalidProperty(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field '{field}' is {found}, not {expected}")]
    FieldType {
        field: String,
        expected: TypeTag,
        found: TypeTag,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Completion service failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Whether the transport may resubmit the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl DynaschemaError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an unresolved field validation error.
    pub fn unresolved(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvedValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is scoped to a single record rather than the session.
    pub fn is_record_scoped(&self) -> bool {
        matches!(self, Self::UnresolvedValidation { .. })
    }
}

/// Result type alias for dynaschema.
pub type Result<T> = std::result::Result<T, DynaschemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ServiceError::RateLimited { retry_after_secs: 1.0 }.is_retryable());
        assert!(ServiceError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(
            ServiceError::Api {
                status: 503,
                message: "overloaded".to_string()
            }
            .is_retryable()
        );
        assert!(
            !ServiceError::Api {
                status: 400,
                message: "bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!ServiceError::AuthenticationFailed.is_retryable());
    }

    #[test]
    fn test_record_scope() {
        assert!(DynaschemaError::unresolved("wrong_answer_1", "no replacement").is_record_scoped());
        assert!(
            !DynaschemaError::EmptySchema {
                concept: "user".to_string()
            }
            .is_record_scoped()
        );
    }

    #[test]
    fn test_messages() {
        let err = DynaschemaError::SchemaValidation {
            target: "PersonRecord".to_string(),
            attempts: 3,
            reason: "age: expected integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Output for 'PersonRecord' failed validation after 3 attempts: age: expected integer"
        );
        assert_eq!(
            ServiceError::RateLimited { retry_after_secs: 2.5 }.retry_after(),
            Some(2.5)
        );
    }
}
