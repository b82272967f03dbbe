//! Error types for the authorization engine

use thiserror::Error;

use crate::expr::ExprError;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed model configuration; the engine refuses to start
    #[error("Model configuration error: {0}")]
    ModelConfig(String),

    /// Malformed matcher expression
    #[error("Matcher compile error: {0}")]
    MatcherCompile(String),

    /// Matcher failed while evaluating one policy rule
    #[error("Matcher evaluation error: {0}")]
    MatcherEval(String),

    /// Error reported by the storage adapter
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Policy rule does not fit the model
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExprError> for AuthzError {
    fn from(err: ExprError) -> Self {
        if err.is_compile_error() {
            AuthzError::MatcherCompile(err.to_string())
        } else {
            AuthzError::MatcherEval(err.to_string())
        }
    }
}

/// Errors reported by policy adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The adapter cannot perform this operation (e.g. read-only adapters)
    #[error("operation not supported by adapter: {0}")]
    NotSupported(&'static str),

    /// Underlying storage failed
    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored policy text could not be parsed
    #[error("malformed policy line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Backend-specific failure
    #[error("adapter backend error: {0}")]
    Backend(String),
}

impl AdapterError {
    /// Whether this error only signals a missing capability
    pub fn is_not_supported(&self) -> bool {
        matches!(self, AdapterError::NotSupported(_))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
