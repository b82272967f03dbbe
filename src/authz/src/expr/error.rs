//! Error types for matcher expressions

use thiserror::Error;

/// Expression compilation and evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unexpected end of expression, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("unbound reference: {0}")]
    UnboundReference(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("function {name} expects {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("function {name} failed: {reason}")]
    FunctionError { name: String, reason: String },

    #[error("nested eval() exceeded depth {0}")]
    EvalDepthExceeded(usize),

    #[error("expression did not return a boolean result")]
    NonBooleanResult,
}

impl ExprError {
    /// Whether this error was raised while compiling rather than evaluating
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            ExprError::UnexpectedChar { .. }
                | ExprError::UnterminatedString(_)
                | ExprError::InvalidNumber(_)
                | ExprError::UnexpectedToken { .. }
                | ExprError::UnexpectedEnd(_)
        )
    }
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExprError>;
