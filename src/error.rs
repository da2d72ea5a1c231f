//! Error types for the compiler and runtime

use thiserror::Error;

/// Main error type for compilation and execution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsError {
    #[error("SyntaxError: {message}")]
    SyntaxError { message: String },

    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("ReferenceError: {message}")]
    ReferenceError { name: String, message: String },

    /// Compiler-internal consistency violation. The compilation unit is abandoned.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A property descriptor was constructed from contradictory attributes
    #[error("Invalid property descriptor: {0}")]
    InvalidDescriptor(String),
}

impl JsError {
    pub fn syntax_error(message: impl Into<String>) -> Self {
        JsError::SyntaxError {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        JsError::TypeError {
            message: message.into(),
        }
    }

    pub fn reference_error(name: impl Into<String>) -> Self {
        let name = name.into();
        JsError::ReferenceError {
            message: format!("{} is not defined", name),
            name,
        }
    }

    pub fn reference_error_with_message(
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        JsError::ReferenceError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an internal error for unexpected compiler states
    /// These should never happen in correctly-written code
    pub fn internal_error(message: impl Into<String>) -> Self {
        JsError::Internal(message.into())
    }

    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        JsError::InvalidDescriptor(message.into())
    }

    /// Whether this error indicates a defect in the compiler rather than in the program
    pub fn is_internal(&self) -> bool {
        matches!(self, JsError::Internal(_))
    }
}
