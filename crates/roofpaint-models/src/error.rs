//! Validation error types.

use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// A caller-supplied field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {message}")]
pub struct ValidationError {
    /// Name of the offending form field (`image` or `color`)
    pub field: &'static str,
    /// Human-readable reason
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn image(message: impl Into<String>) -> Self {
        Self::new("image", message)
    }

    pub fn color(message: impl Into<String>) -> Self {
        Self::new("color", message)
    }
}
