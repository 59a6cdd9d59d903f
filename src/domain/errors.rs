//! Error types for the domain layer.

use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: &'static str },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: &'static str) -> Self {
        ValidationError::EmptyField { field }
    }
}
