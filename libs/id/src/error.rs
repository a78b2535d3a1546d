//! Error types for identifier and object key parsing.

use thiserror::Error;

/// Errors that can occur when parsing identifiers or object keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The prefix names a different identifier kind.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the dash separator.
    #[error("ID missing dash separator")]
    MissingSeparator,

    /// The trailing segment is not a ULID.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// An object key is not in `namespace/name` form.
    #[error("invalid object key '{key}': {message}")]
    InvalidKey { key: String, message: &'static str },
}

impl IdError {
    /// The input was the empty string.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
