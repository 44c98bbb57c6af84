//! Error types for name parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The name is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The name exceeds the maximum length for its kind.
    #[error("{kind} is too long: {actual} characters (max {max})")]
    TooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },

    /// The name contains a character not allowed for its kind.
    #[error("invalid character {character:?} in {kind} '{value}'")]
    InvalidCharacter {
        kind: &'static str,
        character: char,
        value: String,
    },

    /// The application ID does not have exactly three `:`-separated parts.
    #[error("malformed application ID '{0}': expected tenant:application:instance")]
    MalformedApplicationId(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }

    /// Returns true if this error indicates a character outside the allowed set.
    pub fn is_character_error(&self) -> bool {
        matches!(self, IdError::InvalidCharacter { .. })
    }
}
