//! Error types and result aliases for Meridian.
//!
//! This module defines the shared error types used across all Meridian components.
//! Errors are structured for programmatic handling and include context for debugging.

/// The result type used throughout Meridian.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Meridian core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier or namespace was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the identifier invalid.
        message: String,
    },

    /// Invalid input was provided (configuration values, request fields).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Creates a new invalid identifier error.
    #[must_use]
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }
}
