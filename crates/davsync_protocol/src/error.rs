//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for token decoding.
pub type TokenResult<T> = Result<T, TokenError>;

/// Errors that can occur while decoding a sync token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// A sub-token is not an unsigned integer.
    #[error("invalid sub-token {part:?} in sync token {token:?}")]
    InvalidNumber {
        /// The full token as received.
        token: String,
        /// The offending part.
        part: String,
    },

    /// The token has more parts than the format allows.
    #[error("too many parts in sync token {0:?}")]
    TooManyParts(String),
}

impl TokenError {
    /// Creates an invalid number error.
    pub fn invalid_number(token: impl Into<String>, part: impl Into<String>) -> Self {
        Self::InvalidNumber {
            token: token.into(),
            part: part.into(),
        }
    }
}
