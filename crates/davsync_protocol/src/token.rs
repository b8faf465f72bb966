//! Composite sync token codec.
//!
//! A sync token names the state of a collection as seen by a client. Primary
//! calendars carry two independently versioned streams (events and tasks), so
//! their token is the pair `"{calendar}/{tasks}"`. Every other collection
//! carries a bare `"{calendar}"`.
//!
//! ## Wire Format
//!
//! ```text
//! ""        initial sync, the client has never synchronized
//! "0"       calendar stream at version 0, no task stream
//! "5/2"     calendar stream at version 5, task stream at version 2
//! ```
//!
//! The empty token is distinct from `"0"`: a client at version 0 receives a
//! diff, an initial client receives the full membership.

use crate::error::{TokenError, TokenResult};
use std::fmt;
use std::str::FromStr;

/// Separator between the calendar and task sub-tokens.
pub const TOKEN_DELIMITER: char = '/';

/// A decoded composite sync token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncToken {
    /// No prior sync.
    Initial,
    /// A position in the calendar stream and, for primary calendars, in the
    /// task stream.
    At {
        /// Calendar sub-token.
        calendar: u64,
        /// Task sub-token, present only when a task stream is tracked.
        tasks: Option<u64>,
    },
}

impl SyncToken {
    /// Creates a token at the given stream positions.
    pub fn at(calendar: u64, tasks: Option<u64>) -> Self {
        Self::At { calendar, tasks }
    }

    /// Encodes a sub-token pair to its wire form.
    ///
    /// `encode(a, None)` never contains the delimiter.
    pub fn encode(calendar: u64, tasks: Option<u64>) -> String {
        match tasks {
            Some(tasks) => format!("{calendar}{TOKEN_DELIMITER}{tasks}"),
            None => calendar.to_string(),
        }
    }

    /// Decodes a wire token.
    ///
    /// Surrounding whitespace is ignored. An empty token decodes to
    /// [`SyncToken::Initial`].
    ///
    /// # Errors
    ///
    /// Returns an error if a part is not a plain unsigned integer or if the
    /// token holds more than two parts.
    pub fn decode(token: &str) -> TokenResult<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Ok(Self::Initial);
        }

        let mut parts = trimmed.split(TOKEN_DELIMITER);
        let calendar = parse_part(trimmed, parts.next().unwrap_or_default())?;
        let tasks = match parts.next() {
            Some(part) => Some(parse_part(trimmed, part)?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(TokenError::TooManyParts(trimmed.to_string()));
        }

        Ok(Self::At { calendar, tasks })
    }

    /// Decodes an optional client token, treating absence as initial sync.
    pub fn from_client(token: Option<&str>) -> TokenResult<Self> {
        token.map_or(Ok(Self::Initial), Self::decode)
    }

    /// Returns the wire form of this token (empty for [`SyncToken::Initial`]).
    pub fn to_wire(&self) -> String {
        match self {
            Self::Initial => String::new(),
            Self::At { calendar, tasks } => Self::encode(*calendar, *tasks),
        }
    }

    /// Returns true if this token requests an initial sync.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }

    /// Returns the calendar sub-token.
    pub fn calendar(&self) -> Option<u64> {
        match self {
            Self::Initial => None,
            Self::At { calendar, .. } => Some(*calendar),
        }
    }

    /// Returns the task sub-token.
    pub fn tasks(&self) -> Option<u64> {
        match self {
            Self::Initial => None,
            Self::At { tasks, .. } => *tasks,
        }
    }
}

fn parse_part(token: &str, part: &str) -> TokenResult<u64> {
    // u64::from_str would accept a leading '+'
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::invalid_number(token, part));
    }
    part.parse()
        .map_err(|_| TokenError::invalid_number(token, part))
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for SyncToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
