//! # davsync Protocol
//!
//! Wire-level types for the davsync change-tracking endpoint.
//!
//! This crate provides:
//! - `SyncToken` codec for composite `"{calendar}/{tasks}"` tokens
//! - `ChangeRecord`, `ChangeSet` and `ChangeReport` for incremental sync
//! - The fixed multistatus body returned by the ctag poll path
//! - Detection of ctag-only `PROPFIND` requests
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod multistatus;
mod token;

pub use change::{ChangeKind, ChangeRecord, ChangeReport, ChangeSet};
pub use error::{TokenError, TokenResult};
pub use multistatus::{
    is_ctag_only_propfind, CtagResponse, CtagStatus, CALENDARSERVER_NS, CONTENT_TYPE, ERROR_CTAG,
};
pub use token::{SyncToken, TOKEN_DELIMITER};
