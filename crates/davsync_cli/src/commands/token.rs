//! Token command implementation.

use davsync_protocol::{SyncToken, TokenResult};

/// Encodes a composite token.
pub fn encode(calendar: u64, tasks: Option<u64>) -> String {
    SyncToken::encode(calendar, tasks)
}

/// Describes a wire token.
pub fn decode(token: &str) -> TokenResult<String> {
    Ok(match SyncToken::decode(token)? {
        SyncToken::Initial => "initial sync".to_string(),
        SyncToken::At { calendar, tasks: None } => format!("calendar {calendar}"),
        SyncToken::At {
            calendar,
            tasks: Some(tasks),
        } => format!("calendar {calendar}, tasks {tasks}"),
    })
}
