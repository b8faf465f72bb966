//! Changes command implementation.

use davsync_protocol::ChangeReport;
use davsync_server::{ServerConfig, SyncServer};
use serde_json::{json, Value};

/// Renders a change report as JSON.
pub fn to_json(report: &ChangeReport) -> Result<Value, serde_json::Error> {
    Ok(match report {
        ChangeReport::Changes(set) => serde_json::to_value(set)?,
        ChangeReport::ResyncRequired { reason } => json!({ "resyncRequired": reason }),
    })
}

/// Runs the changes command.
pub fn run(
    config: ServerConfig,
    collection: &str,
    token: Option<&str>,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = SyncServer::open(config)?;
    let report = server.report_changes(collection, token, limit)?;
    println!("{}", serde_json::to_string_pretty(&to_json(&report)?)?);
    Ok(())
}
