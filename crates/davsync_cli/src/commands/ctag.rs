//! Ctag poll command implementation.

use davsync_server::{ServerConfig, SyncServer};
use std::path::Path;

/// Builds the raw HTTP response text for one poll.
///
/// Returns `None` when `body` is not a ctag-only `PROPFIND`.
pub fn render(server: &SyncServer, uri: &str, path: &str, body: Option<&str>) -> Option<String> {
    let response = match body {
        Some(body) => server.handle_poll("PROPFIND", uri, path, body)?,
        None => server.poll(uri, path),
    };

    let body = response.body();
    let mut out = response.status_line();
    out.push('\n');
    for (name, value) in response.headers(&body) {
        out.push_str(&format!("{name}: {value}\n"));
    }
    out.push('\n');
    out.push_str(&body);
    Some(out)
}

/// Runs the ctag command.
pub fn run(
    config: ServerConfig,
    uri: &str,
    path: &str,
    body: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = SyncServer::open(config)?;
    let body = body.map(std::fs::read_to_string).transpose()?;

    match render(&server, uri, path, body.as_deref()) {
        Some(out) => println!("{out}"),
        None => return Err("body is not a ctag-only PROPFIND; use full dispatch".into()),
    }
    Ok(())
}
