//! Unauthenticated ctag poll path.
//!
//! Answers "has this collection changed?" without protocol dispatch: parse
//! the path, take an admission slot, open a short-lived store handle, read
//! the composite ctag and emit the fixed multistatus body. Every failure is
//! collapsed into the 404 `ERROR_CTAG` response; the reason only goes to the
//! log.

use crate::admission::AdmissionGate;
use crate::context::RequestContext;
use crate::ctag::CtagService;
use crate::error::{ServerError, ServerResult};
use crate::store::StoreConnector;
use davsync_protocol::CtagResponse;
use std::sync::Arc;
use tracing::{debug, warn};

/// Splits `/<script>/<user>/<collection>` into `(user, collection)`.
///
/// The collection id must match `[0-9a-z.-]+` and must not be a dot-only
/// segment such as `.` or `..`.
pub fn parse_collection_path(path: &str) -> ServerResult<(&str, &str)> {
    let mut parts = path.trim_matches('/').splitn(3, '/');
    let (Some(_script), Some(user), Some(collection)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ServerError::InvalidIdentifier(format!(
            "expected /<script>/<user>/<collection>, got {path:?}"
        )));
    };

    if user.is_empty() {
        return Err(ServerError::InvalidIdentifier(format!(
            "empty user in {path:?}"
        )));
    }
    let allowed = |c: char| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '-' || c == '.';
    if collection.is_empty() || !collection.chars().all(allowed) {
        return Err(ServerError::InvalidIdentifier(format!(
            "invalid collection id {collection:?}"
        )));
    }
    if collection.chars().all(|c| c == '.') {
        return Err(ServerError::InvalidIdentifier(format!(
            "relative collection id {collection:?}"
        )));
    }
    Ok((user, collection))
}

/// Poll handler, generic over how store handles are opened.
pub struct FastPathCtagHandler<C: StoreConnector> {
    gate: Arc<AdmissionGate>,
    connector: C,
    ctag: CtagService,
}

impl<C: StoreConnector> FastPathCtagHandler<C> {
    /// Creates a handler sharing `gate` with the rest of the process.
    pub fn new(gate: Arc<AdmissionGate>, connector: C) -> Self {
        Self {
            gate,
            connector,
            ctag: CtagService::new(),
        }
    }

    /// Returns the admission gate.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Handles one poll. Never fails: errors become the 404 body.
    pub fn handle(&self, request_uri: &str, path: &str) -> CtagResponse {
        match self.composite_ctag(path) {
            Ok(ctag) => {
                debug!(path, %ctag, "ctag served");
                CtagResponse::success(request_uri, ctag)
            }
            Err(e) => {
                warn!(path, error = %e, "ctag poll failed");
                CtagResponse::error(request_uri)
            }
        }
    }

    fn composite_ctag(&self, path: &str) -> ServerResult<String> {
        let (user, collection) = parse_collection_path(path)?;

        let _slot = self.gate.acquire(collection)?;
        // Handle and slot both drop on every return below
        let handle = self.connector.connect()?;
        let mut ctx = RequestContext::new(&handle);
        self.ctag.composite_ctag(&mut ctx, collection, user)
    }
}
