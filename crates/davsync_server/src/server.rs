//! Main sync server.

use crate::admission::AdmissionGate;
use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::ctag::CtagService;
use crate::error::{ServerError, ServerResult};
use crate::fastpath::FastPathCtagHandler;
use crate::refresh::PeriodicRefreshPolicy;
use crate::resolver::ChangeSetResolver;
use crate::store::{open_store, CollectionStore};
use davsync_protocol::{is_ctag_only_propfind, ChangeReport, ChangeSet, CtagResponse};
use std::sync::Arc;
use tracing::info;

/// The change-tracking server.
///
/// Owns the admission gate, the poll handler and the refresh-wrapped change
/// resolver, all sharing one injected store.
///
/// # Example
///
/// ```
/// use davsync_server::{InMemoryStore, ServerConfig, SyncServer};
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryStore::new());
/// store.create_collection("alice", "alice").unwrap();
/// store.put_event("alice", "standup.ics").unwrap();
///
/// let server = SyncServer::new(ServerConfig::default(), store).unwrap();
///
/// let poll = server.poll("/caldav.php/alice/alice/", "/caldav.php/alice/alice/");
/// assert!(poll.is_success());
///
/// let changes = server.change_set("alice", None, None).unwrap();
/// assert_eq!(changes.added, vec!["standup.ics"]);
/// ```
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<dyn CollectionStore>,
    fast_path: FastPathCtagHandler<Arc<dyn CollectionStore>>,
    refresh: PeriodicRefreshPolicy,
    ctag: CtagService,
}

impl SyncServer {
    /// Creates a server over an injected store.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is rejected, or an I/O
    /// error if the lock-file directory cannot be created.
    pub fn new(config: ServerConfig, store: Arc<dyn CollectionStore>) -> ServerResult<Self> {
        config.validate()?;

        let gate = Arc::new(AdmissionGate::new(&config.admission)?);
        let fast_path = FastPathCtagHandler::new(gate, Arc::clone(&store));
        let resolver = ChangeSetResolver::new(config.lookback_horizon);
        let refresh = PeriodicRefreshPolicy::new(resolver, &config.refresh);

        info!(
            pool_size = config.admission.pool_size,
            horizon_ms = u64::try_from(config.lookback_horizon.as_millis()).unwrap_or(u64::MAX),
            "sync server ready"
        );

        Ok(Self {
            config,
            store,
            fast_path,
            refresh,
            ctag: CtagService::new(),
        })
    }

    /// Creates a server over the store backend named by the configuration.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let store = open_store(&config.store)?;
        Self::new(config, store)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<dyn CollectionStore> {
        &self.store
    }

    /// Returns the admission gate.
    pub fn gate(&self) -> &AdmissionGate {
        self.fast_path.gate()
    }

    /// Answers a request on the poll path if it is a ctag-only `PROPFIND`.
    ///
    /// Returns `None` for anything else; the caller routes those through
    /// full protocol dispatch.
    pub fn handle_poll(
        &self,
        method: &str,
        request_uri: &str,
        path: &str,
        body: &str,
    ) -> Option<CtagResponse> {
        is_ctag_only_propfind(method, body).then(|| self.poll(request_uri, path))
    }

    /// Serves a ctag poll unconditionally.
    pub fn poll(&self, request_uri: &str, path: &str) -> CtagResponse {
        self.fast_path.handle(request_uri, path)
    }

    /// Reports changes since `client_token`.
    ///
    /// `limit` falls back to the configured default limit.
    pub fn report_changes(
        &self,
        collection_id: &str,
        client_token: Option<&str>,
        limit: Option<usize>,
    ) -> ServerResult<ChangeReport> {
        let limit = limit.or(self.config.default_limit);
        let mut ctx = RequestContext::new(self.store.as_ref());
        self.refresh
            .changes(&mut ctx, collection_id, client_token, limit)
    }

    /// Like [`report_changes`](Self::report_changes), with a resync surfaced
    /// as [`ServerError::ResyncRequired`].
    pub fn change_set(
        &self,
        collection_id: &str,
        client_token: Option<&str>,
        limit: Option<usize>,
    ) -> ServerResult<ChangeSet> {
        match self.report_changes(collection_id, client_token, limit)? {
            ChangeReport::Changes(set) => Ok(set),
            ChangeReport::ResyncRequired { reason } => Err(ServerError::ResyncRequired(reason)),
        }
    }

    /// Returns the ctag clients see for a collection.
    pub fn composite_ctag(&self, collection_id: &str) -> ServerResult<String> {
        let mut ctx = RequestContext::new(self.store.as_ref());
        let owner = ctx.require_collection(collection_id)?.owner;
        self.ctag.composite_ctag(&mut ctx, collection_id, &owner)
    }

    /// Returns a collection's current composite sync token.
    pub fn sync_token(&self, collection_id: &str) -> ServerResult<String> {
        let mut ctx = RequestContext::new(self.store.as_ref());
        self.refresh.resolver().current_token(&mut ctx, collection_id)
    }
}
