//! Store capability consumed by the change-tracking layer.
//!
//! The store owns collections, their sync tokens, ctags and change logs. The
//! change-tracking layer only reads them. A store implementation is chosen
//! once at startup (see [`open_store`]) and injected as an
//! `Arc<dyn CollectionStore>`.
//!
//! ## Streams
//!
//! Every collection has a calendar stream keyed by the collection id. A
//! primary collection (`id == owner`) may also have a task stream keyed by
//! the owner. Each stream versions independently.

mod memory;
mod snapshot;

pub use memory::InMemoryStore;
pub use snapshot::{Snapshot, SnapshotCollection, SnapshotWrite, WriteOp};

use crate::config::StoreBackendConfig;
use davsync_protocol::ChangeRecord;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store cannot be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A write referenced a collection that does not exist.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A delete referenced an object that does not exist.
    #[error("unknown object {name} in {stream}")]
    UnknownObject {
        /// Stream the object was looked up in.
        stream: String,
        /// Object name.
        name: String,
    },

    /// Snapshot could not be parsed.
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which versioned stream of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Calendar events (or contacts), keyed by collection id.
    Calendar,
    /// Task list, keyed by owner.
    Tasks,
}

/// Reference to one versioned stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamRef<'a> {
    /// Collection id (calendar) or owner (tasks).
    pub key: &'a str,
    /// Stream kind.
    pub kind: StreamKind,
}

impl<'a> StreamRef<'a> {
    /// The calendar stream of a collection.
    pub fn calendar(collection_id: &'a str) -> Self {
        Self {
            key: collection_id,
            kind: StreamKind::Calendar,
        }
    }

    /// The task stream of an owner's primary collection.
    pub fn tasks(owner: &'a str) -> Self {
        Self {
            key: owner,
            kind: StreamKind::Tasks,
        }
    }
}

impl fmt::Display for StreamRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StreamKind::Calendar => write!(f, "calendar {}", self.key),
            StreamKind::Tasks => write!(f, "tasks {}", self.key),
        }
    }
}

/// Version state of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Stored ctag; `None` until the first write.
    pub ctag: Option<String>,
    /// Current sync token.
    pub sync_token: u64,
}

/// A collection as seen by the change-tracking layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Collection id.
    pub id: String,
    /// Owner uid.
    pub owner: String,
    /// Calendar stream state.
    pub stream: StreamInfo,
}

impl CollectionInfo {
    /// Returns true if this is its owner's primary collection.
    pub fn is_primary(&self) -> bool {
        self.id == self.owner
    }
}

/// Change-log slice returned by [`CollectionStore::changes_since`].
///
/// All fields come from one consistent read of the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    /// Records with `version > since`, oldest first, at most `limit`.
    pub records: Vec<ChangeRecord>,
    /// Stream sync token at the time of the read.
    pub current_version: u64,
    /// Highest version whose record has been pruned; tokens below it cannot
    /// be resolved.
    pub pruned_through: u64,
    /// Records after `since` were skipped because they predate the horizon.
    pub horizon_exceeded: bool,
    /// More records remain after the returned ones.
    pub has_more: bool,
}

/// Current membership of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    /// Object names.
    pub names: Vec<String>,
    /// Stream sync token at the time of the read.
    pub sync_token: u64,
}

/// Read capability over collections, tokens and change logs.
///
/// # Invariants
///
/// - `sync_token` never decreases for a stream
/// - a stream's ctag changes iff its membership or content changes
/// - `changes_since` and `membership` read token and data consistently
pub trait CollectionStore: Send + Sync {
    /// Looks up a collection.
    fn collection(&self, id: &str) -> StoreResult<Option<CollectionInfo>>;

    /// Looks up the task stream owned by `owner`.
    fn task_list(&self, owner: &str) -> StoreResult<Option<StreamInfo>>;

    /// Returns change records with `version > since` and `timestamp >=
    /// not_before`, at most `limit` of them.
    fn changes_since(
        &self,
        stream: StreamRef<'_>,
        since: u64,
        not_before: u64,
        limit: Option<usize>,
    ) -> StoreResult<ChangeLog>;

    /// Returns the current members of a stream.
    fn membership(&self, stream: StreamRef<'_>) -> StoreResult<Membership>;
}

impl<S: CollectionStore + ?Sized> CollectionStore for Arc<S> {
    fn collection(&self, id: &str) -> StoreResult<Option<CollectionInfo>> {
        (**self).collection(id)
    }

    fn task_list(&self, owner: &str) -> StoreResult<Option<StreamInfo>> {
        (**self).task_list(owner)
    }

    fn changes_since(
        &self,
        stream: StreamRef<'_>,
        since: u64,
        not_before: u64,
        limit: Option<usize>,
    ) -> StoreResult<ChangeLog> {
        (**self).changes_since(stream, since, not_before, limit)
    }

    fn membership(&self, stream: StreamRef<'_>) -> StoreResult<Membership> {
        (**self).membership(stream)
    }
}

/// Opens short-lived store handles for the poll path.
///
/// A handle lives for one request and is dropped (closed) on every exit path.
pub trait StoreConnector: Send + Sync {
    /// Handle type.
    type Handle: CollectionStore;

    /// Opens a handle.
    fn connect(&self) -> StoreResult<Self::Handle>;
}

impl<S: CollectionStore + ?Sized> StoreConnector for Arc<S> {
    type Handle = Arc<S>;

    fn connect(&self) -> StoreResult<Self::Handle> {
        Ok(Arc::clone(self))
    }
}

/// Opens the store backend named by the configuration.
pub fn open_store(config: &StoreBackendConfig) -> StoreResult<Arc<dyn CollectionStore>> {
    let store = match config {
        StoreBackendConfig::Memory => InMemoryStore::new(),
        StoreBackendConfig::Snapshot { path } => InMemoryStore::load_snapshot(path)?,
    };
    Ok(Arc::new(store))
}

/// Current time in Unix millis.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
