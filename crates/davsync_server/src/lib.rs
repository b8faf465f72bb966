//! # davsync Server
//!
//! Change tracking and fast polling for CalDAV/CardDAV collections.
//!
//! This crate provides:
//! - A bounded admission gate protecting the store from polling storms
//! - Composite ctags over a collection's calendar and task streams
//! - An incremental change resolver with lossless resync semantics
//! - Periodic widening of change limits for deep reconciliation
//! - The unauthenticated ctag poll path
//!
//! # Architecture
//!
//! The server never writes collection state. It reads sync tokens, ctags and
//! change logs through the [`CollectionStore`] trait, chosen once at startup
//! and injected. Lookups made while serving one request are cached in a
//! [`RequestContext`] that lives exactly as long as the request.
//!
//! ```text
//! poll ──► FastPathCtagHandler ──► AdmissionGate ──► CtagService ──┐
//!                                                                  ├──► CollectionStore
//! REPORT ─► PeriodicRefreshPolicy ──► ChangeSetResolver ───────────┘
//! ```
//!
//! # Sync tokens
//!
//! Tokens are `"{calendar}/{tasks}"` for primary collections with a task
//! stream and `"{calendar}"` otherwise. An empty token means initial sync.
//! A token the change log can no longer answer yields
//! [`ChangeReport::ResyncRequired`](davsync_protocol::ChangeReport), never a
//! partial diff.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code must not panic; errors propagate as ServerError
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod admission;
mod config;
mod context;
mod ctag;
mod error;
mod fastpath;
mod refresh;
mod resolver;
mod server;
mod store;

pub use admission::{AdmissionGate, SlotGuard};
pub use config::{
    AdmissionConfig, RefreshConfig, RefreshScope, ServerConfig, SlotBackendConfig,
    StoreBackendConfig,
};
pub use context::RequestContext;
pub use ctag::{content_hash, CtagService};
pub use error::{ServerError, ServerResult};
pub use fastpath::{parse_collection_path, FastPathCtagHandler};
pub use refresh::PeriodicRefreshPolicy;
pub use resolver::ChangeSetResolver;
pub use server::SyncServer;
pub use store::{
    open_store, ChangeLog, CollectionInfo, CollectionStore, InMemoryStore, Membership, Snapshot,
    SnapshotCollection, SnapshotWrite, StoreConnector, StoreError, StoreResult, StreamInfo,
    StreamKind, StreamRef, WriteOp,
};
