//! Per-request context.
//!
//! A context is built once per inbound request and threaded through the ctag
//! service and the change resolver. Collection and task-list lookups made
//! while serving the request are cached here and die with it; nothing is
//! cached process-wide.

use crate::error::{ServerError, ServerResult};
use crate::store::{now_millis, CollectionInfo, CollectionStore, StreamInfo};
use std::collections::HashMap;

/// State scoped to one request.
pub struct RequestContext<'s> {
    store: &'s dyn CollectionStore,
    now: u64,
    collections: HashMap<String, Option<CollectionInfo>>,
    task_lists: HashMap<String, Option<StreamInfo>>,
}

impl<'s> RequestContext<'s> {
    /// Creates a context stamped with the current time.
    pub fn new(store: &'s dyn CollectionStore) -> Self {
        Self::at(store, now_millis())
    }

    /// Creates a context with an explicit request time (Unix millis).
    pub fn at(store: &'s dyn CollectionStore, now: u64) -> Self {
        Self {
            store,
            now,
            collections: HashMap::new(),
            task_lists: HashMap::new(),
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &'s dyn CollectionStore {
        self.store
    }

    /// Returns the request time (Unix millis).
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Looks up a collection, caching the answer for this request.
    pub fn collection(&mut self, id: &str) -> ServerResult<Option<CollectionInfo>> {
        if let Some(cached) = self.collections.get(id) {
            return Ok(cached.clone());
        }
        let found = self.store.collection(id)?;
        self.collections.insert(id.to_string(), found.clone());
        Ok(found)
    }

    /// Looks up a collection that must exist.
    pub fn require_collection(&mut self, id: &str) -> ServerResult<CollectionInfo> {
        self.collection(id)?
            .ok_or_else(|| ServerError::CollectionNotFound(id.to_string()))
    }

    /// Looks up an owner's task stream, caching the answer for this request.
    pub fn task_list(&mut self, owner: &str) -> ServerResult<Option<StreamInfo>> {
        if let Some(cached) = self.task_lists.get(owner) {
            return Ok(cached.clone());
        }
        let found = self.store.task_list(owner)?;
        self.task_lists.insert(owner.to_string(), found.clone());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn lookups_are_cached_per_request() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();

        let mut ctx = RequestContext::new(&store);
        let before = ctx.require_collection("alice").unwrap();

        store.put_event("alice", "a.ics").unwrap();
        // Same request sees the cached value
        assert_eq!(ctx.require_collection("alice").unwrap(), before);

        // A new request sees the write
        let mut next = RequestContext::new(&store);
        assert_eq!(next.require_collection("alice").unwrap().stream.sync_token, 1);
    }

    #[test]
    fn missing_collection() {
        let store = InMemoryStore::new();
        let mut ctx = RequestContext::new(&store);
        assert!(ctx.collection("nobody").unwrap().is_none());
        assert!(matches!(
            ctx.require_collection("nobody"),
            Err(ServerError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn store_failure_propagates() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let mut ctx = RequestContext::new(&store);
        assert!(matches!(
            ctx.collection("alice"),
            Err(ServerError::StoreUnavailable(_))
        ));
    }
}
