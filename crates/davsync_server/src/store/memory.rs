//! In-memory store.

use super::{
    now_millis, ChangeLog, CollectionInfo, CollectionStore, Membership, StoreError, StoreResult,
    StreamInfo, StreamKind, StreamRef,
};
use crate::ctag::content_hash;
use davsync_protocol::{ChangeKind, ChangeRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// One versioned stream.
#[derive(Debug, Default)]
struct Stream {
    sync_token: u64,
    ctag: Option<String>,
    /// Object name -> version of its last write.
    objects: BTreeMap<String, u64>,
    log: Vec<ChangeRecord>,
    pruned_through: u64,
}

impl Stream {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            ctag: self.ctag.clone(),
            sync_token: self.sync_token,
        }
    }

    fn put(&mut self, name: &str, timestamp: u64) -> u64 {
        self.sync_token += 1;
        let kind = match self.objects.insert(name.to_string(), self.sync_token) {
            Some(_) => ChangeKind::Modified,
            None => ChangeKind::Added,
        };
        self.record(name, kind, timestamp)
    }

    fn delete(&mut self, stream: StreamRef<'_>, name: &str, timestamp: u64) -> StoreResult<u64> {
        if self.objects.remove(name).is_none() {
            return Err(StoreError::UnknownObject {
                stream: stream.to_string(),
                name: name.to_string(),
            });
        }
        self.sync_token += 1;
        Ok(self.record(name, ChangeKind::Deleted, timestamp))
    }

    fn record(&mut self, name: &str, kind: ChangeKind, timestamp: u64) -> u64 {
        self.log
            .push(ChangeRecord::new(name, kind, self.sync_token, timestamp));

        let mut content = String::new();
        for (object, version) in &self.objects {
            content.push_str(object);
            content.push(':');
            content.push_str(&version.to_string());
            content.push('\n');
        }
        self.ctag = Some(content_hash(content.as_bytes()));
        self.sync_token
    }

    fn changes_since(&self, since: u64, not_before: u64, limit: Option<usize>) -> ChangeLog {
        let pending = self.log.iter().filter(|r| r.version > since);
        let horizon_exceeded = pending.clone().any(|r| r.timestamp < not_before);

        let mut eligible = pending.filter(|r| r.timestamp >= not_before);
        let limit = limit.unwrap_or(usize::MAX);
        let records: Vec<ChangeRecord> = eligible.by_ref().take(limit).cloned().collect();
        let has_more = eligible.next().is_some();

        ChangeLog {
            records,
            current_version: self.sync_token,
            pruned_through: self.pruned_through,
            horizon_exceeded,
            has_more,
        }
    }

    fn prune_through(&mut self, version: u64) {
        let version = version.min(self.sync_token);
        self.log.retain(|r| r.version > version);
        self.pruned_through = self.pruned_through.max(version);
    }
}

#[derive(Debug)]
struct Calendar {
    owner: String,
    stream: Stream,
}

#[derive(Debug, Default)]
struct State {
    calendars: HashMap<String, Calendar>,
    task_lists: HashMap<String, Stream>,
}

impl State {
    fn stream(&self, stream: StreamRef<'_>) -> Option<&Stream> {
        match stream.kind {
            StreamKind::Calendar => self.calendars.get(stream.key).map(|c| &c.stream),
            StreamKind::Tasks => self.task_lists.get(stream.key),
        }
    }

    fn stream_mut(&mut self, stream: StreamRef<'_>) -> StoreResult<&mut Stream> {
        let found = match stream.kind {
            StreamKind::Calendar => self.calendars.get_mut(stream.key).map(|c| &mut c.stream),
            StreamKind::Tasks => self.task_lists.get_mut(stream.key),
        };
        found.ok_or_else(|| StoreError::UnknownCollection(stream.to_string()))
    }
}

/// A thread-safe in-memory store.
///
/// Every object write bumps the stream's sync token, appends a change record
/// and recomputes the stream's ctag, the way the production store's CRUD
/// layer does. Used by tests, the CLI and snapshot-backed deployments.
///
/// # Example
///
/// ```rust
/// use davsync_server::{CollectionStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.create_collection("alice", "alice").unwrap();
/// store.put_event("alice", "standup.ics").unwrap();
///
/// let info = store.collection("alice").unwrap().unwrap();
/// assert_eq!(info.stream.sync_token, 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    offline: AtomicBool,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection. Existing collections are left untouched.
    pub fn create_collection(&self, id: &str, owner: &str) -> StoreResult<()> {
        self.check_online()?;
        self.state
            .write()
            .calendars
            .entry(id.to_string())
            .or_insert_with(|| Calendar {
                owner: owner.to_string(),
                stream: Stream::default(),
            });
        Ok(())
    }

    /// Creates the task stream of `owner`'s primary collection.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCollection` if `owner` has no primary collection.
    pub fn create_task_list(&self, owner: &str) -> StoreResult<()> {
        self.check_online()?;
        let mut state = self.state.write();
        let primary = state
            .calendars
            .get(owner)
            .is_some_and(|calendar| calendar.owner == owner);
        if !primary {
            return Err(StoreError::UnknownCollection(owner.to_string()));
        }
        state.task_lists.entry(owner.to_string()).or_default();
        Ok(())
    }

    /// Creates or updates an object. Returns the new stream version.
    pub fn put_object(&self, stream: StreamRef<'_>, name: &str) -> StoreResult<u64> {
        self.put_object_at(stream, name, now_millis())
    }

    /// Creates or updates an object with an explicit timestamp.
    pub fn put_object_at(
        &self,
        stream: StreamRef<'_>,
        name: &str,
        timestamp: u64,
    ) -> StoreResult<u64> {
        self.check_online()?;
        let mut state = self.state.write();
        Ok(state.stream_mut(stream)?.put(name, timestamp))
    }

    /// Deletes an object. Returns the new stream version.
    pub fn delete_object(&self, stream: StreamRef<'_>, name: &str) -> StoreResult<u64> {
        self.delete_object_at(stream, name, now_millis())
    }

    /// Deletes an object with an explicit timestamp.
    pub fn delete_object_at(
        &self,
        stream: StreamRef<'_>,
        name: &str,
        timestamp: u64,
    ) -> StoreResult<u64> {
        self.check_online()?;
        let mut state = self.state.write();
        state.stream_mut(stream)?.delete(stream, name, timestamp)
    }

    /// Creates or updates a calendar object.
    pub fn put_event(&self, collection_id: &str, name: &str) -> StoreResult<u64> {
        self.put_object(StreamRef::calendar(collection_id), name)
    }

    /// Deletes a calendar object.
    pub fn delete_event(&self, collection_id: &str, name: &str) -> StoreResult<u64> {
        self.delete_object(StreamRef::calendar(collection_id), name)
    }

    /// Creates or updates a task.
    pub fn put_task(&self, owner: &str, name: &str) -> StoreResult<u64> {
        self.put_object(StreamRef::tasks(owner), name)
    }

    /// Deletes a task.
    pub fn delete_task(&self, owner: &str, name: &str) -> StoreResult<u64> {
        self.delete_object(StreamRef::tasks(owner), name)
    }

    /// Drops change records up to and including `version`.
    ///
    /// Clients holding an older token must then resynchronize.
    pub fn prune_log(&self, stream: StreamRef<'_>, version: u64) -> StoreResult<()> {
        self.check_online()?;
        let mut state = self.state.write();
        state.stream_mut(stream)?.prune_through(version);
        Ok(())
    }

    /// Simulates a backend outage: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }
}

impl CollectionStore for InMemoryStore {
    fn collection(&self, id: &str) -> StoreResult<Option<CollectionInfo>> {
        self.check_online()?;
        Ok(self
            .state
            .read()
            .calendars
            .get(id)
            .map(|calendar| CollectionInfo {
                id: id.to_string(),
                owner: calendar.owner.clone(),
                stream: calendar.stream.info(),
            }))
    }

    fn task_list(&self, owner: &str) -> StoreResult<Option<StreamInfo>> {
        self.check_online()?;
        Ok(self.state.read().task_lists.get(owner).map(Stream::info))
    }

    fn changes_since(
        &self,
        stream: StreamRef<'_>,
        since: u64,
        not_before: u64,
        limit: Option<usize>,
    ) -> StoreResult<ChangeLog> {
        self.check_online()?;
        let state = self.state.read();
        let data = state
            .stream(stream)
            .ok_or_else(|| StoreError::UnknownCollection(stream.to_string()))?;
        Ok(data.changes_since(since, not_before, limit))
    }

    fn membership(&self, stream: StreamRef<'_>) -> StoreResult<Membership> {
        self.check_online()?;
        let state = self.state.read();
        let data = state
            .stream(stream)
            .ok_or_else(|| StoreError::UnknownCollection(stream.to_string()))?;
        Ok(Membership {
            names: data.objects.keys().cloned().collect(),
            sync_token: data.sync_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_alice() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store
    }

    #[test]
    fn new_collection_has_no_ctag() {
        let store = store_with_alice();
        let info = store.collection("alice").unwrap().unwrap();
        assert!(info.is_primary());
        assert_eq!(info.stream.sync_token, 0);
        assert!(info.stream.ctag.is_none());
    }

    #[test]
    fn writes_bump_token_and_ctag() {
        let store = store_with_alice();

        assert_eq!(store.put_event("alice", "a.ics").unwrap(), 1);
        let first = store.collection("alice").unwrap().unwrap().stream;

        assert_eq!(store.put_event("alice", "a.ics").unwrap(), 2);
        let second = store.collection("alice").unwrap().unwrap().stream;

        assert_eq!(second.sync_token, 2);
        assert_ne!(first.ctag, second.ctag);
    }

    #[test]
    fn log_records_kinds() {
        let store = store_with_alice();
        store.put_event("alice", "a.ics").unwrap();
        store.put_event("alice", "a.ics").unwrap();
        store.delete_event("alice", "a.ics").unwrap();

        let log = store
            .changes_since(StreamRef::calendar("alice"), 0, 0, None)
            .unwrap();
        let kinds: Vec<_> = log.records.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Added, ChangeKind::Modified, ChangeKind::Deleted]
        );
        assert_eq!(log.current_version, 3);
        assert!(!log.has_more);
    }

    #[test]
    fn delete_unknown_object_fails() {
        let store = store_with_alice();
        assert!(matches!(
            store.delete_event("alice", "missing.ics"),
            Err(StoreError::UnknownObject { .. })
        ));
    }

    #[test]
    fn changes_respect_limit() {
        let store = store_with_alice();
        for i in 0..5 {
            store.put_event("alice", &format!("{i}.ics")).unwrap();
        }

        let log = store
            .changes_since(StreamRef::calendar("alice"), 1, 0, Some(2))
            .unwrap();
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].version, 2);
        assert!(log.has_more);
    }

    #[test]
    fn changes_respect_horizon() {
        let store = store_with_alice();
        store
            .put_object_at(StreamRef::calendar("alice"), "old.ics", 1_000)
            .unwrap();
        store
            .put_object_at(StreamRef::calendar("alice"), "new.ics", 5_000)
            .unwrap();

        let log = store
            .changes_since(StreamRef::calendar("alice"), 0, 2_000, None)
            .unwrap();
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].name, "new.ics");
        assert!(log.horizon_exceeded);

        let recent = store
            .changes_since(StreamRef::calendar("alice"), 1, 2_000, None)
            .unwrap();
        assert!(!recent.horizon_exceeded);
    }

    #[test]
    fn task_list_requires_primary_collection() {
        let store = store_with_alice();
        store.create_collection("team", "alice").unwrap();

        assert!(store.create_task_list("bob").is_err());
        store.create_task_list("alice").unwrap();
        assert_eq!(store.put_task("alice", "t.ics").unwrap(), 1);
        assert_eq!(store.task_list("alice").unwrap().unwrap().sync_token, 1);
    }

    #[test]
    fn prune_moves_watermark() {
        let store = store_with_alice();
        for i in 0..4 {
            store.put_event("alice", &format!("{i}.ics")).unwrap();
        }
        store.prune_log(StreamRef::calendar("alice"), 2).unwrap();

        let log = store
            .changes_since(StreamRef::calendar("alice"), 0, 0, None)
            .unwrap();
        assert_eq!(log.pruned_through, 2);
        assert_eq!(log.records.len(), 2);
    }

    #[test]
    fn offline_store_fails_reads() {
        let store = store_with_alice();
        store.set_offline(true);
        assert!(matches!(
            store.collection("alice"),
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.collection("alice").unwrap().is_some());
    }

    #[test]
    fn membership_lists_live_objects() {
        let store = store_with_alice();
        store.put_event("alice", "b.ics").unwrap();
        store.put_event("alice", "a.ics").unwrap();
        store.put_event("alice", "c.ics").unwrap();
        store.delete_event("alice", "c.ics").unwrap();

        let members = store.membership(StreamRef::calendar("alice")).unwrap();
        assert_eq!(members.names, vec!["a.ics", "b.ics"]);
        assert_eq!(members.sync_token, 4);
    }
}
