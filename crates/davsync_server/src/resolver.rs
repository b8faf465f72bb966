//! Incremental change resolution.
//!
//! Given a client sync token, the resolver reports which objects were added,
//! modified or deleted since that token, merging the calendar stream with the
//! task stream of primary collections.
//!
//! ## Rules
//!
//! - An empty token is an initial sync: every current member is `added`
//! - A sub-token equal to the stream's current token short-circuits to an
//!   empty diff without scanning the change log
//! - Records are folded per object into their net effect, so an object
//!   created and deleted since the token is not reported at all
//! - A sub-token that the change log can no longer answer (pruned, beyond
//!   the look-back horizon, ahead of the server, malformed) yields
//!   [`ChangeReport::ResyncRequired`], never a partial diff
//! - Store failures propagate as errors, never as an empty diff

use crate::context::RequestContext;
use crate::error::ServerResult;
use crate::store::StreamRef;
use davsync_protocol::{ChangeKind, ChangeRecord, ChangeReport, ChangeSet, SyncToken};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Whether an object existed at the client token and whether it exists now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Presence {
    before: bool,
    now: bool,
}

impl Presence {
    const ABSENT: Self = Self::unchanged(false);

    const fn unchanged(exists: bool) -> Self {
        Self {
            before: exists,
            now: exists,
        }
    }

    /// True when the object was created or removed.
    fn flipped(self) -> bool {
        self.before != self.now
    }

    /// Presence of a name backed by two streams: it exists while either
    /// stream holds it.
    fn union(self, other: Self) -> Self {
        Self {
            before: self.before || other.before,
            now: self.now || other.now,
        }
    }
}

/// Net effects of one stream, in order of first appearance.
#[derive(Debug, Default)]
struct StreamDiff {
    effects: Vec<(String, Presence)>,
}

impl StreamDiff {
    /// Every current member reported as created.
    fn initial(names: Vec<String>) -> Self {
        let created = Presence {
            before: false,
            now: true,
        };
        Self {
            effects: names.into_iter().map(|name| (name, created)).collect(),
        }
    }

    fn into_change_set(self, sync_token: String, truncated: bool) -> ChangeSet {
        let mut set = ChangeSet {
            sync_token,
            truncated,
            ..ChangeSet::default()
        };
        for (name, presence) in self.effects {
            match (presence.before, presence.now) {
                (false, false) => {}
                (false, true) => set.added.push(name),
                (true, false) => set.deleted.push(name),
                (true, true) => set.modified.push(name),
            }
        }
        set
    }
}

/// Outcome of resolving one stream.
enum StreamOutcome {
    Resolved {
        diff: StreamDiff,
        token: u64,
        truncated: bool,
    },
    Unresolvable(String),
}

/// Folds change records into per-object net effects.
///
/// Objects created and removed within the records are dropped.
fn fold_records(records: &[ChangeRecord]) -> StreamDiff {
    // name -> (first kind, last kind), in order of first appearance
    let mut order: Vec<&str> = Vec::new();
    let mut effects: HashMap<&str, (ChangeKind, ChangeKind)> = HashMap::new();

    for record in records {
        effects
            .entry(record.name.as_str())
            .and_modify(|(_, last)| *last = record.kind)
            .or_insert_with(|| {
                order.push(record.name.as_str());
                (record.kind, record.kind)
            });
    }

    let mut diff = StreamDiff::default();
    for name in order {
        let Some(&(first, last)) = effects.get(name) else {
            continue;
        };
        let presence = Presence {
            before: first != ChangeKind::Added,
            now: last != ChangeKind::Deleted,
        };
        if presence != Presence::ABSENT {
            diff.effects.push((name.to_string(), presence));
        }
    }
    diff
}

/// Returns the members of `stream`, reading them at most once per merge.
fn members<'m>(
    ctx: &RequestContext<'_>,
    stream: StreamRef<'_>,
    cache: &'m mut Option<HashSet<String>>,
) -> ServerResult<&'m HashSet<String>> {
    let names = match cache.take() {
        Some(names) => names,
        None => ctx.store().membership(stream)?.names.into_iter().collect(),
    };
    Ok(&*cache.insert(names))
}

/// Combines the calendar and task diffs of a primary collection.
///
/// Both streams share the collection's name space. A name changed in one
/// stream only is checked against the other stream's members when it was
/// created or removed, so deleting a task never hides a live event of the
/// same name.
fn merge_streams(
    ctx: &RequestContext<'_>,
    calendar: (StreamRef<'_>, StreamDiff),
    tasks: (StreamRef<'_>, StreamDiff),
) -> ServerResult<StreamDiff> {
    let (calendar_ref, calendar) = calendar;
    let (task_ref, tasks) = tasks;

    let calendar_index: HashMap<&str, Presence> = calendar
        .effects
        .iter()
        .map(|(name, presence)| (name.as_str(), *presence))
        .collect();
    let task_index: HashMap<&str, Presence> = tasks
        .effects
        .iter()
        .map(|(name, presence)| (name.as_str(), *presence))
        .collect();

    let mut calendar_members = None;
    let mut task_members = None;
    let mut merged = StreamDiff::default();

    for (name, presence) in &calendar.effects {
        let other = match task_index.get(name.as_str()) {
            Some(other) => *other,
            None if presence.flipped() => {
                Presence::unchanged(members(ctx, task_ref, &mut task_members)?.contains(name))
            }
            None => Presence::ABSENT,
        };
        merged.effects.push((name.clone(), presence.union(other)));
    }

    for (name, presence) in &tasks.effects {
        if calendar_index.contains_key(name.as_str()) {
            continue;
        }
        let other = if presence.flipped() {
            Presence::unchanged(members(ctx, calendar_ref, &mut calendar_members)?.contains(name))
        } else {
            Presence::ABSENT
        };
        merged.effects.push((name.clone(), presence.union(other)));
    }

    Ok(merged)
}

/// Computes change sets between a client token and current state.
#[derive(Debug, Clone)]
pub struct ChangeSetResolver {
    horizon: Duration,
}

impl ChangeSetResolver {
    /// Creates a resolver with the given look-back horizon.
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    /// Returns the look-back horizon.
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Returns the collection's current composite sync token.
    pub fn current_token(
        &self,
        ctx: &mut RequestContext<'_>,
        collection_id: &str,
    ) -> ServerResult<String> {
        let collection = ctx.require_collection(collection_id)?;
        let tasks = if collection.is_primary() {
            ctx.task_list(&collection.owner)?.map(|t| t.sync_token)
        } else {
            None
        };
        Ok(SyncToken::encode(collection.stream.sync_token, tasks))
    }

    /// Reports the changes to `collection_id` since `client_token`.
    ///
    /// `limit` caps the number of change records scanned per stream. It is a
    /// best-effort bound: when it cuts a scan short the returned token only
    /// advances to the last consumed record and `truncated` is set, so the
    /// client catches up on its next query. A zero limit still consumes one
    /// record per stream.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` for an unknown collection, `StoreUnavailable` on
    /// any store failure.
    pub fn changes(
        &self,
        ctx: &mut RequestContext<'_>,
        collection_id: &str,
        client_token: Option<&str>,
        limit: Option<usize>,
    ) -> ServerResult<ChangeReport> {
        let limit = limit.map(|limit| limit.max(1));
        let collection = ctx.require_collection(collection_id)?;
        let task_stream = if collection.is_primary() {
            ctx.task_list(&collection.owner)?
        } else {
            None
        };

        let token = match SyncToken::from_client(client_token) {
            Ok(token) => token,
            Err(e) => {
                info!(collection = collection_id, error = %e, "malformed sync token");
                return Ok(ChangeReport::resync(e.to_string()));
            }
        };

        let calendar_ref = StreamRef::calendar(&collection.id);
        let task_ref = StreamRef::tasks(&collection.owner);

        let (calendar_since, task_since) = match token {
            SyncToken::Initial => (None, None),
            SyncToken::At { calendar, tasks } => (Some(calendar), tasks),
        };

        let (calendar_diff, calendar_token, calendar_truncated) = match self.resolve_stream(
            ctx,
            calendar_ref,
            calendar_since,
            collection.stream.sync_token,
            limit,
        )? {
            StreamOutcome::Resolved {
                diff,
                token,
                truncated,
            } => (diff, token, truncated),
            StreamOutcome::Unresolvable(reason) => {
                info!(collection = collection_id, %reason, "calendar token unresolvable");
                return Ok(ChangeReport::resync(reason));
            }
        };

        let set = match &task_stream {
            // A token issued before the task stream existed carries no task
            // part; the task stream then starts from scratch.
            Some(stream) => {
                match self.resolve_stream(ctx, task_ref, task_since, stream.sync_token, limit)? {
                    StreamOutcome::Resolved {
                        diff,
                        token,
                        truncated,
                    } => merge_streams(ctx, (calendar_ref, calendar_diff), (task_ref, diff))?
                        .into_change_set(
                            SyncToken::encode(calendar_token, Some(token)),
                            calendar_truncated || truncated,
                        ),
                    StreamOutcome::Unresolvable(reason) => {
                        info!(collection = collection_id, %reason, "task token unresolvable");
                        return Ok(ChangeReport::resync(reason));
                    }
                }
            }
            None => calendar_diff.into_change_set(
                SyncToken::encode(calendar_token, None),
                calendar_truncated,
            ),
        };

        debug!(
            collection = collection_id,
            token = %set.sync_token,
            added = set.added.len(),
            modified = set.modified.len(),
            deleted = set.deleted.len(),
            truncated = set.truncated,
            "change set resolved"
        );
        Ok(ChangeReport::Changes(set))
    }

    fn resolve_stream(
        &self,
        ctx: &mut RequestContext<'_>,
        stream: StreamRef<'_>,
        since: Option<u64>,
        current: u64,
        limit: Option<usize>,
    ) -> ServerResult<StreamOutcome> {
        let Some(since) = since else {
            let members = ctx.store().membership(stream)?;
            return Ok(StreamOutcome::Resolved {
                diff: StreamDiff::initial(members.names),
                token: members.sync_token,
                truncated: false,
            });
        };

        if since == current {
            return Ok(StreamOutcome::Resolved {
                diff: StreamDiff::default(),
                token: current,
                truncated: false,
            });
        }

        let not_before = ctx
            .now()
            .saturating_sub(u64::try_from(self.horizon.as_millis()).unwrap_or(u64::MAX));
        let log = ctx.store().changes_since(stream, since, not_before, limit)?;

        if since > log.current_version {
            return Ok(StreamOutcome::Unresolvable(format!(
                "token {since} is ahead of {stream} at {}",
                log.current_version
            )));
        }
        if since < log.pruned_through {
            return Ok(StreamOutcome::Unresolvable(format!(
                "token {since} predates pruned history of {stream} (through {})",
                log.pruned_through
            )));
        }
        if log.horizon_exceeded {
            return Ok(StreamOutcome::Unresolvable(format!(
                "token {since} is older than the look-back horizon of {stream}"
            )));
        }

        // A cut-short scan resumes after the last consumed record, or at the
        // client's own token when nothing was consumed.
        let token = match (log.has_more, log.records.last()) {
            (false, _) => log.current_version,
            (true, Some(last)) => last.version,
            (true, None) => since,
        };
        Ok(StreamOutcome::Resolved {
            diff: fold_records(&log.records),
            token,
            truncated: log.has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::store::{
        ChangeLog, CollectionInfo, CollectionStore, InMemoryStore, Membership, StoreResult,
        StreamInfo,
    };

    const HORIZON: Duration = Duration::from_secs(60 * 60 * 24 * 548);

    fn changes(store: &InMemoryStore, id: &str, token: Option<&str>) -> ChangeReport {
        changes_limited(store, id, token, None)
    }

    fn changes_limited(
        store: &InMemoryStore,
        id: &str,
        token: Option<&str>,
        limit: Option<usize>,
    ) -> ChangeReport {
        let mut ctx = RequestContext::new(store);
        ChangeSetResolver::new(HORIZON)
            .changes(&mut ctx, id, token, limit)
            .unwrap()
    }

    fn record(name: &str, kind: ChangeKind, version: u64) -> ChangeRecord {
        ChangeRecord::new(name, kind, version, 0)
    }

    #[test]
    fn fold_net_effects() {
        use ChangeKind::*;
        let set = fold_records(&[
            record("created", Added, 1),
            record("created-then-gone", Added, 2),
            record("edited", Modified, 3),
            record("created", Modified, 4),
            record("created-then-gone", Deleted, 5),
            record("removed", Modified, 6),
            record("removed", Deleted, 7),
            record("replaced", Deleted, 8),
            record("replaced", Added, 9),
        ])
        .into_change_set(String::new(), false);

        assert_eq!(set.added, vec!["created"]);
        assert_eq!(set.modified, vec!["edited", "replaced"]);
        assert_eq!(set.deleted, vec!["removed"]);
    }

    #[test]
    fn equal_token_short_circuits() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        for i in 0..5 {
            store.put_event("alice", &format!("{i}.ics")).unwrap();
        }

        // Short circuit means no change-log read: an empty log would still work
        store
            .prune_log(StreamRef::calendar("alice"), 5)
            .unwrap();

        let set = changes(&store, "alice", Some("5")).changes().unwrap();
        assert_eq!(set.sync_token, "5");
        assert!(set.is_empty());
    }

    #[test]
    fn initial_sync_lists_members() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "a.ics").unwrap();
        store.put_event("alice", "b.ics").unwrap();

        let set = changes(&store, "alice", None).changes().unwrap();
        assert_eq!(set.added, vec!["a.ics", "b.ics"]);
        assert_eq!(set.sync_token, "2");

        let sentinel = changes(&store, "alice", Some("")).changes().unwrap();
        assert_eq!(sentinel, set);
    }

    #[test]
    fn zero_token_is_a_diff() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "a.ics").unwrap();
        store.put_event("alice", "a.ics").unwrap();

        let set = changes(&store, "alice", Some("0")).changes().unwrap();
        assert_eq!(set.added, vec!["a.ics"]);
        assert!(set.modified.is_empty());
    }

    #[test]
    fn create_then_delete_is_invisible() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "keep.ics").unwrap();
        let t0 = changes(&store, "alice", None).changes().unwrap().sync_token;

        store.put_event("alice", "a.ics").unwrap();
        store.delete_event("alice", "a.ics").unwrap();

        let set = changes(&store, "alice", Some(&t0)).changes().unwrap();
        assert!(set.is_empty());
        assert_eq!(set.sync_token, "3");
    }

    #[test]
    fn deletion_reported_once() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "a.ics").unwrap();

        store.put_event("alice", "a.ics").unwrap();
        store.delete_event("alice", "a.ics").unwrap();

        let set = changes(&store, "alice", Some("1")).changes().unwrap();
        assert_eq!(set.deleted, vec!["a.ics"]);
        assert!(set.added.is_empty() && set.modified.is_empty());
    }

    #[test]
    fn task_changes_merge_into_calendar_diff() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.create_task_list("alice").unwrap();
        store.put_event("alice", "e.ics").unwrap();
        store.put_task("alice", "t.ics").unwrap();

        let initial = changes(&store, "alice", None).changes().unwrap();
        assert_eq!(initial.sync_token, "1/1");
        assert_eq!(initial.added, vec!["e.ics", "t.ics"]);

        store.put_task("alice", "t.ics").unwrap();
        let set = changes(&store, "alice", Some("1/1")).changes().unwrap();
        assert_eq!(set.sync_token, "1/2");
        assert_eq!(set.modified, vec!["t.ics"]);
        assert!(set.added.is_empty());
    }

    #[test]
    fn bare_token_on_primary_restarts_task_stream() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "e.ics").unwrap();
        store.create_task_list("alice").unwrap();
        store.put_task("alice", "t.ics").unwrap();

        let set = changes(&store, "alice", Some("1")).changes().unwrap();
        assert_eq!(set.sync_token, "1/1");
        assert_eq!(set.added, vec!["t.ics"]);
    }

    #[test]
    fn secondary_collection_ignores_tasks() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.create_task_list("alice").unwrap();
        store.create_collection("team", "alice").unwrap();
        store.put_event("team", "x.ics").unwrap();
        store.put_task("alice", "t.ics").unwrap();

        let set = changes(&store, "team", None).changes().unwrap();
        assert_eq!(set.sync_token, "1");
        assert_eq!(set.added, vec!["x.ics"]);
    }

    #[test]
    fn pruned_token_requires_resync() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        for i in 0..6 {
            store.put_event("alice", &format!("{i}.ics")).unwrap();
        }
        store.prune_log(StreamRef::calendar("alice"), 4).unwrap();

        assert!(changes(&store, "alice", Some("2")).is_resync_required());
        assert!(!changes(&store, "alice", Some("4")).is_resync_required());
    }

    #[test]
    fn future_and_malformed_tokens_require_resync() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "a.ics").unwrap();

        assert!(changes(&store, "alice", Some("9")).is_resync_required());
        assert!(changes(&store, "alice", Some("x/y")).is_resync_required());
    }

    #[test]
    fn horizon_exceeded_requires_resync() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store
            .put_object_at(StreamRef::calendar("alice"), "ancient.ics", 1_000)
            .unwrap();
        store.put_event("alice", "recent.ics").unwrap();

        assert!(changes(&store, "alice", Some("0")).is_resync_required());
        let set = changes(&store, "alice", Some("1")).changes().unwrap();
        assert_eq!(set.added, vec!["recent.ics"]);
    }

    #[test]
    fn limit_truncates_and_resumes() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        for i in 0..5 {
            store.put_event("alice", &format!("{i}.ics")).unwrap();
        }

        let first = changes_limited(&store, "alice", Some("0"), Some(2))
            .changes()
            .unwrap();
        assert_eq!(first.added, vec!["0.ics", "1.ics"]);
        assert_eq!(first.sync_token, "2");
        assert!(first.truncated);

        let rest = changes_limited(&store, "alice", Some(&first.sync_token), Some(10))
            .changes()
            .unwrap();
        assert_eq!(rest.added, vec!["2.ics", "3.ics", "4.ics"]);
        assert_eq!(rest.sync_token, "5");
        assert!(!rest.truncated);
    }

    #[test]
    fn store_failure_is_an_error() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.set_offline(true);

        let mut ctx = RequestContext::new(&store);
        let result = ChangeSetResolver::new(HORIZON).changes(&mut ctx, "alice", Some("0"), None);
        assert!(matches!(result, Err(ServerError::StoreUnavailable(_))));
    }

    #[test]
    fn zero_limit_still_makes_progress() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.put_event("alice", "a.ics").unwrap();
        store.put_event("alice", "b.ics").unwrap();

        let first = changes_limited(&store, "alice", Some("0"), Some(0))
            .changes()
            .unwrap();
        assert_eq!(first.added, vec!["a.ics"]);
        assert_eq!(first.sync_token, "1");
        assert!(first.truncated);

        let second = changes_limited(&store, "alice", Some(&first.sync_token), Some(0))
            .changes()
            .unwrap();
        assert_eq!(second.added, vec!["b.ics"]);
        assert_eq!(second.sync_token, "2");
        assert!(!second.truncated);
    }

    /// Reports a truncated log that returned no records.
    struct StalledStore(InMemoryStore);

    impl CollectionStore for StalledStore {
        fn collection(&self, id: &str) -> StoreResult<Option<CollectionInfo>> {
            self.0.collection(id)
        }

        fn task_list(&self, owner: &str) -> StoreResult<Option<StreamInfo>> {
            self.0.task_list(owner)
        }

        fn changes_since(
            &self,
            stream: StreamRef<'_>,
            since: u64,
            not_before: u64,
            limit: Option<usize>,
        ) -> StoreResult<ChangeLog> {
            let mut log = self.0.changes_since(stream, since, not_before, limit)?;
            log.has_more = log.has_more || !log.records.is_empty();
            log.records.clear();
            Ok(log)
        }

        fn membership(&self, stream: StreamRef<'_>) -> StoreResult<Membership> {
            self.0.membership(stream)
        }
    }

    #[test]
    fn empty_truncated_scan_keeps_client_token() {
        let inner = InMemoryStore::new();
        inner.create_collection("alice", "alice").unwrap();
        inner.put_event("alice", "a.ics").unwrap();
        inner.put_event("alice", "b.ics").unwrap();
        let store = StalledStore(inner);

        let mut ctx = RequestContext::new(&store);
        let set = ChangeSetResolver::new(HORIZON)
            .changes(&mut ctx, "alice", Some("0"), Some(1))
            .unwrap()
            .changes()
            .unwrap();
        assert!(set.is_empty());
        assert_eq!(set.sync_token, "0");
        assert!(set.truncated);
    }

    #[test]
    fn shared_name_reported_once_on_initial_sync() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.create_task_list("alice").unwrap();
        store.put_event("alice", "x.ics").unwrap();
        store.put_task("alice", "x.ics").unwrap();

        let set = changes(&store, "alice", None).changes().unwrap();
        assert_eq!(set.added, vec!["x.ics"]);
        assert_eq!(set.sync_token, "1/1");
    }

    #[test]
    fn removing_task_keeps_event_of_same_name() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.create_task_list("alice").unwrap();
        store.put_event("alice", "x.ics").unwrap();
        store.put_task("alice", "x.ics").unwrap();

        store.delete_task("alice", "x.ics").unwrap();
        let set = changes(&store, "alice", Some("1/1")).changes().unwrap();
        assert!(set.deleted.is_empty());
        assert_eq!(set.modified, vec!["x.ics"]);

        store.delete_event("alice", "x.ics").unwrap();
        let gone = changes(&store, "alice", Some(&set.sync_token)).changes().unwrap();
        assert_eq!(gone.deleted, vec!["x.ics"]);
    }

    #[test]
    fn task_created_beside_event_is_a_modification() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.create_task_list("alice").unwrap();
        store.put_event("alice", "x.ics").unwrap();

        store.put_task("alice", "x.ics").unwrap();
        let set = changes(&store, "alice", Some("1/0")).changes().unwrap();
        assert!(set.added.is_empty());
        assert_eq!(set.modified, vec!["x.ics"]);
    }

    proptest::proptest! {
        #[test]
        fn applying_diff_reaches_current_membership(
            ops in proptest::collection::vec((0..4u8, proptest::bool::ANY), 0..40),
            split in 0..40usize,
        ) {
            use std::collections::BTreeSet;

            let store = InMemoryStore::new();
            store.create_collection("alice", "alice").unwrap();
            let mut client: Option<(String, BTreeSet<String>)> = None;

            for (i, (object, put)) in ops.iter().enumerate() {
                if i == split {
                    let set = changes(&store, "alice", None).changes().unwrap();
                    client = Some((set.sync_token, set.added.into_iter().collect()));
                }
                let name = format!("{object}.ics");
                if *put || store.delete_event("alice", &name).is_err() {
                    store.put_event("alice", &name).unwrap();
                }
            }

            let (token, mut members) = match client {
                Some(client) => client,
                None => ("0".to_string(), BTreeSet::new()),
            };
            let diff = changes(&store, "alice", Some(&token)).changes().unwrap();
            for name in &diff.deleted {
                proptest::prop_assert!(members.remove(name));
            }
            for name in &diff.modified {
                proptest::prop_assert!(members.contains(name));
            }
            for name in diff.added {
                proptest::prop_assert!(members.insert(name));
            }

            let current = store.membership(StreamRef::calendar("alice")).unwrap();
            proptest::prop_assert_eq!(members, current.names.into_iter().collect::<BTreeSet<_>>());
        }
    }

    #[test]
    fn current_token_matches_initial_sync() {
        let store = InMemoryStore::new();
        store.create_collection("alice", "alice").unwrap();
        store.create_task_list("alice").unwrap();
        store.put_event("alice", "e.ics").unwrap();

        let mut ctx = RequestContext::new(&store);
        let resolver = ChangeSetResolver::new(HORIZON);
        assert_eq!(resolver.current_token(&mut ctx, "alice").unwrap(), "1/0");
    }
}
