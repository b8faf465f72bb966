//! JSON snapshots replayed into an [`InMemoryStore`].
//!
//! A snapshot lists collections and the object writes applied to them, in
//! order. Replaying the writes rebuilds tokens, ctags and change logs exactly
//! as the live store would have produced them.
//!
//! ```json
//! {
//!   "collections": [{ "id": "alice", "owner": "alice", "tasks": true }],
//!   "writes": [
//!     { "collection": "alice", "name": "standup.ics", "op": "put" },
//!     { "collection": "alice", "tasks": true, "name": "report.ics", "op": "put" }
//!   ]
//! }
//! ```

use super::{InMemoryStore, StoreResult, StreamRef};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A collection declared by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCollection {
    /// Collection id.
    pub id: String,
    /// Owner uid.
    pub owner: String,
    /// Whether the collection carries a task stream (primary only).
    #[serde(default)]
    pub tasks: bool,
}

/// Kind of replayed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    /// Create or update.
    Put,
    /// Delete.
    Delete,
}

/// One replayed object write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWrite {
    /// Target collection (the owner, for task writes).
    pub collection: String,
    /// Write to the task stream instead of the calendar stream.
    #[serde(default)]
    pub tasks: bool,
    /// Object name.
    pub name: String,
    /// Operation.
    pub op: WriteOp,
    /// Unix millis; defaults to load time.
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// Serialized store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Collections to create.
    pub collections: Vec<SnapshotCollection>,
    /// Writes to replay, oldest first.
    #[serde(default)]
    pub writes: Vec<SnapshotWrite>,
}

impl Snapshot {
    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl InMemoryStore {
    /// Builds a store by replaying a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> StoreResult<Self> {
        let store = Self::new();

        for collection in &snapshot.collections {
            store.create_collection(&collection.id, &collection.owner)?;
            if collection.tasks {
                store.create_task_list(&collection.owner)?;
            }
        }

        for write in &snapshot.writes {
            let stream = if write.tasks {
                StreamRef::tasks(&write.collection)
            } else {
                StreamRef::calendar(&write.collection)
            };
            match (write.op, write.timestamp) {
                (WriteOp::Put, Some(ts)) => store.put_object_at(stream, &write.name, ts)?,
                (WriteOp::Put, None) => store.put_object(stream, &write.name)?,
                (WriteOp::Delete, Some(ts)) => store.delete_object_at(stream, &write.name, ts)?,
                (WriteOp::Delete, None) => store.delete_object(stream, &write.name)?,
            };
        }

        debug!(
            collections = snapshot.collections.len(),
            writes = snapshot.writes.len(),
            "snapshot replayed"
        );
        Ok(store)
    }

    /// Loads and replays a snapshot file.
    pub fn load_snapshot(path: &Path) -> StoreResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_snapshot(&Snapshot::from_json(&json)?)
    }
}
