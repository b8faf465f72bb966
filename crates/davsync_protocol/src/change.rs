//! Change records and incremental change sets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of membership mutation recorded in a change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Object was created.
    Added,
    /// Object content changed.
    Modified,
    /// Object was removed.
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// One membership mutation of a collection stream.
///
/// Records are written by the store as a side effect of every object write.
/// `version` is the stream's sync token after the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Object name (e.g. `"meeting.ics"`).
    pub name: String,
    /// Kind of mutation.
    pub kind: ChangeKind,
    /// Stream version produced by this mutation.
    pub version: u64,
    /// Time of the mutation (Unix millis).
    pub timestamp: u64,
}

impl ChangeRecord {
    /// Creates a change record.
    pub fn new(name: impl Into<String>, kind: ChangeKind, version: u64, timestamp: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            version,
            timestamp,
        }
    }
}

/// Result of an incremental change query.
///
/// Lists hold object names only. An object appears in at most one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Composite token the client presents on its next query.
    pub sync_token: String,
    /// Objects created since the client token.
    pub added: Vec<String>,
    /// Objects changed since the client token.
    pub modified: Vec<String>,
    /// Objects removed since the client token.
    pub deleted: Vec<String>,
    /// True when the change limit cut the scan short and more changes remain.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl ChangeSet {
    /// Creates an empty change set at the given token.
    pub fn empty(sync_token: impl Into<String>) -> Self {
        Self {
            sync_token: sync_token.into(),
            ..Self::default()
        }
    }

    /// Returns true if no object changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Returns the total number of reported objects.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

/// Outcome of a change query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReport {
    /// An incremental (or initial) change set.
    Changes(ChangeSet),
    /// The client token cannot be resolved; the client must restart with an
    /// initial sync.
    ResyncRequired {
        /// Why the token was rejected.
        reason: String,
    },
}

impl ChangeReport {
    /// Creates a resync-required report.
    pub fn resync(reason: impl Into<String>) -> Self {
        Self::ResyncRequired {
            reason: reason.into(),
        }
    }

    /// Returns the change set, if any.
    pub fn changes(self) -> Option<ChangeSet> {
        match self {
            Self::Changes(set) => Some(set),
            Self::ResyncRequired { .. } => None,
        }
    }

    /// Returns true if the client must resynchronize from scratch.
    pub fn is_resync_required(&self) -> bool {
        matches!(self, Self::ResyncRequired { .. })
    }
}
