//! Collection ctags.
//!
//! A ctag is an opaque marker that changes whenever a collection's membership
//! or content changes. Primary collections combine the calendar stream's ctag
//! with the task stream's, so a task edit is visible to pollers of the
//! calendar.

use crate::context::RequestContext;
use crate::error::ServerResult;
use sha2::{Digest, Sha256};

/// Hashes `data` to a lowercase hex string.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Reads and derives ctags. Stateless; all state lives in the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct CtagService;

impl CtagService {
    /// Creates the service.
    pub fn new() -> Self {
        Self
    }

    /// Returns the calendar stream ctag of a collection.
    ///
    /// A collection that has never been written has no stored ctag; it gets a
    /// stable one derived from its id until the first write.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if the collection does not exist,
    /// `StoreUnavailable` on store failure.
    pub fn ctag(&self, ctx: &mut RequestContext<'_>, collection_id: &str) -> ServerResult<String> {
        let collection = ctx.require_collection(collection_id)?;
        Ok(match collection.stream.ctag {
            Some(ctag) if !ctag.is_empty() => ctag,
            _ => content_hash(collection_id.as_bytes()),
        })
    }

    /// Returns the ctag exposed to clients.
    ///
    /// For a primary collection (`collection_id == owner_uid`) with a task
    /// stream this is `hash(calendar_ctag ++ task_ctag)`; for every other
    /// collection it is the calendar ctag alone.
    pub fn composite_ctag(
        &self,
        ctx: &mut RequestContext<'_>,
        collection_id: &str,
        owner_uid: &str,
    ) -> ServerResult<String> {
        let calendar = self.ctag(ctx, collection_id)?;
        if collection_id != owner_uid {
            return Ok(calendar);
        }

        match ctx.task_list(owner_uid)? {
            Some(tasks) => {
                let task_ctag = tasks.ctag.unwrap_or_default();
                let mut combined = calendar.into_bytes();
                combined.extend_from_slice(task_ctag.as_bytes());
                Ok(content_hash(&combined))
            }
            None => Ok(calendar),
        }
    }
}
