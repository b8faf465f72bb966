//! Periodic deep reconciliation.
//!
//! Most change queries use the caller's (possibly small) limit. Every
//! `frequency`-th query is widened so clients that poll with a tight limit
//! still catch up periodically.

use crate::config::{RefreshConfig, RefreshScope};
use crate::context::RequestContext;
use crate::error::ServerResult;
use crate::resolver::ChangeSetResolver;
use davsync_protocol::ChangeReport;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Invocation counter, global or per collection.
#[derive(Debug)]
enum Counter {
    Global(AtomicU64),
    PerCollection(Mutex<HashMap<String, u64>>),
}

impl Counter {
    fn new(scope: RefreshScope) -> Self {
        match scope {
            RefreshScope::Global => Counter::Global(AtomicU64::new(0)),
            RefreshScope::PerCollection => Counter::PerCollection(Mutex::new(HashMap::new())),
        }
    }

    /// Increments and returns the new count.
    fn tick(&self, collection_id: &str) -> u64 {
        match self {
            Counter::Global(count) => count.fetch_add(1, Ordering::Relaxed) + 1,
            Counter::PerCollection(counts) => {
                let mut counts = counts.lock();
                let count = counts.entry(collection_id.to_string()).or_insert(0);
                *count += 1;
                *count
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        match self {
            Counter::Global(_) => 1,
            Counter::PerCollection(counts) => counts.lock().len(),
        }
    }
}

/// Resolver wrapper that widens the limit on a schedule.
#[derive(Debug)]
pub struct PeriodicRefreshPolicy {
    resolver: ChangeSetResolver,
    schedule: BTreeMap<u64, usize>,
    counter: Counter,
}

impl PeriodicRefreshPolicy {
    /// Creates a policy around `resolver`.
    pub fn new(resolver: ChangeSetResolver, config: &RefreshConfig) -> Self {
        Self {
            resolver,
            schedule: config.schedule.clone(),
            counter: Counter::new(config.scope),
        }
    }

    /// Returns the wrapped resolver.
    pub fn resolver(&self) -> &ChangeSetResolver {
        &self.resolver
    }

    /// Limit to use for the `count`-th invocation.
    ///
    /// The widened limit is the largest one among frequencies dividing
    /// `count`. It never narrows the caller: the result is the larger of the
    /// two, and an unbounded caller stays unbounded.
    pub fn effective_limit(&self, count: u64, limit: Option<usize>) -> Option<usize> {
        let widened = self
            .schedule
            .iter()
            .filter(|(&frequency, _)| frequency != 0 && count % frequency == 0)
            .map(|(_, &widened)| widened)
            .max();

        match (limit, widened) {
            (None, _) => None,
            (Some(limit), Some(widened)) => Some(limit.max(widened)),
            (Some(limit), None) => Some(limit),
        }
    }

    /// Counts the invocation and delegates to the resolver with the
    /// effective limit. Queries for unknown collections are not counted.
    pub fn changes(
        &self,
        ctx: &mut RequestContext<'_>,
        collection_id: &str,
        client_token: Option<&str>,
        limit: Option<usize>,
    ) -> ServerResult<ChangeReport> {
        ctx.require_collection(collection_id)?;
        let count = self.counter.tick(collection_id);
        let effective = self.effective_limit(count, limit);
        if effective != limit {
            debug!(
                collection = collection_id,
                count,
                requested = ?limit,
                widened = ?effective,
                "periodic refresh widened limit"
            );
        }
        self.resolver
            .changes(ctx, collection_id, client_token, effective)
    }
}
