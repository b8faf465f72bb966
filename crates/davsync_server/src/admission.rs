//! Bounded-concurrency admission gate for the ctag poll path.
//!
//! Polling clients can hit the server far harder than any other request
//! type. The gate caps how many of them touch the store at once, independent
//! of how many requests the web server itself accepts.
//!
//! ## Protocol
//!
//! 1. Scan slots `1..=pool_size`, claiming the first free one without blocking
//! 2. If every slot is held, sleep `retry_interval` and scan again
//! 3. After `retry_count` extra rounds, fail with `AdmissionTimeout`
//!
//! Any waiter may win any freed slot; there is no queue. A claimed slot is
//! returned when its [`SlotGuard`] drops, so early returns and `?` cannot leak
//! a slot.

use crate::config::{AdmissionConfig, SlotBackendConfig};
use crate::error::{ServerError, ServerResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Slot primitives.
enum SlotPool {
    /// One flag per slot.
    InProcess(Vec<AtomicBool>),
    /// One advisory lock file per slot.
    LockFiles {
        dir: PathBuf,
        prefix: String,
        size: usize,
    },
}

/// What a guard must give back on drop.
enum Lease {
    Flag,
    File(File),
}

impl SlotPool {
    fn size(&self) -> usize {
        match self {
            SlotPool::InProcess(flags) => flags.len(),
            SlotPool::LockFiles { size, .. } => *size,
        }
    }

    /// Non-blocking exclusive claim of slot `index` (0-based).
    fn try_claim(&self, index: usize) -> ServerResult<Option<Lease>> {
        match self {
            SlotPool::InProcess(flags) => Ok(flags[index]
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .ok()
                .map(|_| Lease::Flag)),
            SlotPool::LockFiles { dir, prefix, .. } => {
                let path = dir.join(format!("{prefix}{}", index + 1));
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)?;
                if file.try_lock_exclusive().is_err() {
                    return Ok(None);
                }
                Ok(Some(Lease::File(file)))
            }
        }
    }

    fn release(&self, index: usize, lease: Lease) {
        match (self, lease) {
            (SlotPool::InProcess(flags), Lease::Flag) => {
                flags[index].store(false, Ordering::Release);
            }
            (_, Lease::File(file)) => {
                // Closing the file drops the lock as well
                let _ = FileExt::unlock(&file);
            }
            (SlotPool::LockFiles { .. }, Lease::Flag) => {}
        }
    }
}

/// Bounded pool of admission slots.
///
/// # Example
///
/// ```
/// use davsync_server::AdmissionGate;
/// use std::time::Duration;
///
/// let gate = AdmissionGate::in_process(2, 3, Duration::from_millis(1));
/// let slot = gate.acquire("ctag").unwrap();
/// assert_eq!(gate.held(), 1);
/// drop(slot);
/// assert_eq!(gate.held(), 0);
/// ```
pub struct AdmissionGate {
    pool: SlotPool,
    retry_count: u32,
    retry_interval: Duration,
    held: AtomicUsize,
}

impl AdmissionGate {
    /// Creates a gate from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is empty or the lock directory cannot be
    /// created.
    pub fn new(config: &AdmissionConfig) -> ServerResult<Self> {
        if config.pool_size == 0 {
            return Err(ServerError::InvalidConfig(
                "admission pool size must be at least 1".into(),
            ));
        }

        let pool = match &config.slots {
            SlotBackendConfig::InProcess => SlotPool::InProcess(
                (0..config.pool_size).map(|_| AtomicBool::new(false)).collect(),
            ),
            SlotBackendConfig::LockFiles { dir, prefix } => {
                fs::create_dir_all(dir)?;
                SlotPool::LockFiles {
                    dir: dir.clone(),
                    prefix: prefix.clone(),
                    size: config.pool_size,
                }
            }
        };

        Ok(Self {
            pool,
            retry_count: config.retry_count,
            retry_interval: config.retry_interval,
            held: AtomicUsize::new(0),
        })
    }

    /// Creates an in-process gate.
    ///
    /// A `pool_size` of zero is raised to one.
    pub fn in_process(pool_size: usize, retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            pool: SlotPool::InProcess(
                (0..pool_size.max(1)).map(|_| AtomicBool::new(false)).collect(),
            ),
            retry_count,
            retry_interval,
            held: AtomicUsize::new(0),
        }
    }

    /// Returns the number of slots.
    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Returns the number of slots currently held through this gate.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// Claims a slot, blocking for at most the configured retry budget.
    ///
    /// `resource` names what the caller is about to access; it only appears in
    /// logs and errors.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionTimeout` when every round found all slots held, or
    /// `Io` when a lock file cannot be opened.
    pub fn acquire(&self, resource: &str) -> ServerResult<SlotGuard<'_>> {
        let rounds = self.retry_count.saturating_add(1);

        for round in 1..=rounds {
            for index in 0..self.pool.size() {
                if let Some(lease) = self.pool.try_claim(index)? {
                    self.held.fetch_add(1, Ordering::AcqRel);
                    debug!(resource, slot = index + 1, round, "admission slot claimed");
                    return Ok(SlotGuard {
                        gate: self,
                        index,
                        lease: Some(lease),
                    });
                }
            }

            if round < rounds {
                thread::sleep(self.retry_interval);
            }
        }

        warn!(
            resource,
            pool_size = self.pool.size(),
            attempts = rounds,
            "admission pool exhausted"
        );
        Err(ServerError::AdmissionTimeout {
            resource: resource.to_string(),
            attempts: rounds,
        })
    }

    /// Runs `f` while holding a slot.
    pub fn with_slot<T>(
        &self,
        resource: &str,
        f: impl FnOnce() -> ServerResult<T>,
    ) -> ServerResult<T> {
        let _slot = self.acquire(resource)?;
        f()
    }
}

/// A held admission slot, released on drop.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct SlotGuard<'a> {
    gate: &'a AdmissionGate,
    index: usize,
    lease: Option<Lease>,
}

impl SlotGuard<'_> {
    /// Returns the slot number (1-based).
    pub fn slot(&self) -> usize {
        self.index + 1
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            // Count down before freeing the slot so `held` never overshoots
            self.gate.held.fetch_sub(1, Ordering::AcqRel);
            self.gate.pool.release(self.index, lease);
        }
    }
}
