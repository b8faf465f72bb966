//! Server configuration.
//!
//! Configuration is owned by the deployment and read once at startup, either
//! built in code with the `with_*` methods or loaded from JSON:
//!
//! ```json
//! {
//!   "admission": { "pool_size": 25, "retry_count": 4, "retry_interval_ms": 8 },
//!   "lookback_horizon_ms": 47347200000,
//!   "refresh": { "scope": "global", "schedule": { "20": 100, "100": 500 } },
//!   "store": { "kind": "snapshot", "path": "/var/lib/davsync/store.json" }
//! }
//! ```

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the sync server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Admission gate for the ctag poll path.
    pub admission: AdmissionConfig,
    /// Maximum age of change-log entries considered by a change query.
    #[serde(with = "duration_millis", rename = "lookback_horizon_ms")]
    pub lookback_horizon: Duration,
    /// Change limit applied when the client sends none.
    pub default_limit: Option<usize>,
    /// Periodic deep reconciliation schedule.
    pub refresh: RefreshConfig,
    /// Store backend, selected once at startup.
    pub store: StoreBackendConfig,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            // 18 months
            lookback_horizon: DAY * 548,
            default_limit: None,
            refresh: RefreshConfig::default(),
            store: StoreBackendConfig::Memory,
        }
    }

    /// Sets the admission configuration.
    pub fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    /// Sets the look-back horizon.
    pub fn with_lookback_horizon(mut self, horizon: Duration) -> Self {
        self.lookback_horizon = horizon;
        self
    }

    /// Sets the default change limit.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Sets the refresh schedule.
    pub fn with_refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = refresh;
        self
    }

    /// Sets the store backend.
    pub fn with_store(mut self, store: StoreBackendConfig) -> Self {
        self.store = store;
        self
    }

    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ServerResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ServerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks values that would make the server unusable.
    pub fn validate(&self) -> ServerResult<()> {
        if self.admission.pool_size == 0 {
            return Err(ServerError::InvalidConfig(
                "admission pool size must be at least 1".into(),
            ));
        }
        if self.default_limit == Some(0) {
            return Err(ServerError::InvalidConfig(
                "default limit must be at least 1".into(),
            ));
        }
        for (&frequency, &limit) in &self.refresh.schedule {
            if frequency == 0 || limit == 0 {
                return Err(ServerError::InvalidConfig(format!(
                    "refresh schedule entry {frequency} -> {limit} must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of the admission gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Number of slots (concurrent store accesses on the poll path).
    pub pool_size: usize,
    /// Scan rounds after the first one before giving up. The default of 4
    /// gives five rounds in total.
    pub retry_count: u32,
    /// Sleep between scan rounds.
    #[serde(with = "duration_millis", rename = "retry_interval_ms")]
    pub retry_interval: Duration,
    /// Slot primitive.
    pub slots: SlotBackendConfig,
}

impl AdmissionConfig {
    /// Creates an in-process admission configuration.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            retry_count: 4,
            retry_interval: Duration::from_millis(8),
            slots: SlotBackendConfig::InProcess,
        }
    }

    /// Sets the retry budget.
    pub fn with_retries(mut self, retry_count: u32, retry_interval: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_interval = retry_interval;
        self
    }

    /// Uses advisory lock files in `dir`, shared by every process pointing
    /// at the same directory.
    pub fn with_lock_files(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.slots = SlotBackendConfig::LockFiles {
            dir: dir.into(),
            prefix: prefix.into(),
        };
        self
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::new(25)
    }
}

/// Primitive backing the admission slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotBackendConfig {
    /// Atomic flags, for workers sharing one process.
    InProcess,
    /// One advisory lock file per slot, for workers in separate processes.
    LockFiles {
        /// Directory holding the lock files.
        dir: PathBuf,
        /// File name prefix; slot `n` uses `<prefix><n>`.
        prefix: String,
    },
}

/// Scope of the refresh invocation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
    /// One counter for all collections.
    Global,
    /// One counter per collection.
    PerCollection,
}

/// Periodic deep reconciliation schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Counter scope.
    pub scope: RefreshScope,
    /// `frequency -> widened limit`: every `frequency`-th call uses at least
    /// `widened limit`.
    pub schedule: BTreeMap<u64, usize>,
}

impl RefreshConfig {
    /// Creates an empty schedule (no widening).
    pub fn disabled() -> Self {
        Self {
            scope: RefreshScope::Global,
            schedule: BTreeMap::new(),
        }
    }

    /// Adds a schedule entry.
    pub fn every(mut self, frequency: u64, widened_limit: usize) -> Self {
        self.schedule.insert(frequency, widened_limit);
        self
    }

    /// Sets the counter scope.
    pub fn with_scope(mut self, scope: RefreshScope) -> Self {
        self.scope = scope;
        self
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::disabled().every(20, 100).every(100, 500)
    }
}

/// Store backend selected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// Empty in-memory store.
    Memory,
    /// In-memory store seeded from a JSON snapshot file.
    Snapshot {
        /// Snapshot file path.
        path: PathBuf,
    },
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.admission.pool_size, 25);
        assert_eq!(config.admission.retry_count, 4);
        assert_eq!(config.admission.slots, SlotBackendConfig::InProcess);
        assert_eq!(config.lookback_horizon, DAY * 548);
        assert_eq!(config.refresh.schedule.get(&20), Some(&100));
        assert_eq!(config.refresh.schedule.get(&100), Some(&500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_admission(
                AdmissionConfig::new(4).with_retries(2, Duration::from_millis(1)),
            )
            .with_default_limit(50)
            .with_refresh(RefreshConfig::disabled().every(10, 200))
            .with_lookback_horizon(DAY * 30);

        assert_eq!(config.admission.pool_size, 4);
        assert_eq!(config.admission.retry_interval, Duration::from_millis(1));
        assert_eq!(config.default_limit, Some(50));
        assert_eq!(config.refresh.schedule.len(), 1);
        assert_eq!(config.lookback_horizon, DAY * 30);
    }

    #[test]
    fn parse_json() {
        let config = ServerConfig::from_json(
            r#"{
                "admission": {
                    "pool_size": 3,
                    "retry_interval_ms": 2,
                    "slots": { "kind": "lock_files", "dir": "/tmp/davsync", "prefix": "slot_" }
                },
                "refresh": { "scope": "per_collection", "schedule": { "5": 40 } },
                "store": { "kind": "snapshot", "path": "store.json" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.admission.pool_size, 3);
        assert_eq!(config.admission.retry_count, 4);
        assert_eq!(config.admission.retry_interval, Duration::from_millis(2));
        assert!(matches!(
            config.admission.slots,
            SlotBackendConfig::LockFiles { .. }
        ));
        assert_eq!(config.refresh.scope, RefreshScope::PerCollection);
        assert_eq!(config.refresh.schedule.get(&5), Some(&40));
        assert_eq!(
            config.store,
            StoreBackendConfig::Snapshot {
                path: PathBuf::from("store.json")
            }
        );
    }

    #[test]
    fn reject_invalid_values() {
        assert!(ServerConfig::from_json(r#"{"admission": {"pool_size": 0}}"#).is_err());
        assert!(ServerConfig::from_json(r#"{"refresh": {"schedule": {"0": 10}}}"#).is_err());
        assert!(ServerConfig::from_json(r#"{"default_limit": 0}"#).is_err());
        assert!(ServerConfig::from_json("not json").is_err());
    }

    #[test]
    fn json_round_trip_keeps_durations() {
        let config = ServerConfig::new().with_lookback_horizon(Duration::from_secs(90));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"lookback_horizon_ms\":90000"));
        assert_eq!(ServerConfig::from_json(&json).unwrap(), config);
    }
}
