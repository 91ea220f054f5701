//! Configuration for the replicator.
//!
//! The configuration is an explicit struct built once and handed to the
//! [`Orchestrator`](crate::Orchestrator). It can be constructed programmatically
//! (tests use synthetic store lists) or loaded from YAML/JSON with
//! [`ReplicatorConfig::load()`].
//!
//! # Quick Start
//!
//! ```rust
//! use simple_replicator::config::{ReplicatorConfig, StoreConfig};
//!
//! let config = ReplicatorConfig {
//!     databases: vec![
//!         StoreConfig::for_testing("a.db"),
//!         StoreConfig::for_testing("b.db"),
//!     ],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicatorConfig
//! ├── loglevel: String             # trace|debug|info|warn|error
//! ├── driver: Driver               # default driver for every store
//! ├── databases: Vec<StoreConfig>  # ordered store list
//! ├── settings: ReplicationSettings
//! │   ├── interval                 # repeat passes (absent = once)
//! │   ├── on_pair_error            # abort | continue
//! │   ├── busy_timeout             # SQLite busy timeout
//! │   └── wal_mode
//! └── ledger: LedgerConfig         # optional replicated-row ledger
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! loglevel: debug
//! driver: sqlite3
//!
//! databases:
//!   - name: "/var/lib/edge/a.db"
//!   - name: "/var/lib/edge/b.db"
//!
//! settings:
//!   interval: "30s"
//!   on_pair_error: continue
//!
//! ledger:
//!   enabled: true
//!   sqlite_path: "/var/lib/edge/ledger.db"
//! ```

use crate::error::{ReplicatorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Prefix for environment variable overrides (`REPLICATOR__LOGLEVEL=debug`).
const ENV_PREFIX: &str = "REPLICATOR";

/// Separator for nested keys in environment variables.
const ENV_SEPARATOR: &str = "__";

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `Orchestrator::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Minimum log level (`RUST_LOG` takes precedence when set).
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Driver used for every store that does not name its own.
    #[serde(default)]
    pub driver: Driver,

    /// Stores participating in reconciliation, in pass order.
    #[serde(default)]
    pub databases: Vec<StoreConfig>,

    /// Pass scheduling and connection settings.
    #[serde(default)]
    pub settings: ReplicationSettings,

    /// Replicated-row ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

fn default_loglevel() -> String {
    "info".to_string()
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            driver: Driver::default(),
            databases: Vec::new(),
            settings: ReplicationSettings::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl ReplicatorConfig {
    /// Create a config for testing from a list of store names.
    pub fn for_testing(names: &[&str]) -> Self {
        Self {
            databases: names.iter().map(|n| StoreConfig::for_testing(n)).collect(),
            ..Default::default()
        }
    }

    /// Load configuration from a YAML or JSON file, then apply
    /// `REPLICATOR__`-prefixed environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = rust_cli_config::Config::builder()
            .add_source(rust_cli_config::File::from(path))
            .add_source(
                rust_cli_config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                ReplicatorError::Config(format!("failed to load `{}`: {}", path.display(), e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for problems that would make a pass meaningless
    /// or ambiguous.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(ReplicatorError::Config("store name must not be empty".into()));
            }
            if !names.insert(db.name.as_str()) {
                return Err(ReplicatorError::Config(format!(
                    "duplicate store name `{}`",
                    db.name
                )));
            }
        }

        if self.databases.len() < 2 {
            warn!(
                stores = self.databases.len(),
                "Fewer than two stores configured, passes will replicate nothing"
            );
        }

        self.settings.interval_duration()?;
        self.settings.busy_timeout_duration()?;
        Ok(())
    }

    /// Resolve the driver for a store (its own override, or the default).
    pub fn driver_for(&self, store: &StoreConfig) -> Driver {
        store.driver.unwrap_or(self.driver)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Driver: backend selection
// ═══════════════════════════════════════════════════════════════════════════════

/// Store driver identifier.
///
/// `sqlite`, `sqlite3` and the empty string all select SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Driver {
    #[default]
    #[serde(rename = "sqlite3", alias = "sqlite", alias = "")]
    Sqlite,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Sqlite => write!(f, "sqlite3"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StoreConfig: one entry per store
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for a single store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store name; for SQLite this is the database path (or `:memory:`).
    pub name: String,

    /// Optional driver override for this store.
    #[serde(default)]
    pub driver: Option<Driver>,
}

impl StoreConfig {
    /// Create a store config for testing.
    pub fn for_testing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: None,
        }
    }

    /// Whether this store lives only in memory.
    pub fn is_in_memory(&self) -> bool {
        self.name == ":memory:" || self.name.starts_with("file::memory:")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationSettings: scheduling and connection tuning
// ═══════════════════════════════════════════════════════════════════════════════

/// What a pass does after one pair fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairErrorPolicy {
    /// Stop the pass and surface the pair's error.
    #[default]
    Abort,
    /// Record the failure and move on to the next pair.
    Continue,
}

/// Pass scheduling and store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Delay between passes as a duration string (e.g. "30s").
    /// `None` runs a single pass.
    #[serde(default)]
    pub interval: Option<String>,

    /// Behavior after a pair-scoped failure.
    #[serde(default)]
    pub on_pair_error: PairErrorPolicy,

    /// SQLite busy timeout as a duration string.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout: String,

    /// Whether to open file-backed stores in WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

fn default_busy_timeout() -> String {
    "5s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            interval: None,
            on_pair_error: PairErrorPolicy::Abort,
            busy_timeout: default_busy_timeout(),
            wal_mode: true,
        }
    }
}

impl ReplicationSettings {
    /// Parse the pass interval, if any.
    pub fn interval_duration(&self) -> Result<Option<Duration>> {
        self.interval
            .as_deref()
            .map(|s| parse_duration("interval", s))
            .transpose()
    }

    /// Parse the busy timeout.
    pub fn busy_timeout_duration(&self) -> Result<Duration> {
        parse_duration("busy_timeout", &self.busy_timeout)
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ReplicatorError::Config(format!("invalid {} `{}`: {}", field, value, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// LedgerConfig: replicated-row ledger
// ═══════════════════════════════════════════════════════════════════════════════

/// Replicated-row ledger configuration.
///
/// When enabled, content hashes of rows known to be present at each store are
/// persisted in a separate SQLite file and consulted before destination lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Path to the ledger database.
    #[serde(default = "default_ledger_path")]
    pub sqlite_path: String,
}

fn default_ledger_path() -> String {
    "replication_ledger.db".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sqlite_path: default_ledger_path(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
