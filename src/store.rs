//! Store connections.
//!
//! A [`Store`] is one named, independently writable database participating in
//! reconciliation. It owns exactly one live connection (a single-connection
//! sqlx pool), opened once at startup and closed at exit.
//!
//! # Connection Settings
//!
//! - File-backed stores are created if missing and opened in WAL mode unless
//!   `settings.wal_mode` is off.
//! - `:memory:` stores keep their single connection for the life of the pool,
//!   since SQLite drops an in-memory database with its last connection.
//! - The busy timeout comes from `settings.busy_timeout`. Nothing is retried
//!   above the driver.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> simple_replicator::Result<()> {
//! use simple_replicator::store::Store;
//!
//! let store = Store::open("edge-a.db").await?;
//! // ... replicate ...
//! store.close().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{Driver, ReplicationSettings, StoreConfig};
use crate::error::{ReplicatorError, Result};
use crate::metrics;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};

/// A named store and its connection handle.
pub struct Store {
    /// Store name (the database path for SQLite).
    name: String,
    /// Driver this store was opened with.
    driver: Driver,
    /// Single-connection pool.
    pool: SqlitePool,
}

impl Store {
    /// Open a store with default settings and the SQLite driver.
    pub async fn open(name: impl Into<String>) -> Result<Self> {
        let name: String = name.into();
        let config = StoreConfig::for_testing(&name);
        Self::connect(&config, Driver::Sqlite, &ReplicationSettings::default()).await
    }

    /// Open a store described by `config` using `driver`.
    pub async fn connect(
        config: &StoreConfig,
        driver: Driver,
        settings: &ReplicationSettings,
    ) -> Result<Self> {
        info!(store = %config.name, driver = %driver, "Connecting to store");

        let pool = match driver {
            Driver::Sqlite => Self::connect_sqlite(config, settings).await,
        };

        match pool {
            Ok(pool) => {
                metrics::record_store_connection(&config.name, true);
                info!(store = %config.name, "Store connected");
                Ok(Self {
                    name: config.name.clone(),
                    driver,
                    pool,
                })
            }
            Err(e) => {
                metrics::record_store_connection(&config.name, false);
                error!(store = %config.name, error = %e, "Unable to open store");
                Err(e)
            }
        }
    }

    async fn connect_sqlite(
        config: &StoreConfig,
        settings: &ReplicationSettings,
    ) -> Result<SqlitePool> {
        let busy_timeout = settings.busy_timeout_duration()?;
        let connection_error = |source| ReplicatorError::Connection {
            store: config.name.clone(),
            source,
        };

        let options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(connection_error)?
        } else {
            let journal_mode = if settings.wal_mode {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            };
            SqliteConnectOptions::new()
                .filename(&config.name)
                .create_if_missing(true)
                .journal_mode(journal_mode)
        };
        let options = options.busy_timeout(busy_timeout);

        debug!(store = %config.name, in_memory = config.is_in_memory(), "Opening SQLite pool");

        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(connection_error)
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Driver this store was opened with.
    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!(store = %self.name, "Store closed");
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .finish()
    }
}
