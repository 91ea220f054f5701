// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replicated-row ledger.
//!
//! Remembers, per store, the content hashes of rows known to be present there.
//! A source row whose hash is already recorded for the destination is skipped
//! without a destination lookup, which stops rows from flowing back and forth
//! between stores on every bidirectional pass.
//!
//! # Staged Writes
//!
//! Entries are only trusted once the pair that produced them has committed:
//! - `stage()` records an entry in memory, invisible to `contains()`
//! - `flush_staged()` persists staged entries and publishes them to the cache
//! - `discard_staged()` drops them when the pair failed
//!
//! ```text
//! pair A→B: stage(B, h1) stage(A, h1) ... commit B ──▶ flush_staged()
//!                                          fail     ──▶ discard_staged()
//! ```
//!
//! A flush that fails leaves the entries staged; the engine then discards
//! them, so an unflushed pair is looked up again on the next pass.
//!
//! The ledger outlives the process. A row deleted from a store is not
//! re-inserted while the ledger still lists it for that store.

use crate::error::{ReplicatorError, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerEntry {
    /// Row content hash.
    pub hash: String,
    /// Store the row is known to exist in.
    pub store: String,
}

/// Persistent record of replicated rows, backed by SQLite.
pub struct RowLedger {
    /// SQLite connection pool
    pool: SqlitePool,
    /// Committed hashes by store
    cache: RwLock<HashMap<String, HashSet<String>>>,
    /// Entries waiting for their pair to commit
    staged: RwLock<HashSet<LedgerEntry>>,
    /// Path to database file
    path: String,
}

impl RowLedger {
    /// Open the ledger at `path`, creating it if needed.
    ///
    /// `:memory:` gives a ledger that lives as long as this value.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!(path = %path_str, "Opening row ledger");

        let options = if path_str == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(ReplicatorError::Ledger)?
        } else {
            SqliteConnectOptions::new()
                .filename(&path_str)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(ReplicatorError::Ledger)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                hash TEXT NOT NULL,
                store TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (hash, store)
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(ReplicatorError::Ledger)?;

        let rows: Vec<(String, String)> = sqlx::query_as("SELECT hash, store FROM ledger")
            .fetch_all(&pool)
            .await
            .map_err(ReplicatorError::Ledger)?;

        let mut cache: HashMap<String, HashSet<String>> = HashMap::new();
        for (hash, store) in rows {
            cache.entry(store).or_default().insert(hash);
        }

        if !cache.is_empty() {
            info!(
                stores = cache.len(),
                entries = cache.values().map(HashSet::len).sum::<usize>(),
                "Restored ledger from previous run"
            );
        }

        Ok(Self {
            pool,
            cache: RwLock::new(cache),
            staged: RwLock::new(HashSet::new()),
            path: path_str,
        })
    }

    /// Whether `hash` is recorded (and committed) for `store`.
    pub async fn contains(&self, store: &str, hash: &str) -> bool {
        self.cache
            .read()
            .await
            .get(store)
            .is_some_and(|hashes| hashes.contains(hash))
    }

    /// Stage an entry until the current pair commits.
    pub async fn stage(&self, store: &str, hash: &str) {
        self.staged.write().await.insert(LedgerEntry {
            hash: hash.to_string(),
            store: store.to_string(),
        });
    }

    /// Drop every staged entry. Returns how many were dropped.
    pub async fn discard_staged(&self) -> usize {
        let mut staged = self.staged.write().await;
        let count = staged.len();
        staged.clear();
        if count > 0 {
            debug!(count, "Discarded staged ledger entries");
        }
        count
    }

    /// Persist staged entries in one transaction and publish them.
    ///
    /// Returns the number of entries written. On failure the entries stay
    /// staged and the cache is untouched.
    pub async fn flush_staged(&self) -> Result<usize> {
        let entries: Vec<LedgerEntry> = self.staged.read().await.iter().cloned().collect();
        if entries.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await.map_err(ReplicatorError::Ledger)?;
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO ledger (hash, store, recorded_at)
                VALUES (?, ?, ?)
                ON CONFLICT(hash, store) DO UPDATE SET
                    recorded_at = excluded.recorded_at
                "#,
            )
            .bind(&entry.hash)
            .bind(&entry.store)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(ReplicatorError::Ledger)?;
        }
        tx.commit().await.map_err(ReplicatorError::Ledger)?;

        {
            let mut cache = self.cache.write().await;
            for entry in &entries {
                cache
                    .entry(entry.store.clone())
                    .or_default()
                    .insert(entry.hash.clone());
            }
        }
        self.staged.write().await.clear();

        debug!(flushed = entries.len(), "Flushed ledger entries");
        crate::metrics::record_ledger_flush(entries.len());
        Ok(entries.len())
    }

    /// Number of committed entries across all stores.
    pub async fn len(&self) -> usize {
        self.cache.read().await.values().map(HashSet::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of entries waiting for a commit.
    pub async fn staged_count(&self) -> usize {
        self.staged.read().await.len()
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Close the pool. Staged entries are dropped, not flushed.
    pub async fn close(&self) {
        let dropped = self.discard_staged().await;
        if dropped > 0 {
            warn!(dropped, "Closing ledger with uncommitted entries");
        }
        if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
        {
            warn!(error = %e, "Failed to checkpoint ledger WAL on close");
        }
        self.pool.close().await;
        info!(path = %self.path, "Row ledger closed");
    }
}

impl std::fmt::Debug for RowLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowLedger").field("path", &self.path).finish()
    }
}
