// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicator.
//!
//! Errors are categorized by the stage that produced them and carry enough
//! context (store, table, statement) for an operator to diagnose a failed pair
//! from the log line alone.
//!
//! # Error Categories
//!
//! | Error Type | Scope | Description |
//! |------------|-------|-------------|
//! | `Catalog` | Run | Schema or column catalog unreadable |
//! | `Connection` | Run | Store could not be opened |
//! | `Config` | Run | Configuration invalid |
//! | `Ledger` | Run | Local ledger database error |
//! | `LedgerFlush` | Run | Pair committed but its ledger entries were not written |
//! | `InvalidState` | Run | Orchestrator state machine violation |
//! | `Query` | Pair | Source read or destination lookup failed mid-stream |
//! | `Apply` | Pair | Insert, table creation or commit failed |
//!
//! # Abort Behavior
//!
//! Use [`ReplicatorError::aborts_run()`] to decide whether the remaining pairs
//! of a pass can still be attempted. Nothing is retried: a pair-scoped error
//! discards that pair's transaction and nothing else.

use crate::engine::ReplicationResult;
use thiserror::Error;

/// Result type alias for replicator operations.
pub type Result<T> = std::result::Result<T, ReplicatorError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicatorError {
    /// The store catalog (tables or columns) could not be read.
    ///
    /// Without a schema there is nothing to reconcile, so this aborts the run.
    #[error("Catalog error ({store}): {message}")]
    Catalog {
        store: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A store could not be opened.
    #[error("Connection error ({store}): {source}")]
    Connection {
        store: String,
        #[source]
        source: sqlx::Error,
    },

    /// A source read or destination lookup failed.
    ///
    /// The current pair's transaction is discarded.
    #[error("Query error ({store}.{table}): {source} [{statement}]")]
    Query {
        store: String,
        table: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// An insert, table creation or commit failed at the destination.
    ///
    /// The current pair's transaction is discarded; nothing becomes visible.
    #[error("Apply error ({store}.{table}): {source} [{statement}]")]
    Apply {
        store: String,
        table: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// SQLite error in the replicated-row ledger.
    #[error("Ledger error: {0}")]
    Ledger(#[source] sqlx::Error),

    /// The pair committed, then recording it in the ledger failed.
    ///
    /// The destination already holds the pair's rows; only the ledger is
    /// behind. `committed` carries the pair's counts.
    #[error("Ledger flush failed after pair into {destination} committed: {source}")]
    LedgerFlush {
        destination: String,
        committed: ReplicationResult,
        #[source]
        source: Box<ReplicatorError>,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Orchestrator state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl ReplicatorError {
    /// Create a catalog error from a driver error.
    pub fn catalog(store: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Catalog {
            store: store.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a catalog error without a driver source.
    pub fn catalog_msg(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Catalog {
            store: store.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a query error.
    pub fn query(
        store: impl Into<String>,
        table: impl Into<String>,
        statement: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Query {
            store: store.into(),
            table: table.into(),
            statement: statement.into(),
            source,
        }
    }

    /// Create an apply error.
    pub fn apply(
        store: impl Into<String>,
        table: impl Into<String>,
        statement: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Apply {
            store: store.into(),
            table: table.into(),
            statement: statement.into(),
            source,
        }
    }

    /// Counts of a pair that committed before this error was raised.
    pub fn committed(&self) -> Option<&ReplicationResult> {
        match self {
            Self::LedgerFlush { committed, .. } => Some(committed),
            _ => None,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Catalog { .. } => "catalog",
            Self::Connection { .. } => "connection",
            Self::Query { .. } => "query",
            Self::Apply { .. } => "apply",
            Self::Ledger(_) => "ledger",
            Self::LedgerFlush { .. } => "ledger",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
        }
    }

    /// Check if this error ends the whole pass rather than a single pair.
    pub fn aborts_run(&self) -> bool {
        match self {
            Self::Catalog { .. } => true,
            Self::Connection { .. } => true,
            Self::Config(_) => true,
            Self::Ledger(_) => true,
            Self::LedgerFlush { .. } => true,
            Self::InvalidState { .. } => true,
            Self::Query { .. } => false, // Pair transaction discarded
            Self::Apply { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_aborts_run() {
        let err = ReplicatorError::catalog_msg("a.db", "no such table: sqlite_master");
        assert!(err.aborts_run());
        assert!(err.to_string().contains("a.db"));
    }

    #[test]
    fn test_catalog_from_driver_error() {
        let err = ReplicatorError::catalog("a.db", sqlx::Error::RowNotFound);
        match &err {
            ReplicatorError::Catalog { source, .. } => assert!(source.is_some()),
            other => panic!("unexpected variant: {:?}", other),
        }
        assert!(err.aborts_run());
    }

    #[test]
    fn test_query_is_pair_scoped() {
        let err = ReplicatorError::query(
            "b.db",
            "users",
            r#"SELECT 1 FROM "users" LIMIT 1"#,
            sqlx::Error::PoolTimedOut,
        );
        assert!(!err.aborts_run());
        let msg = err.to_string();
        assert!(msg.contains("b.db.users"));
        assert!(msg.contains("SELECT 1"));
    }

    #[test]
    fn test_apply_is_pair_scoped() {
        let err = ReplicatorError::apply(
            "b.db",
            "users",
            r#"INSERT INTO users (id) VALUES ("1")"#,
            sqlx::Error::RowNotFound,
        );
        assert!(!err.aborts_run());
        assert!(err.to_string().contains("Apply error"));
    }

    #[test]
    fn test_config_aborts_run() {
        let err = ReplicatorError::Config("duplicate store name".to_string());
        assert!(err.aborts_run());
    }

    #[test]
    fn test_invalid_state_formatting() {
        let err = ReplicatorError::InvalidState {
            expected: "Idle".to_string(),
            actual: "Stopped".to_string(),
        };
        assert!(err.aborts_run());
        assert!(err.to_string().contains("Idle"));
        assert!(err.to_string().contains("Stopped"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ReplicatorError::catalog_msg("a", "x").kind(), "catalog");
        assert_eq!(ReplicatorError::Config("x".into()).kind(), "config");
        assert_eq!(
            ReplicatorError::apply("b", "t", "COMMIT", sqlx::Error::PoolClosed).kind(),
            "apply"
        );
    }

    #[test]
    fn test_ledger_aborts_run() {
        let err = ReplicatorError::Ledger(sqlx::Error::PoolClosed);
        assert!(err.aborts_run());
        assert!(err.committed().is_none());
    }

    #[test]
    fn test_ledger_flush_keeps_committed_counts() {
        let committed = ReplicationResult {
            tables: 1,
            inserted: 2,
            ..Default::default()
        };
        let err = ReplicatorError::LedgerFlush {
            destination: "b.db".into(),
            committed,
            source: Box::new(ReplicatorError::Ledger(sqlx::Error::PoolClosed)),
        };

        assert!(err.aborts_run());
        assert_eq!(err.kind(), "ledger");
        assert_eq!(err.committed(), Some(&committed));
        assert!(err.to_string().contains("b.db"));
    }
}
