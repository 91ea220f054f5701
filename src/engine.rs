// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine: one (source, destination) pair.
//!
//! # Design
//!
//! ```text
//! Schema (source) ──▶ CREATE TABLE IF NOT EXISTS ... (each table, destination)
//!                          │
//!                          ▼
//!                  BEGIN (destination)
//!                          │
//!        for each table:   ▼
//!  SELECT cols FROM t ──▶ Row ──┬──▶ ledger hit?      ──▶ skip
//!      (source stream)          ├──▶ exists() at dst? ──▶ skip
//!                               └──▶ INSERT (bound)   ──▶ inserted
//!                          │
//!                          ▼
//!                  COMMIT ──▶ ledger flush
//! ```
//!
//! Every insert for the pair shares one transaction: the pair lands whole or
//! not at all. Any error drops the transaction (sqlx rolls it back) and the
//! ledger's staged entries with it.
//!
//! The ledger flush runs after the commit. If it fails, the rows stay at the
//! destination, the staged entries are dropped, and the error is
//! [`ReplicatorError::LedgerFlush`] carrying the committed counts.
//!
//! Rows are inserted in source cursor order within a table and in schema order
//! across tables. Values are matched and inserted by column name, so a
//! destination that declares the same columns in another order still lines up.

use crate::codec::{self, content_hash, render_insert, Row};
use crate::error::{ReplicatorError, Result};
use crate::ledger::RowLedger;
use crate::matcher;
use crate::schema::{create_table_statement, Schema, Table};
use crate::store::Store;
use futures::TryStreamExt;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, instrument, warn};

/// Counts for one replicated pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationResult {
    /// Tables considered.
    pub tables: usize,
    /// Rows inserted at the destination.
    pub inserted: usize,
    /// Rows found at the destination by lookup.
    pub skipped: usize,
    /// Rows skipped because the ledger already lists them for the destination.
    pub ledger_skipped: usize,
}

impl ReplicationResult {
    /// Source rows seen.
    pub fn rows_seen(&self) -> usize {
        self.inserted + self.skipped + self.ledger_skipped
    }

    /// Whether the pair changed nothing at the destination.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0
    }
}

/// Replicates rows from one store into another.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplicationEngine<'a> {
    ledger: Option<&'a RowLedger>,
}

impl<'a> ReplicationEngine<'a> {
    pub fn new() -> Self {
        Self { ledger: None }
    }

    /// Consult and update `ledger` while replicating.
    pub fn with_ledger(mut self, ledger: Option<&'a RowLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Copy every row of `schema`'s tables that `destination` lacks.
    ///
    /// `schema` must describe `source`.
    #[instrument(skip_all, fields(source = %source.name(), destination = %destination.name()))]
    pub async fn replicate(
        &self,
        schema: &Schema,
        source: &Store,
        destination: &Store,
    ) -> Result<ReplicationResult> {
        debug_assert_eq!(schema.store(), source.name(), "schema belongs to another store");

        let outcome = self.replicate_inner(schema, source, destination).await;

        match (outcome, self.ledger) {
            (Ok(result), Some(ledger)) => match ledger.flush_staged().await {
                Ok(_) => Ok(result),
                Err(e) => {
                    ledger.discard_staged().await;
                    warn!(
                        inserted = result.inserted,
                        error = %e,
                        "Pair committed but ledger flush failed"
                    );
                    Err(ReplicatorError::LedgerFlush {
                        destination: destination.name().to_string(),
                        committed: result,
                        source: Box::new(e),
                    })
                }
            },
            (Ok(result), None) => Ok(result),
            (Err(e), ledger) => {
                if let Some(ledger) = ledger {
                    ledger.discard_staged().await;
                }
                Err(e)
            }
        }
    }

    async fn replicate_inner(
        &self,
        schema: &Schema,
        source: &Store,
        destination: &Store,
    ) -> Result<ReplicationResult> {
        let mut result = ReplicationResult {
            tables: schema.len(),
            ..Default::default()
        };

        for table in schema.tables() {
            ensure_table(destination, table).await?;
        }

        let mut tx = destination
            .pool()
            .begin()
            .await
            .map_err(|e| ReplicatorError::apply(destination.name(), "", "BEGIN", e))?;

        for table in schema.tables() {
            self.replicate_table(table, source, destination, &mut tx, &mut result)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| ReplicatorError::apply(destination.name(), "", "COMMIT", e))?;

        debug!(
            tables = result.tables,
            inserted = result.inserted,
            skipped = result.skipped,
            ledger_skipped = result.ledger_skipped,
            "Pair committed"
        );
        Ok(result)
    }

    async fn replicate_table(
        &self,
        table: &dyn Table,
        source: &Store,
        destination: &Store,
        tx: &mut Transaction<'_, Sqlite>,
        result: &mut ReplicationResult,
    ) -> Result<()> {
        let table_name = table.table_name();
        let select = codec::select_statement(table);
        let insert = codec::insert_statement(table);
        let (mut inserted, mut skipped) = (0usize, 0usize);

        let mut rows = sqlx::query(&select).fetch(source.pool());
        while let Some(fetched) = rows
            .try_next()
            .await
            .map_err(|e| ReplicatorError::query(source.name(), table_name, &select, e))?
        {
            let row = Row::decode(&fetched, table.column_count())
                .map_err(|e| ReplicatorError::query(source.name(), table_name, &select, e))?;
            let hash = self.ledger.map(|_| content_hash(table, &row));

            if let (Some(ledger), Some(hash)) = (self.ledger, hash.as_deref()) {
                if ledger.contains(destination.name(), hash).await {
                    result.ledger_skipped += 1;
                    debug!(table = %table_name, hash = %hash, "Row already recorded for destination, skipping");
                    ledger.stage(source.name(), hash).await;
                    continue;
                }
            }

            if matcher::exists(&mut **tx, destination.name(), table, &row).await? {
                skipped += 1;
                debug!(table = %table_name, statement = %render_insert(table, &row), "Row exists, skipping");
            } else {
                if row.has_quote_collision() {
                    warn!(
                        table = %table_name,
                        "Row holds text with both quote characters; logged statement is not literal-safe"
                    );
                }
                codec::bind_row(sqlx::query(&insert), &row)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| {
                        ReplicatorError::apply(destination.name(), table_name, render_insert(table, &row), e)
                    })?;
                inserted += 1;
                debug!(table = %table_name, statement = %render_insert(table, &row), "Row inserted");
            }

            if let (Some(ledger), Some(hash)) = (self.ledger, hash.as_deref()) {
                ledger.stage(destination.name(), hash).await;
                ledger.stage(source.name(), hash).await;
            }
        }

        result.inserted += inserted;
        result.skipped += skipped;
        debug!(table = %table_name, inserted, skipped, "Table replicated");
        Ok(())
    }
}

/// Create `table` at `store` unless it already exists.
async fn ensure_table(store: &Store, table: &dyn Table) -> Result<()> {
    let statement = create_table_statement(table);
    sqlx::query(&statement)
        .execute(store.pool())
        .await
        .map_err(|e| ReplicatorError::apply(store.name(), table.table_name(), &statement, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::introspect;
    use tempfile::{tempdir, TempDir};

    async fn store_with(statements: &[&str]) -> Store {
        let store = Store::open(":memory:").await.unwrap();
        for statement in statements {
            sqlx::query(statement).execute(store.pool()).await.unwrap();
        }
        store
    }

    /// File-backed store named after `name`, so ledger entries of the two
    /// ends of a pair stay apart.
    async fn named_store(dir: &TempDir, name: &str, statements: &[&str]) -> Store {
        let store = Store::open(dir.path().join(name).to_string_lossy())
            .await
            .unwrap();
        for statement in statements {
            sqlx::query(statement).execute(store.pool()).await.unwrap();
        }
        store
    }

    /// Content hash of the first row of the first table of `schema`.
    async fn ledger_hash(schema: &Schema, store: &Store) -> String {
        let table = schema.tables().next().unwrap();
        let fetched = sqlx::query(&codec::select_statement(table))
            .fetch_one(store.pool())
            .await
            .unwrap();
        let row = Row::decode(&fetched, table.column_count()).unwrap();
        content_hash(table, &row)
    }

    async fn users(store: &Store) -> Vec<(i64, String)> {
        sqlx::query_as("SELECT id, name FROM users ORDER BY rowid")
            .fetch_all(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_replicate_into_empty_store() {
        let source = store_with(&[
            "CREATE TABLE users (id INTEGER, name TEXT)",
            "INSERT INTO users VALUES (1, 'alice'), (2, 'bob')",
        ])
        .await;
        let destination = store_with(&[]).await;
        let schema = introspect(&source).await.unwrap();

        let result = ReplicationEngine::new()
            .replicate(&schema, &source, &destination)
            .await
            .unwrap();

        assert_eq!(result.tables, 1);
        assert_eq!(result.inserted, 2);
        assert_eq!(result.skipped, 0);
        assert_eq!(
            users(&destination).await,
            vec![(1, "alice".to_string()), (2, "bob".to_string())]
        );
    }

    #[tokio::test]
    async fn test_second_run_inserts_nothing() {
        let source = store_with(&[
            "CREATE TABLE users (id INTEGER, name TEXT)",
            "INSERT INTO users VALUES (1, 'alice'), (2, 'bob')",
        ])
        .await;
        let destination = store_with(&[]).await;
        let schema = introspect(&source).await.unwrap();
        let engine = ReplicationEngine::new();

        engine.replicate(&schema, &source, &destination).await.unwrap();
        let again = engine.replicate(&schema, &source, &destination).await.unwrap();

        assert_eq!(again.inserted, 0);
        assert_eq!(again.skipped, 2);
        assert!(again.is_noop());
        assert_eq!(again.rows_seen(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_source_rows_collapse() {
        let source = store_with(&[
            "CREATE TABLE users (id INTEGER, name TEXT)",
            "INSERT INTO users VALUES (1, 'alice'), (1, 'alice')",
        ])
        .await;
        let destination = store_with(&[]).await;
        let schema = introspect(&source).await.unwrap();

        let result = ReplicationEngine::new()
            .replicate(&schema, &source, &destination)
            .await
            .unwrap();

        // The second copy sees the first inside the open transaction.
        assert_eq!(result.inserted, 1);
        assert_eq!(result.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_pair() {
        let source = store_with(&[
            "CREATE TABLE a (v INTEGER)",
            "CREATE TABLE b (v INTEGER)",
            "INSERT INTO a VALUES (1), (2)",
            "INSERT INTO b VALUES (10), (-1)",
        ])
        .await;
        let destination = store_with(&["CREATE TABLE b (v INTEGER CHECK (v >= 0))"]).await;
        let schema = introspect(&source).await.unwrap();

        let err = ReplicationEngine::new()
            .replicate(&schema, &source, &destination)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicatorError::Apply { .. }));

        // Table a was created before the transaction; none of its rows landed.
        let a: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM a")
            .fetch_one(destination.pool())
            .await
            .unwrap();
        let b: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM b")
            .fetch_one(destination.pool())
            .await
            .unwrap();
        assert_eq!((a, b), (0, 0));
    }

    #[tokio::test]
    async fn test_ledger_skips_recorded_rows() {
        let dir = tempdir().unwrap();
        let source = named_store(
            &dir,
            "a.db",
            &[
                "CREATE TABLE users (id INTEGER, name TEXT)",
                "INSERT INTO users VALUES (1, 'alice')",
            ],
        )
        .await;
        let destination = named_store(&dir, "b.db", &[]).await;
        let ledger = RowLedger::open(":memory:").await.unwrap();
        let schema = introspect(&source).await.unwrap();
        let engine = ReplicationEngine::new().with_ledger(Some(&ledger));

        let first = engine.replicate(&schema, &source, &destination).await.unwrap();
        assert_eq!(first.inserted, 1);
        // Recorded for both ends of the pair.
        assert_eq!(ledger.len().await, 2);
        let hash = ledger_hash(&schema, &source).await;
        assert!(ledger.contains(source.name(), &hash).await);
        assert!(ledger.contains(destination.name(), &hash).await);

        // Delete at the destination: the ledger still remembers the row.
        sqlx::query("DELETE FROM users")
            .execute(destination.pool())
            .await
            .unwrap();
        let second = engine.replicate(&schema, &source, &destination).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.ledger_skipped, 1);
        assert!(users(&destination).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_pair_discards_ledger_entries() {
        let dir = tempdir().unwrap();
        let source = named_store(
            &dir,
            "a.db",
            &["CREATE TABLE t (v INTEGER)", "INSERT INTO t VALUES (1), (-1)"],
        )
        .await;
        let destination =
            named_store(&dir, "b.db", &["CREATE TABLE t (v INTEGER CHECK (v >= 0))"]).await;
        let ledger = RowLedger::open(":memory:").await.unwrap();
        let schema = introspect(&source).await.unwrap();

        ReplicationEngine::new()
            .with_ledger(Some(&ledger))
            .replicate(&schema, &source, &destination)
            .await
            .unwrap_err();

        assert!(ledger.is_empty().await);
        assert_eq!(ledger.staged_count().await, 0);
    }

    #[tokio::test]
    async fn test_ledger_flush_failure_keeps_committed_rows() {
        let dir = tempdir().unwrap();
        let source = named_store(
            &dir,
            "a.db",
            &[
                "CREATE TABLE users (id INTEGER, name TEXT)",
                "INSERT INTO users VALUES (1, 'alice'), (2, 'bob')",
            ],
        )
        .await;
        let destination = named_store(&dir, "b.db", &[]).await;
        let ledger = RowLedger::open(":memory:").await.unwrap();
        ledger.close().await;
        let schema = introspect(&source).await.unwrap();

        let err = ReplicationEngine::new()
            .with_ledger(Some(&ledger))
            .replicate(&schema, &source, &destination)
            .await
            .unwrap_err();

        match &err {
            ReplicatorError::LedgerFlush {
                destination: name,
                committed,
                source,
            } => {
                assert_eq!(name, destination.name());
                assert_eq!(committed.inserted, 2);
                assert!(matches!(**source, ReplicatorError::Ledger(_)));
            }
            other => panic!("expected ledger flush error, got {:?}", other),
        }
        assert!(err.aborts_run());

        // The commit stands; only the ledger is behind.
        assert_eq!(users(&destination).await.len(), 2);
        assert_eq!(ledger.staged_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_schema_is_noop() {
        let source = store_with(&[]).await;
        let destination = store_with(&[]).await;
        let schema = introspect(&source).await.unwrap();

        let result = ReplicationEngine::new()
            .replicate(&schema, &source, &destination)
            .await
            .unwrap();
        assert_eq!(result, ReplicationResult::default());
    }
}
