//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - File-backed SQLite stores in a temporary directory
//! - Statement helpers for seeding tables
//! - Row readers that decode through the crate's own codec

#![allow(dead_code)]

use simple_replicator::{CellValue, ReplicatorConfig, Row, Store, StoreConfig};
use sqlx::Row as _;
use tempfile::TempDir;

/// A set of stores living in one temporary directory.
pub struct TestStores {
    /// Kept alive for the stores' lifetime.
    pub dir: TempDir,
    pub stores: Vec<Store>,
}

impl TestStores {
    /// Open `names` as SQLite files in a fresh temporary directory.
    pub async fn open(names: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut stores = Vec::new();
        for name in names {
            let path = dir.path().join(name);
            stores.push(Store::open(path.to_string_lossy()).await.unwrap());
        }
        Self { dir, stores }
    }

    pub fn get(&self, index: usize) -> &Store {
        &self.stores[index]
    }

    /// Config naming every store, in order.
    pub fn config(&self) -> ReplicatorConfig {
        ReplicatorConfig {
            databases: self
                .stores
                .iter()
                .map(|s| StoreConfig::for_testing(s.name()))
                .collect(),
            ..Default::default()
        }
    }

    /// Path for an auxiliary file (e.g. a ledger) in the same directory.
    pub fn path(&self, file: &str) -> String {
        self.dir.path().join(file).to_string_lossy().to_string()
    }

    pub async fn close(&self) {
        for store in &self.stores {
            store.close().await;
        }
    }
}

/// Run each statement against `store`.
pub async fn exec(store: &Store, statements: &[&str]) {
    for statement in statements {
        sqlx::query(statement)
            .execute(store.pool())
            .await
            .unwrap_or_else(|e| panic!("`{}` failed: {}", statement, e));
    }
}

/// Create `users(id INTEGER, name TEXT)` holding `rows`.
pub async fn users_table(store: &Store, rows: &[(i64, &str)]) {
    exec(store, &["CREATE TABLE users (id INTEGER, name TEXT)"]).await;
    for (id, name) in rows {
        sqlx::query("INSERT INTO users (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(store.pool())
            .await
            .unwrap();
    }
}

/// `users` rows in insertion order.
pub async fn users(store: &Store) -> Vec<(i64, String)> {
    sqlx::query_as("SELECT id, name FROM users ORDER BY rowid")
        .fetch_all(store.pool())
        .await
        .unwrap()
}

/// `users` rows sorted, for set comparisons.
pub async fn users_sorted(store: &Store) -> Vec<(i64, String)> {
    let mut rows = users(store).await;
    rows.sort();
    rows
}

/// Every row of `table` as typed cells, in insertion order.
pub async fn rows(store: &Store, table: &str) -> Vec<Vec<CellValue>> {
    let statement = format!("SELECT * FROM \"{}\" ORDER BY rowid", table);
    sqlx::query(&statement)
        .fetch_all(store.pool())
        .await
        .unwrap()
        .iter()
        .map(|r| Row::decode(r, r.len()).unwrap().values().to_vec())
        .collect()
}

pub async fn count(store: &Store, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(store.pool())
        .await
        .unwrap()
}

pub async fn table_exists(store: &Store, table: &str) -> bool {
    let found: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(store.pool())
            .await
            .unwrap();
    found.is_some()
}
