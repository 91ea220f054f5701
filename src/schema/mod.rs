// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema introspection.
//!
//! A [`Schema`] is an immutable snapshot of one store's tables, captured once
//! per source per pass. Tables and columns are exposed through the [`Table`] and
//! [`Column`] capability traits so that the replication engine and the
//! deduplication matcher never name a concrete backend type. The backend is
//! selected once, from the store's driver, in [`introspect()`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> simple_replicator::Result<()> {
//! use simple_replicator::{schema, store::Store};
//!
//! let store = Store::open("edge-a.db").await?;
//! let schema = schema::introspect(&store).await?;
//!
//! for table in schema.tables() {
//!     println!("{} {:?}", table.table_name(), table.column_names());
//! }
//! # Ok(())
//! # }
//! ```

pub mod sqlite;

pub use sqlite::{SqliteColumn, SqliteTable};

use crate::codec::quote_identifier;
use crate::config::Driver;
use crate::error::Result;
use crate::metrics;
use crate::store::Store;
use std::fmt;
use tracing::{debug, info};

/// Column metadata needed by the core.
///
/// Only [`name()`](Column::name) and the ordinal position are used for
/// matching and inserting; the rest is carried so that destination tables can
/// be created with the declared types.
pub trait Column: fmt::Debug + Send + Sync {
    /// Column name, unique within its table.
    fn name(&self) -> &str;

    /// Ordinal position reported by the catalog.
    fn ordinal(&self) -> i64;

    /// Declared type (may be empty).
    fn declared_type(&self) -> &str;

    /// Declared default value expression, if any.
    fn default_value(&self) -> Option<&str>;

    /// Whether the column is part of the primary key.
    fn is_primary_key(&self) -> bool;
}

/// Table metadata needed by the core.
///
/// Column order is significant: it is the order used when reading source rows
/// and when naming columns in inserts.
pub trait Table: fmt::Debug + Send + Sync {
    /// Table name.
    fn table_name(&self) -> &str;

    /// Columns in catalog ordinal order.
    fn columns(&self) -> Vec<&dyn Column>;

    /// Column names in catalog ordinal order.
    fn column_names(&self) -> &[String];

    /// Number of columns.
    fn column_count(&self) -> usize {
        self.column_names().len()
    }
}

/// Build the additive `CREATE TABLE IF NOT EXISTS` statement for a table.
///
/// Carries column names and declared types only; constraints and defaults of
/// the source are not reproduced.
pub fn create_table_statement(table: &dyn Table) -> String {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| {
            let declared = c.declared_type().trim();
            if declared.is_empty() {
                quote_identifier(c.name())
            } else {
                format!("{} {}", quote_identifier(c.name()), declared)
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table.table_name()),
        columns.join(", ")
    )
}

/// Immutable snapshot of a store's tables.
pub struct Schema {
    /// Store the snapshot was taken from.
    store: String,
    /// Tables in catalog order.
    tables: Vec<Box<dyn Table>>,
}

impl Schema {
    /// Build a schema snapshot.
    pub fn new(store: impl Into<String>, tables: Vec<Box<dyn Table>>) -> Self {
        Self {
            store: store.into(),
            tables,
        }
    }

    /// Name of the store this snapshot describes.
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Tables in catalog order.
    pub fn tables(&self) -> impl Iterator<Item = &dyn Table> + '_ {
        self.tables.iter().map(|t| t.as_ref())
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&dyn Table> {
        self.tables().find(|t| t.table_name() == name)
    }

    /// Table names in catalog order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables().map(|t| t.table_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("store", &self.store)
            .field("tables", &self.table_names())
            .finish()
    }
}

/// Introspect a store's catalog.
///
/// Lists tables first, then resolves each table's columns (column
/// introspection is a table-scoped query). Fails with a catalog error when
/// either step cannot be read.
pub async fn introspect(store: &Store) -> Result<Schema> {
    debug!(store = %store.name(), "Retrieving tables");

    let tables = match store.driver() {
        Driver::Sqlite => sqlite::introspect_tables(store).await?,
    };

    let schema = Schema::new(store.name(), tables);
    metrics::record_schema_fetch(store.name(), schema.len());
    info!(
        store = %store.name(),
        tables = schema.len(),
        names = ?schema.table_names(),
        "Tables retrieved"
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> SqliteTable {
        SqliteTable::for_testing(
            "users",
            vec![
                SqliteColumn::for_testing(0, "id", "INTEGER", true),
                SqliteColumn::for_testing(1, "name", "", false),
            ],
        )
    }

    #[test]
    fn test_create_table_statement() {
        let table = users();
        assert_eq!(
            create_table_statement(&table),
            r#"CREATE TABLE IF NOT EXISTS "users" ("id" INTEGER, "name")"#
        );
    }

    #[test]
    fn test_create_table_statement_quotes_identifiers() {
        let table = SqliteTable::for_testing(
            "odd \"name\"",
            vec![SqliteColumn::for_testing(0, "select", "TEXT", false)],
        );
        assert_eq!(
            create_table_statement(&table),
            r#"CREATE TABLE IF NOT EXISTS "odd ""name""" ("select" TEXT)"#
        );
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new("a.db", vec![Box::new(users())]);
        assert_eq!(schema.store(), "a.db");
        assert_eq!(schema.len(), 1);
        assert!(!schema.is_empty());
        assert_eq!(schema.table_names(), vec!["users"]);
        assert!(schema.table("users").is_some());
        assert!(schema.table("orders").is_none());
    }

    #[test]
    fn test_schema_debug_lists_tables() {
        let schema = Schema::new("a.db", vec![Box::new(users())]);
        let debug = format!("{:?}", schema);
        assert!(debug.contains("a.db"));
        assert!(debug.contains("users"));
    }

    #[test]
    fn test_empty_schema() {
        let schema = Schema::new("a.db", Vec::new());
        assert!(schema.is_empty());
        assert_eq!(schema.tables().count(), 0);
    }
}
