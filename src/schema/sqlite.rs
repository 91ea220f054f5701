//! SQLite catalog backend.
//!
//! Tables come from `sqlite_master`; columns come from `pragma_table_info`,
//! ordered by `cid`. SQLite's own bookkeeping tables (`sqlite_sequence`,
//! `sqlite_stat1`, ...) are skipped: they cannot be created by name at a
//! destination.

use super::{Column, Table};
use crate::error::{ReplicatorError, Result};
use crate::store::Store;
use sqlx::Row;
use tracing::{debug, warn};

const TABLES_QUERY: &str = r#"
    SELECT type, name, tbl_name, rootpage, sql
    FROM sqlite_master
    WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT cid, name, type, dflt_value, pk
    FROM pragma_table_info(?)
    ORDER BY cid
"#;

/// A column as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteColumn {
    pub cid: i64,
    pub name: String,
    pub declared_type: String,
    pub default_value: Option<String>,
    /// 1-based position within the primary key, 0 if not part of it.
    pub primary_key: i64,
}

impl SqliteColumn {
    /// Create a column for testing.
    pub fn for_testing(cid: i64, name: &str, declared_type: &str, primary_key: bool) -> Self {
        Self {
            cid,
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            default_value: None,
            primary_key: i64::from(primary_key),
        }
    }
}

impl Column for SqliteColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i64 {
        self.cid
    }

    fn declared_type(&self) -> &str {
        &self.declared_type
    }

    fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    fn is_primary_key(&self) -> bool {
        self.primary_key > 0
    }
}

/// A table as reported by `sqlite_master`, with its resolved columns.
#[derive(Debug, Clone)]
pub struct SqliteTable {
    pub kind: String,
    pub name: String,
    pub table_name: String,
    pub root_page: i64,
    pub sql: Option<String>,
    columns: Vec<SqliteColumn>,
    column_names: Vec<String>,
}

impl SqliteTable {
    fn new(kind: String, name: String, table_name: String, root_page: i64, sql: Option<String>) -> Self {
        Self {
            kind,
            name,
            table_name,
            root_page,
            sql,
            columns: Vec::new(),
            column_names: Vec::new(),
        }
    }

    /// Create a table for testing.
    pub fn for_testing(name: &str, columns: Vec<SqliteColumn>) -> Self {
        let mut table = Self::new("table".into(), name.into(), name.into(), 0, None);
        table.set_columns(columns);
        table
    }

    /// Replace the column list, keeping the cached names in step.
    fn set_columns(&mut self, mut columns: Vec<SqliteColumn>) {
        columns.sort_by_key(|c| c.cid);
        self.column_names = columns.iter().map(|c| c.name.clone()).collect();
        self.columns = columns;
    }
}

impl Table for SqliteTable {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn columns(&self) -> Vec<&dyn Column> {
        self.columns.iter().map(|c| c as &dyn Column).collect()
    }

    fn column_names(&self) -> &[String] {
        &self.column_names
    }
}

/// List the store's tables and resolve each table's columns.
pub(crate) async fn introspect_tables(store: &Store) -> Result<Vec<Box<dyn Table>>> {
    let rows = sqlx::query(TABLES_QUERY)
        .fetch_all(store.pool())
        .await
        .map_err(|e| ReplicatorError::catalog(store.name(), e))?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        let scanned = (|| -> std::result::Result<SqliteTable, sqlx::Error> {
            Ok(SqliteTable::new(
                row.try_get("type")?,
                row.try_get("name")?,
                row.try_get("tbl_name")?,
                row.try_get("rootpage")?,
                row.try_get("sql")?,
            ))
        })();

        match scanned {
            Ok(table) => tables.push(table),
            Err(e) => {
                warn!(store = %store.name(), error = %e, "Unable to scan catalog row, skipping");
            }
        }
    }

    let mut resolved: Vec<Box<dyn Table>> = Vec::with_capacity(tables.len());
    for mut table in tables {
        let columns = introspect_columns(store, &table.table_name).await?;
        if columns.is_empty() {
            return Err(ReplicatorError::catalog_msg(
                store.name(),
                format!("table `{}` reported no columns", table.table_name),
            ));
        }
        debug!(
            store = %store.name(),
            table = %table.table_name,
            columns = ?columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Columns retrieved"
        );
        table.set_columns(columns);
        resolved.push(Box::new(table));
    }

    Ok(resolved)
}

async fn introspect_columns(store: &Store, table_name: &str) -> Result<Vec<SqliteColumn>> {
    let rows = sqlx::query(COLUMNS_QUERY)
        .bind(table_name)
        .fetch_all(store.pool())
        .await
        .map_err(|e| ReplicatorError::catalog(store.name(), e))?;

    rows.iter()
        .map(|row| {
            Ok(SqliteColumn {
                cid: row.try_get("cid")?,
                name: row.try_get("name")?,
                declared_type: row.try_get("type")?,
                default_value: row.try_get("dflt_value")?,
                primary_key: row.try_get("pk")?,
            })
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
        .map_err(|e| ReplicatorError::catalog(store.name(), e))
}
