//! Deduplication matcher.
//!
//! A candidate row is a duplicate when the destination table already holds a
//! row equal to it on every non-empty column. The first match ends the scan.
//!
//! A row whose cells are all empty produces no predicate, so the lookup
//! degenerates to "does the table have any row at all". Such a row is treated
//! as a duplicate of whatever the destination holds; it is only inserted into
//! an empty table.

use crate::codec::{quote_identifier, EqualityPredicate, Row};
use crate::error::{ReplicatorError, Result};
use crate::schema::Table;
use sqlx::SqliteConnection;
use tracing::trace;

/// Lookup statement for a predicate.
pub fn lookup_statement(table: &dyn Table, predicate: &EqualityPredicate<'_>) -> String {
    let table_name = quote_identifier(table.table_name());
    if predicate.is_empty() {
        format!("SELECT 1 FROM {} LIMIT 1", table_name)
    } else {
        format!("SELECT 1 FROM {} WHERE {} LIMIT 1", table_name, predicate.sql())
    }
}

/// Check whether `row` already exists in `table` at the destination.
///
/// Runs on the caller's connection; inside a pair this is the destination
/// transaction, so rows inserted earlier in the same pair are visible.
pub async fn exists(
    conn: &mut SqliteConnection,
    store: &str,
    table: &dyn Table,
    row: &Row,
) -> Result<bool> {
    let predicate = EqualityPredicate::build(table.column_names(), row);
    let statement = lookup_statement(table, &predicate);

    let found = predicate
        .bind(sqlx::query(&statement))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            let rendered = if predicate.is_empty() {
                statement.clone()
            } else {
                format!(
                    "SELECT 1 FROM {} WHERE {} LIMIT 1",
                    quote_identifier(table.table_name()),
                    predicate.render()
                )
            };
            ReplicatorError::query(store, table.table_name(), rendered, e)
        })?
        .is_some();

    trace!(
        store = %store,
        table = %table.table_name(),
        terms = predicate.len(),
        found,
        "Lookup"
    );
    Ok(found)
}
