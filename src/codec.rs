//! Row codec.
//!
//! Converts fetched SQLite rows into typed [`CellValue`]s, builds the equality
//! predicate used for deduplication, and binds values to statements.
//!
//! # Values and Emptiness
//!
//! A cell is *empty* when it is NULL, an empty string or an empty blob. Empty
//! cells stand for "unknown" and never take part in a match:
//!
//! ```text
//! row:        id=1   name=""   bio=NULL   score=2.5
//! predicate:  "id" = ? AND "score" = ?
//! ```
//!
//! # Literals
//!
//! Statements are always executed with bound parameters. [`encode_literal()`]
//! only renders values for log lines and error context, using the historical
//! quoting policy: text containing `"` is wrapped in `'`, anything else in `"`.
//! Text holding both quote characters has no faithful rendering; see
//! [`has_quote_collision()`].
//!
//! # Row Identity
//!
//! [`content_hash()`] keys on the storage class, so `Text("1")` and
//! `Integer(1)` are different rows to the ledger even where the destination
//! lookup, which compares under column affinity, finds them equal. A ledger
//! miss then falls through to that lookup.

use crate::schema::Table;
use sha2::{Digest, Sha256};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row as _, TypeInfo, ValueRef};

/// A single typed cell, decoded from the storage class SQLite reports.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Whether the value is excluded from equality matching.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Blob(b) => b.is_empty(),
            CellValue::Integer(_) | CellValue::Real(_) => false,
        }
    }

    /// Storage class name, as SQLite's `typeof()` reports it.
    pub fn storage_class(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Integer(_) => "integer",
            CellValue::Real(_) => "real",
            CellValue::Text(_) => "text",
            CellValue::Blob(_) => "blob",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Integer(_) => 1,
            CellValue::Real(_) => 2,
            CellValue::Text(_) => 3,
            CellValue::Blob(_) => 4,
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Real(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(v: Vec<u8>) -> Self {
        CellValue::Blob(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// An ordered row of cells, aligned 1:1 with its table's column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<CellValue>,
}

impl Row {
    pub fn new(values: Vec<CellValue>) -> Self {
        Self { values }
    }

    /// Decode the first `arity` cells of a fetched row.
    ///
    /// Each cell is read according to its runtime storage class, so a column
    /// declared `INTEGER` that holds text comes back as text.
    pub fn decode(row: &SqliteRow, arity: usize) -> Result<Self, sqlx::Error> {
        if row.len() < arity {
            return Err(sqlx::Error::ColumnIndexOutOfBounds {
                index: arity.saturating_sub(1),
                len: row.len(),
            });
        }

        let mut values = Vec::with_capacity(arity);
        for i in 0..arity {
            values.push(decode_cell(row, i)?);
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every cell is empty, so the row has no usable predicate.
    pub fn is_all_empty(&self) -> bool {
        self.values.iter().all(CellValue::is_empty)
    }

    /// Whether any cell would be mis-rendered by [`encode_literal()`].
    pub fn has_quote_collision(&self) -> bool {
        self.values.iter().any(has_quote_collision)
    }
}

impl FromIterator<CellValue> for Row {
    fn from_iter<I: IntoIterator<Item = CellValue>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<CellValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => CellValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => CellValue::Real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => CellValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => CellValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers and literals
// ═══════════════════════════════════════════════════════════════════════════════

/// Quote an identifier for SQLite, doubling embedded `"`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as a statement literal for logs and error context.
pub fn encode_literal(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Integer(v) => v.to_string(),
        CellValue::Real(v) => v.to_string(),
        CellValue::Text(s) if s.contains('"') => format!("'{}'", s),
        CellValue::Text(s) => format!("\"{}\"", s),
        CellValue::Blob(b) => format!("X'{}'", hex::encode_upper(b)),
    }
}

/// Text containing both quote characters cannot be rendered by
/// [`encode_literal()`] without ambiguity.
pub fn has_quote_collision(value: &CellValue) -> bool {
    matches!(value, CellValue::Text(s) if s.contains('"') && s.contains('\''))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statements
// ═══════════════════════════════════════════════════════════════════════════════

fn column_list(table: &dyn Table) -> String {
    table
        .column_names()
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT "c1", "c2" FROM "t"`, columns in introspected order.
pub fn select_statement(table: &dyn Table) -> String {
    format!(
        "SELECT {} FROM {}",
        column_list(table),
        quote_identifier(table.table_name())
    )
}

/// `INSERT INTO "t" ("c1", "c2") VALUES (?, ?)`.
pub fn insert_statement(table: &dyn Table) -> String {
    let placeholders = vec!["?"; table.column_count()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table.table_name()),
        column_list(table),
        placeholders
    )
}

/// The insert for `row` with values rendered as literals.
pub fn render_insert(table: &dyn Table, row: &Row) -> String {
    let literals: Vec<String> = row.values().iter().map(encode_literal).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table.table_name()),
        column_list(table),
        literals.join(", ")
    )
}

/// Bind one cell to a query.
pub fn bind_cell<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q CellValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        CellValue::Null => query.bind(None::<String>),
        CellValue::Integer(v) => query.bind(*v),
        CellValue::Real(v) => query.bind(*v),
        CellValue::Text(s) => query.bind(s.as_str()),
        CellValue::Blob(b) => query.bind(b.as_slice()),
    }
}

/// Bind every cell of a row, in order.
pub fn bind_row<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    row: &'q Row,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    row.values().iter().fold(query, bind_cell)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Equality predicate
// ═══════════════════════════════════════════════════════════════════════════════

/// Conjunction of `column = value` over a row's non-empty cells.
#[derive(Debug, Clone)]
pub struct EqualityPredicate<'r> {
    terms: Vec<(&'r str, &'r CellValue)>,
}

impl<'r> EqualityPredicate<'r> {
    /// Pair `columns` with `row` and drop the empty cells.
    pub fn build(columns: &'r [String], row: &'r Row) -> Self {
        debug_assert_eq!(columns.len(), row.len(), "row arity differs from column count");
        let terms = columns
            .iter()
            .zip(row.values())
            .filter(|(_, value)| !value.is_empty())
            .map(|(column, value)| (column.as_str(), value))
            .collect();
        Self { terms }
    }

    /// `"a" = ? AND "b" = ?`, or an empty string when no cell qualifies.
    pub fn sql(&self) -> String {
        self.terms
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_identifier(column)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// The predicate with literals in place of placeholders.
    pub fn render(&self) -> String {
        self.terms
            .iter()
            .map(|(column, value)| format!("{} = {}", quote_identifier(column), encode_literal(value)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Column names taking part in the match.
    pub fn columns(&self) -> impl Iterator<Item = &'r str> + '_ {
        self.terms.iter().map(|(column, _)| *column)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Bind the predicate's values in the order of [`sql()`](Self::sql).
    pub fn bind<'q>(
        &'q self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>>
    where
        'r: 'q,
    {
        self.terms
            .iter()
            .fold(query, |query, (_, value)| bind_cell(query, *value))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Content hash
// ═══════════════════════════════════════════════════════════════════════════════

fn hash_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// SHA-256 identity of a row's content.
///
/// Covers the table name and each `(column, value)` pair, with pairs sorted by
/// column name so that stores declaring the same columns in a different order
/// agree on the hash. Every field is length-prefixed and values carry their
/// storage class, so `Text("1")` and `Integer(1)` hash differently.
pub fn content_hash(table: &dyn Table, row: &Row) -> String {
    let mut cells: Vec<(&str, &CellValue)> = table
        .column_names()
        .iter()
        .map(String::as_str)
        .zip(row.values())
        .collect();
    cells.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    hash_bytes(&mut hasher, table.table_name().as_bytes());
    hasher.update((cells.len() as u64).to_le_bytes());

    for (column, value) in cells {
        hash_bytes(&mut hasher, column.as_bytes());
        hasher.update([value.tag()]);
        match value {
            CellValue::Null => {}
            CellValue::Integer(v) => hasher.update(v.to_le_bytes()),
            CellValue::Real(v) => hasher.update(v.to_bits().to_le_bytes()),
            CellValue::Text(s) => hash_bytes(&mut hasher, s.as_bytes()),
            CellValue::Blob(b) => hash_bytes(&mut hasher, b),
        }
    }

    hex::encode(hasher.finalize())
}
