//! Queries against the `sqlite_schema` catalog.
//!
//! Catalog queries go through the same engine as user statements, so they
//! wait for any running batch on the connection. Every failure is reported as
//! [`Error::CatalogLookup`].

use std::sync::{Arc, Mutex};

use crate::connection::Connection;
use crate::engine::{CancellationToken, Row, execute};
use crate::errors::Error;
use crate::format::{FormatMode, format};
use crate::sql::Statement;
use crate::value::Value;

/// Selects which tables are internal and hidden from listings and dumps.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TableFilter {
    /// Names starting with one of these prefixes are excluded.
    pub excluded_prefixes: Vec<String>,
    /// Names equal to one of these are excluded.
    pub excluded_names: Vec<String>,
}

impl Default for TableFilter {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec!["sqlite_".to_string()],
            excluded_names: ["_litestream_seq", "_litestream_lock", "libsql_wasm_func_table"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl TableFilter {
    /// A filter that excludes nothing.
    ///
    /// Dumps still leave out `sqlite_` tables, which SQLite refuses to create.
    #[must_use]
    pub fn none() -> Self {
        Self {
            excluded_prefixes: Vec::new(),
            excluded_names: Vec::new(),
        }
    }

    /// Also exclude names starting with `prefix`.
    #[must_use]
    pub fn with_excluded_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    /// Also exclude the name `name`.
    #[must_use]
    pub fn with_excluded_name(mut self, name: impl Into<String>) -> Self {
        self.excluded_names.push(name.into());
        self
    }

    /// Whether `name` passes the filter.
    #[must_use]
    pub fn includes(&self, name: &str) -> bool {
        !self.excluded_names.iter().any(|excluded| excluded == name)
            && !self
                .excluded_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// The catalog definitions attached to one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableObjects {
    /// The `CREATE TABLE` statement, verbatim and without `;`.
    pub create: Option<String>,
    /// Indexes and triggers on the table, in creation order.
    pub auxiliary: Vec<String>,
}

/// Run one catalog query and collect all its rows.
fn catalog_rows<C: Connection>(conn: &Arc<Mutex<C>>, sql: String) -> Result<Vec<Row>, Error> {
    tracing::trace!(sql = sql.as_str(), "catalog query");
    collect_rows(conn, sql).map_err(Error::into_catalog)
}

fn collect_rows<C: Connection>(conn: &Arc<Mutex<C>>, sql: String) -> Result<Vec<Row>, Error> {
    let execution = execute(conn, vec![Statement::new(sql)], CancellationToken::new())?;
    let mut rows = Vec::new();
    for result_set in execution {
        for row in result_set?.rows {
            rows.push(row?);
        }
    }
    Ok(rows)
}

/// The text of a catalog cell, or `None` for NULL.
fn text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(text) => Some(text),
        other => Some(format(&other, FormatMode::Table)),
    }
}

fn literal(text: &str) -> String {
    format(&Value::Text(text.to_string()), FormatMode::SqlLiteral)
}

/// The first column of each row, NULLs skipped.
fn first_column(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| row.into_iter().next().and_then(text))
        .collect()
}

/// Names of the user tables, ordered by name.
pub fn tables<C: Connection>(
    conn: &Arc<Mutex<C>>,
    filter: &TableFilter,
) -> Result<Vec<String>, Error> {
    let rows = catalog_rows(
        conn,
        "SELECT name FROM sqlite_schema WHERE type = 'table' ORDER BY name".to_string(),
    )?;
    Ok(first_column(rows)
        .into_iter()
        .filter(|name| filter.includes(name))
        .collect())
}

/// The `CREATE` statements stored for `table`.
pub fn table_objects<C: Connection>(
    conn: &Arc<Mutex<C>>,
    table: &str,
) -> Result<TableObjects, Error> {
    let rows = catalog_rows(
        conn,
        format!(
            "SELECT type, sql FROM sqlite_schema WHERE tbl_name = {} AND sql IS NOT NULL ORDER BY rowid",
            literal(table)
        ),
    )?;
    let mut objects = TableObjects::default();
    for row in rows {
        let mut cells = row.into_iter().map(text);
        let (Some(kind), Some(sql)) = (cells.next().flatten(), cells.next().flatten()) else {
            continue;
        };
        if kind == "table" && objects.create.is_none() {
            objects.create = Some(sql);
        } else {
            objects.auxiliary.push(sql);
        }
    }
    Ok(objects)
}

/// `CREATE VIEW` statements, ordered by view name.
pub fn views<C: Connection>(conn: &Arc<Mutex<C>>) -> Result<Vec<String>, Error> {
    let rows = catalog_rows(
        conn,
        "SELECT sql FROM sqlite_schema WHERE type = 'view' AND sql IS NOT NULL ORDER BY name"
            .to_string(),
    )?;
    Ok(first_column(rows))
}

/// Names of the indexes, optionally only of tables matching the `LIKE` pattern `table`.
pub fn indexes<C: Connection>(
    conn: &Arc<Mutex<C>>,
    table: Option<&str>,
) -> Result<Vec<String>, Error> {
    let mut sql = "SELECT name FROM sqlite_schema WHERE type = 'index'".to_string();
    if let Some(table) = table {
        sql.push_str(" AND tbl_name LIKE ");
        sql.push_str(&literal(table));
    }
    sql.push_str(" ORDER BY name");
    Ok(first_column(catalog_rows(conn, sql)?))
}

/// Every stored definition, `;`-terminated, optionally only of objects whose
/// name matches the `LIKE` pattern `pattern`.
pub fn schema<C: Connection>(
    conn: &Arc<Mutex<C>>,
    pattern: Option<&str>,
    filter: &TableFilter,
) -> Result<Vec<String>, Error> {
    let mut sql = "SELECT name, sql FROM sqlite_schema WHERE sql IS NOT NULL".to_string();
    if let Some(pattern) = pattern {
        sql.push_str(" AND name LIKE ");
        sql.push_str(&literal(pattern));
    }
    sql.push_str(" ORDER BY name");

    let mut definitions = Vec::new();
    for row in catalog_rows(conn, sql)? {
        let mut cells = row.into_iter().map(text);
        let (Some(name), Some(definition)) = (cells.next().flatten(), cells.next().flatten())
        else {
            continue;
        };
        if filter.includes(&name) {
            definitions.push(format!("{definition};"));
        }
    }
    Ok(definitions)
}
