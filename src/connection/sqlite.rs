//! [`Connection`] over a local SQLite database through `rusqlite`.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{ErrorCode, Row};

use super::{Connection, Interrupter, RowSink};
use crate::errors::Error;
use crate::value::Value;

/// A SQLite database connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(rusqlite::Connection::open(path)?.into())
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(rusqlite::Connection::open_in_memory()?.into())
    }

    /// The underlying `rusqlite` connection.
    #[must_use]
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl From<rusqlite::Connection> for SqliteConnection {
    fn from(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
            Error::CancelledByUser
        } else {
            Error::from_backend_message(err.to_string())
        }
    }
}

impl Connection for SqliteConnection {
    fn interrupter(&self) -> Interrupter {
        let handle = self.conn.get_interrupt_handle();
        Interrupter::new(move || handle.interrupt())
    }

    fn query(&mut self, sql: &str, sink: &mut dyn RowSink) -> Result<(), Error> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let decl_types: Vec<Option<String>> = stmt
            .columns()
            .iter()
            .map(|column| column.decl_type().map(str::to_ascii_uppercase))
            .collect();

        let mut rows = stmt.query([])?;
        // The first step runs the statement, so its failure is a rejection.
        let Some(first) = rows.next()?.map(|row| read_row(row, &decl_types)).transpose()? else {
            let _ = sink.begin_result_set(columns);
            return Ok(());
        };
        if sink.begin_result_set(columns).is_break() || sink.push_row(first).is_break() {
            return Ok(());
        }
        while let Some(row) = rows.next()? {
            if sink.push_row(read_row(row, &decl_types)?).is_break() {
                break;
            }
        }
        Ok(())
    }
}

fn read_row(row: &Row<'_>, decl_types: &[Option<String>]) -> rusqlite::Result<Vec<Value>> {
    decl_types
        .iter()
        .enumerate()
        .map(|(idx, decl_type)| Ok(cell(row.get_ref(idx)?, decl_type.as_deref())))
        .collect()
}

/// Map a SQLite cell to a [`Value`], refined by the column's declared type.
///
/// Refinements are restricted to cases that render back to the stored value.
fn cell(value: ValueRef<'_>, decl_type: Option<&str>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v @ (0 | 1)) if matches!(decl_type, Some("BOOLEAN" | "BOOL")) => {
            Value::Bool(v == 1)
        }
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let timestamp = matches!(decl_type, Some("DATETIME" | "TIMESTAMP" | "DATE"))
                .then(|| Value::parse_timestamp(&text))
                .flatten();
            timestamp.map_or_else(|| Value::Text(text.into_owned()), Value::Timestamp)
        }
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
