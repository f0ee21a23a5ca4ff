//! A shared handle bundling a connection with the statement pipeline.

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::catalog::{self, TableFilter, TableObjects};
use crate::connection::{Connection, SqliteConnection};
use crate::dump::{self, Dump, DumpOptions};
use crate::engine::{CancellationToken, Execution, execute};
use crate::errors::Error;
use crate::output::{PrintOptions, print_statements};
use crate::sql::split;

/// A database connection shared by every execution started from it.
///
/// Clones share the connection. Executions take the connection for their
/// whole batch, so a second execution waits for the first one to finish or
/// be dropped.
#[derive(Debug)]
pub struct Database<C: Connection = SqliteConnection> {
    conn: Arc<Mutex<C>>,
}

impl<C: Connection> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl Database<SqliteConnection> {
    /// Open (or create) the SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self::new(SqliteConnection::open(path)?))
    }

    /// Open a fresh in-memory SQLite database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self::new(SqliteConnection::open_in_memory()?))
    }
}

impl<C: Connection> Database<C> {
    /// Wrap an open connection.
    #[must_use]
    pub fn new(conn: C) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// The shared connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<Mutex<C>> {
        &self.conn
    }

    /// Split `sql` and start executing its statements.
    ///
    /// Cancel through [`Execution::cancellation_token`].
    pub fn execute_statements(&self, sql: &str) -> Result<Execution, Error> {
        self.execute_with_token(sql, CancellationToken::new())
    }

    /// Split `sql` and start executing its statements under `token`.
    pub fn execute_with_token(
        &self,
        sql: &str,
        token: CancellationToken,
    ) -> Result<Execution, Error> {
        execute(&self.conn, split(sql), token)
    }

    /// Execute `sql` and print every result set to `out`.
    pub fn execute_and_print(
        &self,
        sql: &str,
        out: &mut dyn Write,
        options: PrintOptions,
    ) -> Result<(), Error> {
        print_statements(self.execute_statements(sql)?, out, options)
    }

    /// Lazily render the database as a SQL script.
    #[must_use]
    pub fn dump(&self, options: DumpOptions) -> Dump<C> {
        dump::dump(&self.conn, options)
    }

    /// Names of the user tables. See [`catalog::tables`].
    pub fn tables(&self, filter: &TableFilter) -> Result<Vec<String>, Error> {
        catalog::tables(&self.conn, filter)
    }

    /// Definitions attached to `table`. See [`catalog::table_objects`].
    pub fn table_objects(&self, table: &str) -> Result<TableObjects, Error> {
        catalog::table_objects(&self.conn, table)
    }

    /// View definitions. See [`catalog::views`].
    pub fn views(&self) -> Result<Vec<String>, Error> {
        catalog::views(&self.conn)
    }

    /// Index names. See [`catalog::indexes`].
    pub fn indexes(&self, table: Option<&str>) -> Result<Vec<String>, Error> {
        catalog::indexes(&self.conn, table)
    }

    /// Stored definitions. See [`catalog::schema`].
    pub fn schema(
        &self,
        pattern: Option<&str>,
        filter: &TableFilter,
    ) -> Result<Vec<String>, Error> {
        catalog::schema(&self.conn, pattern, filter)
    }
}
