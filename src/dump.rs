//! Rendering a whole database as a replayable SQL script.
//!
//! The script is produced lazily, one line at a time. Table names and each
//! table's catalog definitions are read before its data query starts, since
//! the connection runs one query at a time; the rows themselves are streamed.
//!
//! Values are written as SQL literals, and a REAL holding a whole number is
//! written without a fraction (`2.0` becomes `2`). Replaying restores it as a
//! REAL only where the column's affinity converts it: in a column declared
//! without a type it comes back as an INTEGER.
//!
//! Tables named with the reserved `sqlite_` prefix are never dumped, whatever
//! the [`TableFilter`], since SQLite rejects their definitions.

use core::iter::FusedIterator;
use core::mem;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::catalog::{TableFilter, table_objects, tables, views};
use crate::connection::Connection;
use crate::engine::{CancellationToken, RowStream, execute};
use crate::errors::Error;
use crate::format::{FormatMode, format_row, quote_identifier};
use crate::sql::Statement;

/// What a dump includes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DumpOptions {
    /// Tables left out of the dump.
    pub filter: TableFilter,
    /// Whether the script is wrapped in `BEGIN TRANSACTION; ... COMMIT;`.
    pub transaction: bool,
    /// Whether view definitions follow the tables.
    pub include_views: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            filter: TableFilter::default(),
            transaction: true,
            include_views: true,
        }
    }
}

impl DumpOptions {
    /// Set the table filter.
    #[must_use]
    pub fn with_filter(mut self, filter: TableFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Enable or disable the transaction envelope.
    #[must_use]
    pub fn with_transaction(mut self, transaction: bool) -> Self {
        self.transaction = transaction;
        self
    }

    /// Enable or disable view definitions.
    #[must_use]
    pub fn with_views(mut self, include_views: bool) -> Self {
        self.include_views = include_views;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Preamble,
    Tables,
    Epilogue,
    Done,
}

/// Lazy iterator over the lines of a dump script.
///
/// Each line is one complete `;`-terminated statement. The first error ends
/// the iteration; the lines produced before it do not form a usable script.
#[derive(Debug)]
pub struct Dump<C: Connection> {
    conn: Arc<Mutex<C>>,
    options: DumpOptions,
    token: CancellationToken,
    stage: Stage,
    tables: std::vec::IntoIter<String>,
    pending: VecDeque<String>,
    rows: Option<RowStream>,
    insert_prefix: String,
    auxiliary: Vec<String>,
}

/// Dump the database behind `conn`.
///
/// Nothing is queried until the first line is requested.
#[must_use]
pub fn dump<C: Connection>(conn: &Arc<Mutex<C>>, options: DumpOptions) -> Dump<C> {
    Dump {
        conn: Arc::clone(conn),
        options,
        token: CancellationToken::new(),
        stage: Stage::Preamble,
        tables: Vec::new().into_iter(),
        pending: VecDeque::new(),
        rows: None,
        insert_prefix: String::new(),
        auxiliary: Vec::new(),
    }
}

impl<C: Connection> Dump<C> {
    /// The token cancelling the data queries of this dump.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Write every line to `out`, each followed by a newline.
    pub fn write_to(self, out: &mut dyn Write) -> Result<(), Error> {
        for line in self {
            writeln!(out, "{}", line?)?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }

            if let Some(rows) = &mut self.rows {
                match rows.next() {
                    Some(row) => {
                        let values = format_row(&row?, FormatMode::SqlLiteral);
                        return Ok(Some(format!("{}{});", self.insert_prefix, values.join(","))));
                    }
                    None => {
                        self.rows = None;
                        self.pending.extend(mem::take(&mut self.auxiliary));
                        continue;
                    }
                }
            }

            match self.stage {
                Stage::Preamble => {
                    self.pending.push_back("PRAGMA foreign_keys=OFF;".to_string());
                    if self.options.transaction {
                        self.pending.push_back("BEGIN TRANSACTION;".to_string());
                    }
                    let mut names = tables(&self.conn, &self.options.filter)?;
                    names.retain(|name| !is_reserved(name));
                    self.tables = names.into_iter();
                    self.stage = Stage::Tables;
                }
                Stage::Tables => match self.tables.next() {
                    Some(table) => self.start_table(&table)?,
                    None => {
                        if self.options.include_views {
                            let definitions = views(&self.conn)?;
                            self.pending
                                .extend(definitions.into_iter().map(|view| format!("{view};")));
                        }
                        self.stage = Stage::Epilogue;
                    }
                },
                Stage::Epilogue => {
                    if self.options.transaction {
                        self.pending.push_back("COMMIT;".to_string());
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => return Ok(None),
            }
        }
    }

    fn start_table(&mut self, table: &str) -> Result<(), Error> {
        tracing::debug!(table, "dumping table");
        let objects = table_objects(&self.conn, table)?;
        if let Some(create) = objects.create {
            self.pending.push_back(format!("{create};"));
        }
        self.auxiliary = objects
            .auxiliary
            .into_iter()
            .map(|definition| format!("{definition};"))
            .collect();

        // Always quoted: keywords such as `order` are valid table names.
        let select = Statement::new(format!("SELECT * FROM \"{}\"", table.replace('"', "\"\"")));
        let mut execution = execute(&self.conn, vec![select], self.token.clone())?;
        if let Some(result_set) = execution.next() {
            self.rows = Some(result_set?.rows);
        }
        self.insert_prefix = format!("INSERT INTO {} VALUES(", quote_identifier(table));
        Ok(())
    }
}

const RESERVED_PREFIX: &str = "sqlite_";

fn is_reserved(table: &str) -> bool {
    table
        .get(..RESERVED_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(RESERVED_PREFIX))
}

impl<C: Connection> Iterator for Dump<C> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stage == Stage::Done && self.pending.is_empty() && self.rows.is_none() {
            return None;
        }
        match self.advance() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "dump aborted");
                self.stage = Stage::Done;
                self.pending.clear();
                self.rows = None;
                Some(Err(err))
            }
        }
    }
}

impl<C: Connection> FusedIterator for Dump<C> {}
