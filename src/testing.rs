//! Scripted connection for exercising the engine without a database.
//!
//! This module is gated behind the `testing` feature.
//!
//! A [`ScriptedConnection`] answers each SQL text with a [`Script`] registered
//! up front, and records what it was asked to run and how many rows it
//! fetched, so tests can observe the engine's ordering, fail-fast and
//! backpressure behaviour from the driver side.
//!
//! [`check_split`] holds the splitter properties shared by the `split` fuzz
//! harness and its regression tests.

use core::ops::ControlFlow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::connection::{Connection, Interrupter, RowSink};
use crate::errors::Error;
use crate::sql::{Statement, is_complete, split};
use crate::value::Value;

/// The scripted answer to one SQL text.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Result sets produced in order, as column names and rows.
    pub result_sets: Vec<(Vec<String>, Vec<Vec<Value>>)>,
    /// Reject the statement with this backend message before any output.
    pub reject: Option<String>,
    /// Fail with this message after the last row of the last result set.
    pub fail_with: Option<String>,
    /// Repeat the rows of each result set until stopped or interrupted.
    pub endless: bool,
}

fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(ToString::to_string).collect()
}

impl Script {
    /// A statement producing a single result set.
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self::default().with_result_set(columns, rows)
    }

    /// A statement producing one empty result set without columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::rows(&[], Vec::new())
    }

    /// A statement the backend rejects with `message`.
    #[must_use]
    pub fn rejected(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// A statement cycling through `rows` forever.
    #[must_use]
    pub fn endless(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            endless: true,
            ..Self::rows(columns, rows)
        }
    }

    /// Append another result set.
    #[must_use]
    pub fn with_result_set(mut self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.result_sets.push((names(columns), rows));
        self
    }

    /// Fail with `message` once all rows are out.
    #[must_use]
    pub fn failing_with(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }
}

/// In-memory [`Connection`] replaying [`Script`]s.
///
/// SQL without a registered script produces a single empty result set, like
/// a DDL statement would.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    scripts: HashMap<String, Script>,
    executed: Arc<Mutex<Vec<String>>>,
    fetched: Arc<AtomicUsize>,
    interrupted: Arc<AtomicBool>,
}

impl ScriptedConnection {
    /// Create a connection without scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the answer to `sql`.
    #[must_use]
    pub fn with(mut self, sql: &str, script: Script) -> Self {
        self.scripts.insert(sql.to_string(), script);
        self
    }

    /// Shared log of the SQL texts run so far, in order.
    #[must_use]
    pub fn executed_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }

    /// Shared count of rows fetched so far, across all statements.
    #[must_use]
    pub fn fetched_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetched)
    }
}

impl Connection for ScriptedConnection {
    fn interrupter(&self) -> Interrupter {
        let interrupted = Arc::clone(&self.interrupted);
        Interrupter::new(move || interrupted.store(true, Ordering::SeqCst))
    }

    fn query(&mut self, sql: &str, sink: &mut dyn RowSink) -> Result<(), Error> {
        // Like SQLite, a pending interrupt does not outlive the statements it targeted.
        self.interrupted.store(false, Ordering::SeqCst);
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());

        let script = self.scripts.get(sql).cloned().unwrap_or_else(Script::empty);
        if let Some(message) = script.reject {
            return Err(Error::from_backend_message(message));
        }

        for (columns, rows) in script.result_sets {
            if sink.begin_result_set(columns).is_break() {
                return Ok(());
            }
            let rows: Box<dyn Iterator<Item = Vec<Value>>> = if script.endless {
                Box::new(rows.into_iter().cycle())
            } else {
                Box::new(rows.into_iter())
            };
            for row in rows {
                if self.interrupted.load(Ordering::SeqCst) {
                    return Err(Error::from_backend_message("interrupted"));
                }
                self.fetched.fetch_add(1, Ordering::SeqCst);
                if let ControlFlow::Break(()) = sink.push_row(row) {
                    return Ok(());
                }
            }
        }

        match script.fail_with {
            Some(message) => Err(Error::from_backend_message(message)),
            None => Ok(()),
        }
    }
}

/// Assert the splitter's properties on arbitrary text.
///
/// # Panics
///
/// Panics if a statement is empty, its span does not point into `text`, an
/// inner statement is unterminated, or rejoining the statements with `;`
/// splits into a different number of statements.
pub fn check_split(text: &str) {
    let statements = split(text);
    let _ = is_complete(text);

    for (idx, statement) in statements.iter().enumerate() {
        assert!(!statement.sql().is_empty(), "empty statement from {text:?}");
        assert!(text.get(statement.span()).is_some(), "span out of {text:?}");
        if idx + 1 < statements.len() {
            assert!(statement.is_terminated(), "unterminated inner statement in {text:?}");
        }
    }

    let rejoined = statements
        .iter()
        .map(Statement::sql)
        .collect::<Vec<_>>()
        .join(";");
    assert_eq!(
        split(&rejoined).len(),
        statements.len(),
        "rejoining {text:?} as {rejoined:?} changed the statement count"
    );
}
