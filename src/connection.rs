//! What the engine needs from a database connection.
//!
//! A [`Connection`] runs one statement at a time and pushes what it produces
//! into a [`RowSink`]: first the column names of a result set, then its rows,
//! one by one, then possibly further result sets. The sink decides whether the
//! connection keeps going, which is how backpressure and cancellation reach
//! the driver without it knowing about threads or channels.

use core::fmt;
use core::ops::ControlFlow;
use std::sync::Arc;

use crate::errors::Error;
use crate::value::Value;

mod sqlite;

pub use sqlite::SqliteConnection;

/// Handle that aborts the statement running on the connection it came from.
///
/// Safe to call from any thread, at any time, including when nothing runs.
#[derive(Clone)]
pub struct Interrupter(Arc<dyn Fn() + Send + Sync>);

impl Interrupter {
    /// Wrap a backend-specific interrupt function.
    #[must_use]
    pub fn new(interrupt: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(interrupt))
    }

    /// Ask the backend to abort the running statement.
    pub fn interrupt(&self) {
        (self.0)();
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupter").finish_non_exhaustive()
    }
}

/// Receiver for the result sets of one statement.
pub trait RowSink {
    /// A new result set starts; `columns` may be empty for statements without output.
    fn begin_result_set(&mut self, columns: Vec<String>) -> ControlFlow<()>;

    /// One row of the current result set, in backend order.
    fn push_row(&mut self, row: Vec<Value>) -> ControlFlow<()>;
}

/// A database connection the engine can drive.
pub trait Connection: Send + 'static {
    /// A handle able to abort this connection's running statement.
    fn interrupter(&self) -> Interrupter;

    /// Run `sql`, announcing each result set and pushing its rows into `sink`.
    ///
    /// Implementations stop fetching as soon as the sink returns
    /// [`ControlFlow::Break`], and fetch a row only after the previous one has
    /// been pushed. An error returned before the first
    /// [`RowSink::begin_result_set`] call means the statement was rejected;
    /// after it, the error ends the current result set.
    fn query(&mut self, sql: &str, sink: &mut dyn RowSink) -> Result<(), Error>;
}
