//! Streaming execution of statements against a connection.
//!
//! Each [`execute`] call starts one worker thread that owns the connection for
//! the whole batch and hands its output to the caller over rendezvous
//! channels: the worker blocks after producing a result set header or a row
//! until the caller has taken it, so the driver never fetches more than one
//! row ahead of the consumer whatever the size of the result.
//!
//! Statements run strictly in order, and a statement starts only while the
//! caller is waiting on [`Execution::next`]. The first failing statement ends
//! the batch, as does a cancellation through the batch's
//! [`CancellationToken`] or dropping the [`Execution`].

use core::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::connection::{Connection, RowSink};
use crate::errors::Error;
use crate::sql::Statement;
use crate::value::Value;

mod cancel;

pub use cancel::CancellationToken;

/// The values of one row, one per column.
pub type Row = Vec<Value>;

/// A row, or the error that ended its result set.
///
/// An error is always the last item of its [`RowStream`].
pub type RowResult = Result<Row, Error>;

/// A result set, or the error that ended the batch.
pub type StatementResult = Result<ResultSet, Error>;

/// One tabular outcome of a statement.
#[derive(Debug)]
pub struct ResultSet {
    /// Column names, possibly empty for statements without output.
    pub columns: Vec<String>,
    /// The rows, pulled lazily from the worker.
    pub rows: RowStream,
}

/// Rows of one result set, received one at a time.
///
/// Drain or drop the stream before asking the [`Execution`] for the next
/// result: the worker does not move on while a row is waiting to be taken.
/// Dropping it early skips the rest of the statement's output; the next
/// statement waits for the caller to ask for it.
#[derive(Debug)]
pub struct RowStream {
    rows: Receiver<RowResult>,
}

impl Iterator for RowStream {
    type Item = RowResult;

    fn next(&mut self) -> Option<RowResult> {
        self.rows.recv().ok()
    }
}

/// The result sets of a running batch, in statement order.
///
/// Dropping it ends the batch: statements that have not started never run.
#[derive(Debug)]
pub struct Execution {
    results: Receiver<StatementResult>,
    token: CancellationToken,
    demand: Arc<Demand>,
}

impl Execution {
    /// The token cancelling this batch.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this batch; shorthand for `cancellation_token().cancel()`.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Iterator for Execution {
    type Item = StatementResult;

    fn next(&mut self) -> Option<StatementResult> {
        self.demand.request();
        self.results.recv().ok()
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.demand.abandon();
    }
}

/// Tracks whether the caller still waits for output from the worker.
#[derive(Debug, Default)]
struct Demand {
    state: Mutex<DemandState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct DemandState {
    requested: u64,
    delivered: u64,
    abandoned: bool,
}

impl Demand {
    fn request(&self) {
        self.state().requested += 1;
        self.changed.notify_one();
    }

    fn abandon(&self) {
        self.state().abandoned = true;
        self.changed.notify_one();
    }

    fn delivered(&self) {
        self.state().delivered += 1;
    }

    /// Block until the caller asks for a result it has not received yet.
    /// Returns `false` once the [`Execution`] is gone.
    fn wait(&self) -> bool {
        let state = self
            .changed
            .wait_while(self.state(), |state| {
                !state.abandoned && state.requested == state.delivered
            })
            .unwrap_or_else(PoisonError::into_inner);
        !state.abandoned
    }

    fn state(&self) -> MutexGuard<'_, DemandState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run `statements` in order on `conn`, streaming their results.
///
/// The connection stays locked by the worker until the batch ends, so
/// executions on one connection run one after the other. Blank statements
/// are skipped without producing a result. Nothing runs before the first
/// call to [`Execution::next`].
pub fn execute<C: Connection>(
    conn: &Arc<Mutex<C>>,
    statements: Vec<Statement>,
    token: CancellationToken,
) -> Result<Execution, Error> {
    let (results, receiver) = mpsc::sync_channel(0);
    let conn = Arc::clone(conn);
    let worker_token = token.clone();
    let demand = Arc::new(Demand::default());
    let worker_demand = Arc::clone(&demand);
    thread::Builder::new()
        .name("sql-exec".into())
        .spawn(move || {
            let output = Output {
                results: &results,
                demand: &worker_demand,
            };
            run_batch(&conn, &statements, &worker_token, output);
        })
        .map_err(Error::Spawn)?;
    Ok(Execution {
        results: receiver,
        token,
        demand,
    })
}

fn run_batch<C: Connection>(
    conn: &Mutex<C>,
    statements: &[Statement],
    token: &CancellationToken,
    output: Output<'_>,
) {
    let Ok(mut guard) = conn.lock() else {
        output.send(Err(Error::ConnectionPoisoned));
        return;
    };

    for statement in statements.iter().filter(|statement| !statement.is_blank()) {
        if !output.demand.wait() {
            tracing::debug!("execution dropped before `{}`", statement.sql());
            return;
        }
        if token.is_cancelled() {
            tracing::info!("batch cancelled before `{}`", statement.sql());
            output.send(Err(Error::CancelledByUser));
            return;
        }

        tracing::debug!(sql = statement.sql(), "executing statement");
        token.arm(guard.interrupter());
        let mut sink = ChannelSink::new(output, token);
        let outcome = guard.query(statement.sql(), &mut sink);
        token.disarm();

        if !sink.finish(outcome) {
            return;
        }
        tracing::debug!(sql = statement.sql(), "statement finished");
    }
}

/// Why a sink asked the connection to stop.
enum Halt {
    Cancelled,
    /// The caller dropped the [`Execution`].
    Disconnected,
}

/// The worker's end of an [`Execution`].
#[derive(Clone, Copy)]
struct Output<'a> {
    results: &'a SyncSender<StatementResult>,
    demand: &'a Demand,
}

impl Output<'_> {
    /// Hand `result` to the caller; returns whether it was taken.
    fn send(self, result: StatementResult) -> bool {
        if self.results.send(result).is_err() {
            return false;
        }
        self.demand.delivered();
        true
    }
}

/// Forwards a statement's output over the rendezvous channels.
struct ChannelSink<'a> {
    output: Output<'a>,
    rows: Option<SyncSender<RowResult>>,
    token: &'a CancellationToken,
    halt: Option<Halt>,
}

impl<'a> ChannelSink<'a> {
    fn new(output: Output<'a>, token: &'a CancellationToken) -> Self {
        Self {
            output,
            rows: None,
            token,
            halt: None,
        }
    }

    fn halt(&mut self, halt: Halt) -> ControlFlow<()> {
        self.halt = Some(halt);
        ControlFlow::Break(())
    }

    /// Report how the statement ended; returns whether the batch goes on.
    fn finish(mut self, outcome: Result<(), Error>) -> bool {
        let error = match (self.halt.take(), outcome) {
            (Some(Halt::Disconnected), _) => return false,
            (None, Ok(())) => return true,
            (Some(Halt::Cancelled), _) => Error::CancelledByUser,
            // Whatever the backend says after an interrupt, the user asked for it.
            (None, Err(_)) if self.token.is_cancelled() => Error::CancelledByUser,
            (None, Err(err)) => err,
        };

        if error.is_cancelled() {
            tracing::info!("statement cancelled by the user");
        } else {
            tracing::warn!(%error, "statement failed");
        }

        // Close the open row stream with the error, or report it as the
        // statement's result when no stream is open.
        match self.rows.take() {
            Some(rows) => {
                let _ = rows.send(Err(error));
            }
            None => {
                self.output.send(Err(error));
            }
        }
        false
    }
}

impl RowSink for ChannelSink<'_> {
    fn begin_result_set(&mut self, columns: Vec<String>) -> ControlFlow<()> {
        // Dropping the previous sender ends the previous stream.
        self.rows = None;
        if self.token.is_cancelled() {
            return self.halt(Halt::Cancelled);
        }

        tracing::trace!(columns = columns.len(), "result set");
        let (rows, receiver) = mpsc::sync_channel(0);
        let result_set = ResultSet {
            columns,
            rows: RowStream { rows: receiver },
        };
        if !self.output.send(Ok(result_set)) {
            return self.halt(Halt::Disconnected);
        }
        self.rows = Some(rows);
        ControlFlow::Continue(())
    }

    fn push_row(&mut self, row: Row) -> ControlFlow<()> {
        if self.token.is_cancelled() {
            return self.halt(Halt::Cancelled);
        }
        let Some(rows) = &self.rows else {
            return ControlFlow::Break(());
        };
        if rows.send(Ok(row)).is_err() {
            // The caller dropped this stream; skip the rest of the statement.
            self.rows = None;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::split;
    use crate::testing::{Script, ScriptedConnection};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn shared(conn: ScriptedConnection) -> Arc<Mutex<ScriptedConnection>> {
        Arc::new(Mutex::new(conn))
    }

    fn ints(values: &[i64]) -> Vec<Row> {
        values.iter().map(|v| vec![Value::Int(*v)]).collect()
    }

    fn run(conn: &Arc<Mutex<ScriptedConnection>>, sql: &str) -> Execution {
        execute(conn, split(sql), CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_rows_and_columns_stream_in_order() {
        let conn = shared(
            ScriptedConnection::new()
                .with("SELECT a", Script::rows(&["a"], ints(&[1, 2, 3])))
                .with("SELECT b", Script::rows(&["b"], ints(&[4]))),
        );
        let mut execution = run(&conn, "SELECT a; SELECT b;");

        let first = execution.next().unwrap().unwrap();
        assert_eq!(first.columns, vec!["a"]);
        let rows: Vec<Row> = first.rows.map(Result::unwrap).collect();
        assert_eq!(rows, ints(&[1, 2, 3]));

        let second = execution.next().unwrap().unwrap();
        assert_eq!(second.columns, vec!["b"]);
        assert_eq!(second.rows.count(), 1);

        assert!(execution.next().is_none());
    }

    #[test]
    fn test_multiple_result_sets_per_statement() {
        let script = Script::rows(&["x"], ints(&[1])).with_result_set(&["y", "z"], vec![
            vec![Value::Int(2), Value::Text("t".into())],
        ]);
        let conn = shared(ScriptedConnection::new().with("PRAGMA multi", script));
        let mut execution = run(&conn, "PRAGMA multi;");

        let first = execution.next().unwrap().unwrap();
        assert_eq!(first.columns, vec!["x"]);
        assert_eq!(first.rows.count(), 1);
        let second = execution.next().unwrap().unwrap();
        assert_eq!(second.columns, vec!["y", "z"]);
        assert_eq!(second.rows.count(), 1);
        assert!(execution.next().is_none());
    }

    #[test]
    fn test_blank_statements_are_skipped() {
        let scripted = ScriptedConnection::new().with("SELECT a", Script::rows(&["a"], ints(&[1])));
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let statements = vec![Statement::new("   "), Statement::new("SELECT a")];
        let execution = execute(&conn, statements, CancellationToken::new()).unwrap();
        assert_eq!(execution.count(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["SELECT a"]);
    }

    #[test]
    fn test_rejected_statement_aborts_batch() {
        let scripted = ScriptedConnection::new()
            .with("SELECT a", Script::rows(&["a"], ints(&[1])))
            .with("SELEC b", Script::rejected("near \"SELEC\": syntax error"));
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let mut execution = run(&conn, "SELECT a; SELEC b; SELECT a;");

        assert_eq!(execution.next().unwrap().unwrap().rows.count(), 1);
        let err = execution.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Execution(msg) if msg.contains("syntax error")));
        assert!(execution.next().is_none());
        assert_eq!(*log.lock().unwrap(), vec!["SELECT a", "SELEC b"]);
    }

    #[test]
    fn test_transaction_rejection_is_classified() {
        let conn = shared(ScriptedConnection::new().with(
            "BEGIN",
            Script::rejected("interactive transaction not allowed in HTTP queries"),
        ));
        let mut execution = run(&conn, "BEGIN;");
        assert!(matches!(
            execution.next().unwrap(),
            Err(Error::TransactionNotSupported)
        ));
    }

    #[test]
    fn test_mid_stream_failure_is_last_row_and_stops_batch() {
        let scripted = ScriptedConnection::new()
            .with(
                "SELECT a",
                Script::rows(&["a"], ints(&[1, 2])).failing_with("disk I/O error"),
            )
            .with("SELECT b", Script::rows(&["b"], ints(&[3])));
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let mut execution = run(&conn, "SELECT a; SELECT b;");

        let items: Vec<RowResult> = execution.next().unwrap().unwrap().rows.collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(matches!(&items[2], Err(Error::Execution(msg)) if msg == "disk I/O error"));
        assert!(execution.next().is_none());
        assert_eq!(*log.lock().unwrap(), vec!["SELECT a"]);
    }

    #[test]
    fn test_at_most_one_row_in_flight() {
        let values: Vec<i64> = (0..40).collect();
        let scripted =
            ScriptedConnection::new().with("SELECT big", Script::rows(&["n"], ints(&values)));
        let fetched = scripted.fetched_counter();
        let conn = shared(scripted);
        let mut execution = run(&conn, "SELECT big;");

        let result_set = execution.next().unwrap().unwrap();
        let mut received = 0;
        for row in result_set.rows {
            row.unwrap();
            received += 1;
            // Give the worker every chance to run ahead.
            thread::sleep(Duration::from_millis(1));
            let outstanding = fetched.load(Ordering::SeqCst) - received;
            assert!(outstanding <= 1, "{outstanding} rows fetched ahead of the consumer");
        }
        assert_eq!(received, 40);
    }

    #[test]
    fn test_cancellation_mid_stream() {
        let scripted = ScriptedConnection::new()
            .with("SELECT forever", Script::endless(&["n"], ints(&[1, 2, 3])))
            .with("SELECT after", Script::rows(&["a"], ints(&[1])));
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let mut execution = run(&conn, "SELECT forever; SELECT after;");
        let token = execution.cancellation_token().clone();

        let result_set = execution.next().unwrap().unwrap();
        let mut rows = result_set.rows;
        for _ in 0..5 {
            rows.next().unwrap().unwrap();
        }
        token.cancel();
        let rest: Vec<RowResult> = rows.collect();
        assert!(rest.len() <= 2, "at most one row was already in flight");
        assert!(matches!(rest.last(), Some(Err(Error::CancelledByUser))));
        assert!(execution.next().is_none());
        assert_eq!(*log.lock().unwrap(), vec!["SELECT forever"]);
    }

    #[test]
    fn test_cancelled_token_runs_nothing() {
        let scripted = ScriptedConnection::new().with("SELECT a", Script::rows(&["a"], ints(&[1])));
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let token = CancellationToken::new();
        token.cancel();
        let mut execution = execute(&conn, split("SELECT a;"), token).unwrap();
        assert!(matches!(execution.next(), Some(Err(Error::CancelledByUser))));
        assert!(execution.next().is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropping_row_stream_skips_to_next_statement() {
        let values: Vec<i64> = (0..10).collect();
        let conn = shared(
            ScriptedConnection::new()
                .with("SELECT a", Script::rows(&["a"], ints(&values)))
                .with("SELECT b", Script::rows(&["b"], ints(&[7]))),
        );
        let mut execution = run(&conn, "SELECT a; SELECT b;");

        let mut first = execution.next().unwrap().unwrap();
        first.rows.next().unwrap().unwrap();
        drop(first);

        let second = execution.next().unwrap().unwrap();
        assert_eq!(second.columns, vec!["b"]);
        let rows: Vec<Row> = second.rows.map(Result::unwrap).collect();
        assert_eq!(rows, ints(&[7]));
    }

    #[test]
    fn test_dropped_execution_runs_no_further_statement() {
        let scripted = ScriptedConnection::new()
            .with("SELECT a", Script::rows(&["a"], ints(&[1, 2, 3])))
            .with("DROP TABLE important", Script::empty());
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let mut execution = run(&conn, "SELECT a; DROP TABLE important;");

        let mut first = execution.next().unwrap().unwrap();
        first.rows.next().unwrap().unwrap();
        drop(first);
        drop(execution);

        // The worker holds the connection until its batch is over.
        drop(conn.lock().unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["SELECT a"]);
    }

    #[test]
    fn test_nothing_runs_before_the_first_request() {
        let scripted = ScriptedConnection::new().with("SELECT a", Script::rows(&["a"], ints(&[1])));
        let log = scripted.executed_log();
        let conn = shared(scripted);
        let execution = run(&conn, "SELECT a;");
        thread::sleep(Duration::from_millis(20));
        assert!(log.lock().unwrap().is_empty());
        drop(execution);
        drop(conn.lock().unwrap());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_executions_on_one_connection_are_serialized() {
        let conn = shared(
            ScriptedConnection::new().with("SELECT a", Script::rows(&["a"], ints(&[1, 2]))),
        );
        for _ in 0..3 {
            let total: usize = run(&conn, "SELECT a;")
                .map(|result| result.unwrap().rows.count())
                .sum();
            assert_eq!(total, 2);
        }
    }
}
