#![doc = include_str!("../README.md")]
#![deny(clippy::mod_module_files)]

pub mod catalog;
pub mod connection;
pub mod database;
pub mod dump;
pub mod engine;
pub mod errors;
pub mod format;
pub mod output;
pub mod sql;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod value;

// Re-export main types
pub use catalog::{TableFilter, TableObjects};
pub use connection::{Connection, Interrupter, RowSink, SqliteConnection};
pub use database::Database;
pub use dump::{Dump, DumpOptions, dump};
pub use engine::{
    CancellationToken, Execution, ResultSet, Row, RowResult, RowStream, StatementResult, execute,
};
pub use format::{FormatMode, format, format_row, needs_escaping, quote_identifier};
pub use output::{
    CsvPrinter, JsonPrinter, OutputMode, PrintOptions, Printer, QueryPlanPrinter, TablePrinter,
    print_error, print_result_set, print_statements,
};
pub use sql::{Splitter, Statement, is_complete, split};
pub use value::Value;

// Re-export errors
pub use errors::Error;
