//! Statement splitting and completeness detection.
//!
//! This module does not parse SQL. It only understands as much of SQLite's
//! lexical structure as is needed to find top-level statement boundaries:
//! - single, double, backtick and bracket quoting
//! - `--` line comments and `/* */` block comments
//! - `CREATE TRIGGER` bodies, whose inner `;` do not end the statement
//!
//! Everything else is handed to the backend verbatim, which reports the real
//! SQL errors.

mod scanner;
mod splitter;

pub use splitter::{Splitter, Statement, is_complete, split};
