//! Rendering of result sets as aligned tables, CSV or JSON.
//!
//! Every printer consumes one [`ResultSet`] and formats its cells through
//! [`format_row`](crate::format::format_row), so the textual form of a value
//! is the same whatever the output encoding.

use core::fmt::{self, Display};
use core::str::FromStr;
use std::io::Write;

use serde_json::{Map, Value as JsonValue};

use crate::engine::{ResultSet, StatementResult};
use crate::errors::Error;
use crate::format::{FormatMode, format_row};

mod explain;

pub use explain::QueryPlanPrinter;

/// Spacing between two columns of a [`TablePrinter`] table.
const COLUMN_PADDING: &str = "     ";

/// The user-selectable output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OutputMode {
    /// Aligned columns under an upper-cased header.
    #[default]
    Table,
    /// Comma-separated values.
    Csv,
    /// A JSON array of objects.
    Json,
}

impl OutputMode {
    /// The mode's name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Table => "table",
            OutputMode::Csv => "csv",
            OutputMode::Json => "json",
        }
    }
}

impl Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(OutputMode::Table),
            "csv" => Ok(OutputMode::Csv),
            "json" => Ok(OutputMode::Json),
            other => Err(Error::InvalidOutputMode(other.to_string())),
        }
    }
}

/// How result sets are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PrintOptions {
    /// The output encoding.
    pub mode: OutputMode,
    /// Whether table and CSV output start with the column names.
    pub with_header: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            mode: OutputMode::Table,
            with_header: true,
        }
    }
}

impl PrintOptions {
    /// Set the output encoding.
    #[must_use]
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the header line.
    #[must_use]
    pub fn with_header(mut self, with_header: bool) -> Self {
        self.with_header = with_header;
        self
    }
}

/// Renders a whole result set to a writer.
pub trait Printer {
    /// Drain `result_set` into `out`, stopping at the first row error.
    fn print(&mut self, result_set: ResultSet, out: &mut dyn Write) -> Result<(), Error>;
}

/// Left-aligned columns separated by spaces, without borders.
///
/// Column widths depend on every cell, so the result set is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePrinter {
    /// Whether the upper-cased column names are printed first.
    pub with_header: bool,
}

impl Printer for TablePrinter {
    fn print(&mut self, result_set: ResultSet, out: &mut dyn Write) -> Result<(), Error> {
        let mut lines: Vec<Vec<String>> = Vec::new();
        if self.with_header {
            lines.push(
                result_set
                    .columns
                    .iter()
                    .map(|name| name.to_uppercase())
                    .collect(),
            );
        }
        for row in result_set.rows {
            lines.push(format_row(&row?, FormatMode::Table));
        }

        let columns = lines.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0; columns];
        for line in &lines {
            for (width, cell) in widths.iter_mut().zip(line) {
                *width = (*width).max(cell.chars().count());
            }
        }

        for line in &lines {
            let mut rendered = String::new();
            for (idx, (cell, width)) in line.iter().zip(&widths).enumerate() {
                if idx > 0 {
                    rendered.push_str(COLUMN_PADDING);
                }
                rendered.push_str(cell);
                let fill = width - cell.chars().count();
                rendered.extend(core::iter::repeat_n(' ', fill));
            }
            writeln!(out, "{}", rendered.trim_end())?;
        }
        Ok(())
    }
}

/// RFC 4180 CSV, one record per row, streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvPrinter {
    /// Whether the column names form the first record.
    pub with_header: bool,
}

impl Printer for CsvPrinter {
    fn print(&mut self, result_set: ResultSet, out: &mut dyn Write) -> Result<(), Error> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .flexible(true)
            .from_writer(out);
        if self.with_header {
            writer.write_record(&result_set.columns)?;
        }
        for row in result_set.rows {
            writer.write_record(format_row(&row?, FormatMode::Csv))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// A single-line JSON array of `{"column": "value"}` objects, streamed.
///
/// Values are the formatted strings, keys are sorted, and a result set
/// without rows prints nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonPrinter;

impl Printer for JsonPrinter {
    fn print(&mut self, result_set: ResultSet, out: &mut dyn Write) -> Result<(), Error> {
        let mut first = true;
        for row in result_set.rows {
            let record: Map<String, JsonValue> = result_set
                .columns
                .iter()
                .cloned()
                .zip(format_row(&row?, FormatMode::Json).into_iter().map(JsonValue::String))
                .collect();
            out.write_all(if first { b"[" } else { b"," })?;
            serde_json::to_writer(&mut *out, &record)?;
            first = false;
        }
        if !first {
            out.write_all(b"]\n")?;
        }
        Ok(())
    }
}

/// Print one result set, choosing the printer from `options` and the columns.
///
/// `EXPLAIN QUERY PLAN` output is always drawn as a tree, and statements
/// without columns print nothing.
pub fn print_result_set(
    result_set: ResultSet,
    out: &mut dyn Write,
    options: PrintOptions,
) -> Result<(), Error> {
    if result_set.columns.is_empty() {
        for row in result_set.rows {
            row?;
        }
        return Ok(());
    }
    if explain::is_query_plan(&result_set.columns) {
        return QueryPlanPrinter.print(result_set, out);
    }
    match options.mode {
        OutputMode::Table => TablePrinter {
            with_header: options.with_header,
        }
        .print(result_set, out),
        OutputMode::Csv => CsvPrinter {
            with_header: options.with_header,
        }
        .print(result_set, out),
        OutputMode::Json => JsonPrinter.print(result_set, out),
    }
}

/// Print every result of a batch, in order.
///
/// Returns the first error met, whether the statement failed or one of its
/// rows did; nothing after it is printed.
pub fn print_statements(
    results: impl IntoIterator<Item = StatementResult>,
    out: &mut dyn Write,
    options: PrintOptions,
) -> Result<(), Error> {
    for result in results {
        print_result_set(result?, out, options)?;
    }
    Ok(())
}

/// Write `err` the way the shell reports failures.
pub fn print_error(err: &Error, out: &mut dyn Write) -> Result<(), Error> {
    writeln!(out, "Error: {err}")?;
    Ok(())
}
