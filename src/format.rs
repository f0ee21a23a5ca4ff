//! Rendering of [`Value`]s into output encodings.

use core::fmt::{self, Display, Write};

use crate::value::{TIMESTAMP_FORMAT, Value};

/// Selects how a [`Value`] is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormatMode {
    /// Human readable cell for aligned tables.
    #[default]
    Table,
    /// SQL literal that replays to the same value.
    SqlLiteral,
    /// CSV field (quoting is left to the CSV writer).
    Csv,
    /// JSON record field; rendered as a string like table cells.
    Json,
}

/// Render `value` under `mode`.
#[must_use]
pub fn format(value: &Value, mode: FormatMode) -> String {
    Formatted { value, mode }.to_string()
}

/// Render every value of a row under `mode`.
#[must_use]
pub fn format_row(values: &[Value], mode: FormatMode) -> Vec<String> {
    values.iter().map(|value| format(value, mode)).collect()
}

/// SQLite's keywords, upper-cased and sorted.
const KEYWORDS: [&str; 147] = [
    "ABORT", "ACTION", "ADD", "AFTER", "ALL", "ALTER", "ALWAYS", "ANALYZE", "AND", "AS", "ASC",
    "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN", "BETWEEN", "BY", "CASCADE", "CASE", "CAST",
    "CHECK", "COLLATE", "COLUMN", "COMMIT", "CONFLICT", "CONSTRAINT", "CREATE", "CROSS",
    "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DATABASE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DESC", "DETACH", "DISTINCT", "DO", "DROP", "EACH",
    "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXISTS", "EXPLAIN", "FAIL",
    "FILTER", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM", "FULL", "GENERATED", "GLOB",
    "GROUP", "GROUPS", "HAVING", "IF", "IGNORE", "IMMEDIATE", "IN", "INDEX", "INDEXED",
    "INITIALLY", "INNER", "INSERT", "INSTEAD", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "KEY", "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT",
    "NOTHING", "NOTNULL", "NULL", "NULLS", "OF", "OFFSET", "ON", "OR", "ORDER", "OTHERS",
    "OUTER", "OVER", "PARTITION", "PLAN", "PRAGMA", "PRECEDING", "PRIMARY", "QUERY", "RAISE",
    "RANGE", "RECURSIVE", "REFERENCES", "REGEXP", "REINDEX", "RELEASE", "RENAME", "REPLACE",
    "RESTRICT", "RETURNING", "RIGHT", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT", "SELECT", "SET",
    "TABLE", "TEMP", "TEMPORARY", "THEN", "TIES", "TO", "TRANSACTION", "TRIGGER", "UNBOUNDED",
    "UNION", "UNIQUE", "UPDATE", "USING", "VACUUM", "VALUES", "VIEW", "VIRTUAL", "WHEN",
    "WHERE", "WINDOW", "WITH", "WITHOUT",
];

/// Whether `name` must be quoted to be used as an identifier.
///
/// Names that are empty, start with a digit, contain anything outside
/// `[A-Za-z0-9_]` or spell a SQLite keyword need quoting.
#[must_use]
pub fn needs_escaping(name: &str) -> bool {
    match name.as_bytes().first() {
        None => true,
        Some(first) if first.is_ascii_digit() => true,
        Some(_) if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') => true,
        Some(_) => KEYWORDS
            .binary_search(&name.to_ascii_uppercase().as_str())
            .is_ok(),
    }
}

/// Quote `name` as a SQLite identifier when [`needs_escaping`] says so.
///
/// Embedded double quotes are doubled.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    if needs_escaping(name) {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

struct Formatted<'a> {
    value: &'a Value,
    mode: FormatMode,
}

impl Display for Formatted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let literal = self.mode == FormatMode::SqlLiteral;
        match self.value {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) if literal && !v.is_finite() => {
                if v.is_nan() {
                    write!(f, "NULL")
                } else if v.is_sign_positive() {
                    write!(f, "9e999")
                } else {
                    write!(f, "-9e999")
                }
            }
            // Display for f64 is the shortest round-trip form and never uses an exponent.
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) if literal => {
                f.write_char('\'')?;
                for c in s.chars() {
                    if c == '\'' {
                        f.write_str("''")?;
                    } else {
                        f.write_char(c)?;
                    }
                }
                f.write_char('\'')
            }
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) if literal => write!(f, "X'{}'", hex::encode_upper(b)),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode_upper(b)),
            Value::Timestamp(ts) if literal => write!(f, "'{}'", ts.format(TIMESTAMP_FORMAT)),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const ALL_MODES: [FormatMode; 4] = [
        FormatMode::Table,
        FormatMode::SqlLiteral,
        FormatMode::Csv,
        FormatMode::Json,
    ];

    fn timestamp() -> Value {
        Value::Timestamp(
            NaiveDate::from_ymd_opt(2023, 7, 4)
                .unwrap()
                .and_hms_opt(9, 5, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_null_and_scalars_agree_across_modes() {
        for mode in ALL_MODES {
            assert_eq!(format(&Value::Null, mode), "NULL");
            assert_eq!(format(&Value::Bool(true), mode), "true");
            assert_eq!(format(&Value::Bool(false), mode), "false");
            assert_eq!(format(&Value::Int(-42), mode), "-42");
            assert_eq!(format(&Value::Uint(u64::MAX), mode), "18446744073709551615");
        }
    }

    #[test]
    fn test_float_shortest_round_trip() {
        assert_eq!(format(&Value::Float(3.25), FormatMode::Table), "3.25");
        assert_eq!(format(&Value::Float(1.0), FormatMode::Table), "1");
        assert_eq!(format(&Value::Float(0.1 + 0.2), FormatMode::Csv), "0.30000000000000004");
        assert_eq!(format(&Value::Float(1e21), FormatMode::SqlLiteral), "1000000000000000000000");
        assert_eq!(format(&Value::Float(-2.5e-7), FormatMode::Json), "-0.00000025");
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(format(&Value::Float(f64::NAN), FormatMode::SqlLiteral), "NULL");
        assert_eq!(format(&Value::Float(f64::INFINITY), FormatMode::SqlLiteral), "9e999");
        assert_eq!(
            format(&Value::Float(f64::NEG_INFINITY), FormatMode::SqlLiteral),
            "-9e999"
        );
        assert_eq!(format(&Value::Float(f64::INFINITY), FormatMode::Table), "inf");
    }

    #[test]
    fn test_text() {
        let text = Value::Text("a'b".into());
        assert_eq!(format(&text, FormatMode::Table), "a'b");
        assert_eq!(format(&text, FormatMode::Csv), "a'b");
        assert_eq!(format(&text, FormatMode::Json), "a'b");
        assert_eq!(format(&text, FormatMode::SqlLiteral), "'a''b'");
        assert_eq!(format(&Value::Text(String::new()), FormatMode::SqlLiteral), "''");
    }

    #[test]
    fn test_bytes() {
        let bytes = Value::Bytes(vec![0x01, 0x02]);
        assert_eq!(format(&bytes, FormatMode::Table), "0x0102");
        assert_eq!(format(&bytes, FormatMode::SqlLiteral), "X'0102'");
        assert_eq!(
            format(&Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]), FormatMode::Csv),
            "0xDEADBEEF"
        );
        assert_eq!(format(&Value::Bytes(vec![]), FormatMode::SqlLiteral), "X''");
    }

    #[test]
    fn test_timestamp() {
        assert_eq!(format(&timestamp(), FormatMode::Table), "2023-07-04 09:05:00");
        assert_eq!(format(&timestamp(), FormatMode::Csv), "2023-07-04 09:05:00");
        assert_eq!(
            format(&timestamp(), FormatMode::SqlLiteral),
            "'2023-07-04 09:05:00'"
        );
    }

    #[test]
    fn test_format_row() {
        let row = vec![Value::Int(1), Value::Text("x'y".into()), Value::Null];
        assert_eq!(
            format_row(&row, FormatMode::SqlLiteral),
            vec!["1", "'x''y'", "NULL"]
        );
        assert_eq!(format_row(&row, FormatMode::Table), vec!["1", "x'y", "NULL"]);
    }

    #[test]
    fn test_identifier_quoting() {
        assert!(!needs_escaping("users"));
        assert!(!needs_escaping("_t1"));
        assert!(needs_escaping(""));
        assert!(needs_escaping("1table"));
        assert!(needs_escaping("my table"));
        assert!(needs_escaping("tëst"));
        assert!(needs_escaping("order"));
        assert!(needs_escaping("Group"));
        assert!(needs_escaping("current_timestamp"));
        assert!(!needs_escaping("orders"));
        assert_eq!(quote_identifier("users"), "users");
        assert_eq!(quote_identifier("select"), "\"select\"");
        assert_eq!(quote_identifier("my table"), "\"my table\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_identifier(""), "\"\"");
    }
}
