//! Splitting SQL text into statements.

use core::ops::Range;

use super::scanner::{Fragment, Scanner};

/// One top-level SQL statement cut out of a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    span: Range<usize>,
    sql: String,
    terminated: bool,
}

impl Statement {
    /// Create a terminated statement from standalone SQL text.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        let sql: String = sql.into();
        Self {
            span: 0..sql.len(),
            sql: sql.trim().to_string(),
            terminated: true,
        }
    }

    /// The trimmed SQL text, comments removed.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Byte range of the raw fragment in the original input, separator excluded.
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Whether a `;` closed this statement.
    ///
    /// Only a trailing fragment of partial input can be unterminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the statement has nothing to execute.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

impl From<Fragment> for Statement {
    fn from(fragment: Fragment) -> Self {
        Self {
            span: fragment.span,
            sql: fragment.sql,
            terminated: fragment.terminated,
        }
    }
}

/// Lazy iterator over the statements of a SQL text.
///
/// Empty fragments, such as those between `;;`, are skipped.
pub struct Splitter<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Splitter<'a> {
    /// Create a new splitter for the given input.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
        }
    }
}

impl Iterator for Splitter<'_> {
    type Item = Statement;

    fn next(&mut self) -> Option<Statement> {
        loop {
            let fragment = self.scanner.next_fragment()?;
            if !fragment.sql.is_empty() {
                return Some(fragment.into());
            }
        }
    }
}

/// Split `text` into its statements, in order.
#[must_use]
pub fn split(text: &str) -> Vec<Statement> {
    Splitter::new(text).collect()
}

/// Whether `text` ends with a complete statement.
///
/// True iff no quote or block comment is left open, no trigger body is left
/// open, and the last token outside comments is a terminating `;`.
#[must_use]
pub fn is_complete(text: &str) -> bool {
    let mut scanner = Scanner::new(text);
    while scanner.next_fragment().is_some() {}
    scanner.is_at_statement_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqls(text: &str) -> Vec<String> {
        split(text).into_iter().map(|s| s.sql().to_string()).collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(
            sqls("CREATE TABLE t(id INT); INSERT INTO t VALUES (1);"),
            vec!["CREATE TABLE t(id INT)", "INSERT INTO t VALUES (1)"]
        );
    }

    #[test]
    fn test_quote_safety() {
        assert_eq!(
            sqls("INSERT INTO t VALUES('a;b');"),
            vec!["INSERT INTO t VALUES('a;b')"]
        );
        assert_eq!(sqls("SELECT \"x;y\" FROM t;").len(), 1);
    }

    #[test]
    fn test_comment_safety() {
        let statements = sqls("SELECT 1; -- comment ;\nSELECT 2;");
        assert_eq!(statements, vec!["SELECT 1", "SELECT 2"]);
        assert!(statements.iter().all(|s| !s.contains("comment")));

        let statements = sqls("SELECT 1; /* comment ; */ SELECT 2;");
        assert_eq!(statements, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_line_comment_without_newline_swallows_rest() {
        assert_eq!(sqls("SELECT 1; -- comment ; SELECT 2;"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_trigger_atomicity() {
        let sql = "CREATE TRIGGER trg AFTER INSERT ON t BEGIN UPDATE t SET x=1; END;";
        let statements = split(sql);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql(),
            "CREATE TRIGGER trg AFTER INSERT ON t BEGIN UPDATE t SET x=1; END"
        );
    }

    #[test]
    fn test_trigger_followed_by_statements() {
        let sql = "create temp trigger trg after insert on t begin \
                   update t set x = case when new.a then 1 else 2 end; \
                   insert into log values('end;'); \
                   end; SELECT 1;";
        let statements = sqls(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_begin_outside_trigger_is_plain() {
        assert_eq!(
            sqls("BEGIN; INSERT INTO t VALUES(1); END;"),
            vec!["BEGIN", "INSERT INTO t VALUES(1)", "END"]
        );
    }

    #[test]
    fn test_empty_statements_are_dropped() {
        assert_eq!(sqls(";;; SELECT 1;;  ;"), vec!["SELECT 1"]);
        assert!(split("").is_empty());
        assert!(split("   \n ").is_empty());
        assert!(split("-- only a comment").is_empty());
    }

    #[test]
    fn test_trailing_fragment_is_unterminated() {
        let statements = split("SELECT 1; SELECT 2");
        assert_eq!(statements.len(), 2);
        assert!(statements[0].is_terminated());
        assert!(!statements[1].is_terminated());
        assert_eq!(statements[1].sql(), "SELECT 2");
    }

    #[test]
    fn test_unterminated_quote_extends_to_end() {
        let statements = sqls("SELECT 'abc; SELECT 2;");
        assert_eq!(statements, vec!["SELECT 'abc; SELECT 2;"]);
    }

    #[test]
    fn test_spans_point_into_input() {
        let input = "  SELECT 1 ;\n\nSELECT 'x' ";
        for statement in split(input) {
            assert_eq!(input[statement.span()].trim(), statement.sql());
        }
    }

    #[test]
    fn test_rejoin_round_trip() {
        let inputs = [
            "SELECT 1; SELECT 'a;b'; CREATE TRIGGER t AFTER INSERT ON x BEGIN SELECT 1; END;",
            "INSERT INTO \"we;ird\" VALUES(1);;SELECT [a;b] FROM t",
            "BEGIN; UPDATE t SET a = 'x''y'; COMMIT;",
        ];
        for input in inputs {
            let first = split(input);
            let rejoined = first
                .iter()
                .map(Statement::sql)
                .collect::<Vec<_>>()
                .join(";");
            assert_eq!(split(&rejoined).len(), first.len(), "input: {input}");
        }
    }

    #[test]
    fn test_is_complete() {
        assert!(!is_complete("SELECT 1"));
        assert!(is_complete("SELECT 1;"));
        assert!(is_complete("SELECT 1;   \n"));
        assert!(is_complete("SELECT 1; -- done"));
        assert!(!is_complete("SELECT 1; /* open"));
        assert!(!is_complete("SELECT 'a;"));
        assert!(!is_complete(""));
        assert!(!is_complete("SELECT 1; SELECT"));
    }

    #[test]
    fn test_is_complete_trigger_needs_end() {
        let mut buffer = String::from("CREATE TRIGGER t AFTER INSERT ON x ");
        assert!(!is_complete(&buffer));
        buffer.push_str("BEGIN x; ");
        assert!(!is_complete(&buffer));
        buffer.push_str("UPDATE x SET a = 1; ");
        assert!(!is_complete(&buffer));
        buffer.push_str("END");
        assert!(!is_complete(&buffer));
        buffer.push(';');
        assert!(is_complete(&buffer));
    }

    #[test]
    fn test_statement_new() {
        let statement = Statement::new("  SELECT 1  ");
        assert_eq!(statement.sql(), "SELECT 1");
        assert!(statement.is_terminated());
        assert!(!statement.is_blank());
        assert!(Statement::new(" \n").is_blank());
    }
}
