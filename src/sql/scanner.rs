//! Byte scanner tracking quotes, comments and trigger bodies.

use core::ops::Range;

/// Lexical state at a given position of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum State {
    /// Plain SQL text.
    #[default]
    Normal,
    /// Inside `'...'`.
    SingleQuote,
    /// Inside `"..."`.
    DoubleQuote,
    /// Inside `` `...` ``.
    Backtick,
    /// Inside `[...]`.
    Bracket,
    /// Inside `-- ...` up to the next newline.
    LineComment,
    /// Inside `/* ... */`.
    BlockComment,
}

/// How far the leading keywords of a statement have matched `CREATE [TEMP] TRIGGER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Leading {
    #[default]
    Start,
    AfterCreate,
    AfterTemp,
    Trigger,
    Other,
}

/// Nesting of `BEGIN`/`CASE` ... `END` inside a trigger statement.
#[derive(Debug, Clone, Copy, Default)]
struct TriggerTracker {
    leading: Leading,
    depth: usize,
}

impl TriggerTracker {
    fn observe(&mut self, word: &str) {
        let is = |keyword: &str| word.eq_ignore_ascii_case(keyword);
        self.leading = match self.leading {
            Leading::Trigger => {
                if is("BEGIN") || is("CASE") {
                    self.depth += 1;
                } else if is("END") {
                    self.depth = self.depth.saturating_sub(1);
                }
                Leading::Trigger
            }
            Leading::Start if is("CREATE") => Leading::AfterCreate,
            Leading::AfterCreate if is("TEMP") || is("TEMPORARY") => Leading::AfterTemp,
            Leading::AfterCreate | Leading::AfterTemp if is("TRIGGER") => Leading::Trigger,
            _ => Leading::Other,
        };
    }
}

/// A raw piece of input ending at a top-level `;` or at end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fragment {
    /// Byte range in the input, separator excluded.
    pub(crate) span: Range<usize>,
    /// Trimmed text with comments removed.
    pub(crate) sql: String,
    /// Whether a `;` closed the fragment.
    pub(crate) terminated: bool,
}

/// Single left-to-right scanner over SQL text.
///
/// Never fails: unterminated quotes and comments run to the end of input.
pub(crate) struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    state: State,
    trigger: TriggerTracker,
    last_significant: Option<u8>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given input.
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            state: State::Normal,
            trigger: TriggerTracker::default(),
            last_significant: None,
        }
    }

    /// Whether everything scanned so far forms complete statements ending in `;`.
    pub(crate) fn is_at_statement_end(&self) -> bool {
        matches!(self.state, State::Normal | State::LineComment)
            && self.trigger.depth == 0
            && self.last_significant == Some(b';')
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    /// Scan the next fragment, or return `None` at end of input.
    pub(crate) fn next_fragment(&mut self) -> Option<Fragment> {
        let bytes = self.input.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }

        let start = self.pos;
        let mut sql = String::new();
        // Start of the current run of text outside comments.
        let mut segment = start;

        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            match self.state {
                State::Normal => match b {
                    b';' if self.trigger.depth == 0 => {
                        sql.push_str(&self.input[segment..self.pos]);
                        let end = self.pos;
                        self.pos += 1;
                        self.last_significant = Some(b';');
                        self.trigger = TriggerTracker::default();
                        return Some(Fragment {
                            span: start..end,
                            sql: sql.trim().to_string(),
                            terminated: true,
                        });
                    }
                    b'-' if self.peek(1) == Some(b'-') => {
                        sql.push_str(&self.input[segment..self.pos]);
                        sql.push(' ');
                        self.state = State::LineComment;
                        self.pos += 2;
                    }
                    b'/' if self.peek(1) == Some(b'*') => {
                        sql.push_str(&self.input[segment..self.pos]);
                        sql.push(' ');
                        self.state = State::BlockComment;
                        self.pos += 2;
                    }
                    b'\'' | b'"' | b'`' | b'[' => {
                        self.state = match b {
                            b'\'' => State::SingleQuote,
                            b'"' => State::DoubleQuote,
                            b'`' => State::Backtick,
                            _ => State::Bracket,
                        };
                        self.last_significant = Some(b);
                        self.pos += 1;
                    }
                    _ if is_word_byte(b) => {
                        let word_start = self.pos;
                        while self.pos < bytes.len() && is_word_byte(bytes[self.pos]) {
                            self.pos += 1;
                        }
                        self.trigger.observe(&self.input[word_start..self.pos]);
                        self.last_significant = Some(b);
                    }
                    _ => {
                        if !b.is_ascii_whitespace() {
                            self.last_significant = Some(b);
                        }
                        self.pos += 1;
                    }
                },
                State::SingleQuote | State::DoubleQuote | State::Backtick => {
                    let quote = match self.state {
                        State::SingleQuote => b'\'',
                        State::DoubleQuote => b'"',
                        _ => b'`',
                    };
                    if b == quote {
                        // A doubled quote is an escaped quote character.
                        if self.peek(1) == Some(quote) {
                            self.pos += 2;
                        } else {
                            self.state = State::Normal;
                            self.pos += 1;
                        }
                    } else {
                        self.pos += 1;
                    }
                }
                State::Bracket => {
                    if b == b']' {
                        self.state = State::Normal;
                    }
                    self.pos += 1;
                }
                State::LineComment => {
                    if b == b'\n' {
                        self.state = State::Normal;
                        segment = self.pos;
                    }
                    self.pos += 1;
                }
                State::BlockComment => {
                    if b == b'*' && self.peek(1) == Some(b'/') {
                        self.pos += 2;
                        self.state = State::Normal;
                        segment = self.pos;
                    } else {
                        self.pos += 1;
                    }
                }
            }
        }

        if !matches!(self.state, State::LineComment | State::BlockComment) {
            sql.push_str(&self.input[segment..]);
        }
        Some(Fragment {
            span: start..bytes.len(),
            sql: sql.trim().to_string(),
            terminated: false,
        })
    }
}

/// Check if a byte belongs to a keyword or identifier.
///
/// Non-ASCII bytes count as identifier bytes so that keywords glued to
/// Unicode letters are not matched.
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}
