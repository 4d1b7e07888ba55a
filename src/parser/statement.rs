// Statement assembly: joins physical lines into logical statements ending in `;`.
// Quote and block-comment state carry across line boundaries, so a literal
// holding a newline or a `;` stays inside one statement.

use crate::logger;
use indicatif::ProgressBar;
use std::collections::VecDeque;
use std::io::{self, BufRead};

/// One logical SQL statement without its terminating `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    // 1-based line where the statement text begins.
    pub line: usize,
}

// Tracks a statement across multiple lines.
struct StatementAccumulator {
    buffer: String,
    start_line: usize,
    quote: Option<char>,
    escape_next: bool,
    in_block_comment: bool,
    statements_processed: usize,
}

impl StatementAccumulator {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            start_line: 0,
            quote: None,
            escape_next: false,
            in_block_comment: false,
            statements_processed: 0,
        }
    }

    fn at_top_level(&self) -> bool {
        self.quote.is_none() && !self.in_block_comment
    }

    // Process a single line (terminator included) and return the statements it completes.
    fn process_line(&mut self, line: &str, line_no: usize) -> Vec<Statement> {
        let mut results = Vec::new();
        if self.at_top_level() && line.trim_start().starts_with("--") {
            return results;
        }
        // A literal left open by a broken statement must not swallow the
        // INSERTs that follow it.
        if self.quote.is_some() && starts_insert(line) {
            logger::debug(&format!(
                "StatementReader: literal opened before line {} never closed, resyncing",
                line_no
            ));
            self.quote = None;
            self.escape_next = false;
            if let Some(stmt) = self.take() {
                results.push(stmt);
            }
        }

        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }

            if let Some(q) = self.quote {
                self.push(c, line_no);
                if self.escape_next {
                    self.escape_next = false;
                } else if c == '\\' && q != '`' {
                    self.escape_next = true;
                } else if c == q {
                    self.quote = None;
                }
                continue;
            }

            match c {
                '\'' | '"' | '`' => {
                    self.quote = Some(c);
                    self.push(c, line_no);
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                    self.push(' ', line_no);
                }
                '-' if chars.peek() == Some(&'-') => {
                    // `--` only opens a comment when followed by whitespace or end of line.
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    match lookahead.next() {
                        Some(n) if !n.is_whitespace() => self.push(c, line_no),
                        _ => {
                            self.push(' ', line_no);
                            break;
                        }
                    }
                }
                ';' => {
                    if let Some(stmt) = self.take() {
                        results.push(stmt);
                    }
                }
                _ => self.push(c, line_no),
            }
        }
        results
    }

    fn push(&mut self, c: char, line_no: usize) {
        if self.buffer.is_empty() {
            if c.is_whitespace() {
                return;
            }
            self.start_line = line_no;
        }
        self.buffer.push(c);
    }

    fn take(&mut self) -> Option<Statement> {
        let text = self.buffer.trim_end().to_string();
        self.buffer.clear();
        if text.is_empty() {
            return None;
        }
        self.statements_processed += 1;
        Some(Statement {
            text,
            line: self.start_line,
        })
    }

    // Flush remaining buffer at EOF (best effort).
    fn finalize(&mut self) -> Option<Statement> {
        if self.in_block_comment {
            logger::debug("StatementReader: block comment still open at end of input");
        }
        if let Some(q) = self.quote {
            logger::debug(&format!(
                "StatementReader: {} literal still open at end of input",
                q
            ));
        }
        self.quote = None;
        self.escape_next = false;
        self.in_block_comment = false;
        self.take()
    }
}

// Whether a physical line opens with `INSERT INTO` (any case and spacing).
fn starts_insert(line: &str) -> bool {
    let mut words = line.split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(a), Some(b)) if a.eq_ignore_ascii_case("INSERT")
            && b.get(..4).is_some_and(|w| w.eq_ignore_ascii_case("INTO"))
            && b[4..].chars().next().map_or(true, |c| !c.is_alphanumeric() && c != '_')
    )
}

/// Lazily yields statements from a line-oriented source.
pub struct StatementReader<R> {
    reader: R,
    acc: StatementAccumulator,
    pending: VecDeque<Statement>,
    line: String,
    line_no: usize,
    bytes_read: u64,
    last_logged: u64,
    bar: Option<ProgressBar>,
    done: bool,
}

impl<R: BufRead> StatementReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            acc: StatementAccumulator::new(),
            pending: VecDeque::new(),
            line: String::new(),
            line_no: 0,
            bytes_read: 0,
            last_logged: 0,
            bar: None,
            done: false,
        }
    }

    // Advance `bar` by the bytes consumed; it is finished at end of input.
    pub fn with_progress(mut self, bar: Option<ProgressBar>) -> Self {
        self.bar = bar;
        self
    }

    pub fn statements_processed(&self) -> usize {
        self.acc.statements_processed
    }

    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    fn track_bytes(&mut self, n: usize) {
        let n = n as u64;
        self.bytes_read += n;
        if let Some(b) = &self.bar {
            b.inc(n);
        } else if logger::is_debug() && self.bytes_read - self.last_logged > 100 * 1024 * 1024 {
            logger::debug(&format!(
                "StatementReader: {} bytes read, {} statements",
                self.bytes_read, self.acc.statements_processed
            ));
            self.last_logged = self.bytes_read;
        }
    }
}

impl<R: BufRead> Iterator for StatementReader<R> {
    type Item = io::Result<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(stmt) = self.pending.pop_front() {
                return Some(Ok(stmt));
            }
            if self.done {
                return None;
            }

            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    if let Some(stmt) = self.acc.finalize() {
                        self.pending.push_back(stmt);
                    }
                    if let Some(b) = &self.bar {
                        b.finish();
                    }
                }
                Ok(n) => {
                    self.line_no += 1;
                    self.track_bytes(n);
                    let stmts = self.acc.process_line(&self.line, self.line_no);
                    self.pending.extend(stmts);
                }
                Err(e) => {
                    self.done = true;
                    if let Some(b) = &self.bar {
                        b.abandon();
                    }
                    return Some(Err(e));
                }
            }
        }
    }
}
