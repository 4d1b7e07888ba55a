// Error taxonomy for the conversion: statement-level syntax errors and
// run-level failures.

use std::io;
use std::path::PathBuf;

/// Syntax problems found while decomposing a single statement.
///
/// Positions are byte offsets into the statement text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A quoted literal or identifier never closes.
    #[error("unterminated quoted literal starting at position {pos}")]
    UnterminatedString {
        /// Position of the opening quote.
        pos: usize,
    },
    /// A parenthesis opens and never closes.
    #[error("unbalanced parentheses starting at position {pos}")]
    UnbalancedParens {
        /// Position of the unmatched `(`.
        pos: usize,
    },
    /// Nothing usable follows `INSERT INTO`.
    #[error("missing table name")]
    MissingTableName,
    /// The column list is empty or holds an empty name.
    #[error("invalid column list at position {pos}")]
    InvalidColumnList {
        /// Position of the column list.
        pos: usize,
    },
    /// No `VALUES` keyword where one is expected.
    #[error("expected VALUES at position {pos}")]
    MissingValues {
        /// Position where `VALUES` was expected.
        pos: usize,
    },
    /// A character that cannot appear at this point.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Its position.
        pos: usize,
    },
    /// `VALUES` without a following tuple, or a tuple like `()`.
    #[error("empty value tuple at position {pos}")]
    EmptyTuple {
        /// Position of the tuple.
        pos: usize,
    },
    /// A tuple whose field count disagrees with the others or the column list.
    #[error("tuple {row} has {found} values, expected {expected}")]
    ArityMismatch {
        /// Zero-based tuple index.
        row: usize,
        /// Expected arity.
        expected: usize,
        /// Actual arity.
        found: usize,
    },
}

/// Run-level errors. `StatementParse` only skips one statement and
/// `OutputWrite` only stops one table; the others end the run.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("cannot open input {}: {source}", .path.display())]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed reading input: {0}")]
    InputRead(#[source] io::Error),
    #[error("statement at line {line}: {source}")]
    StatementParse {
        line: usize,
        #[source]
        source: ParseError,
    },
    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write failed for table {table}: {source}")]
    OutputWrite {
        table: String,
        #[source]
        source: csv::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_errors_carry_line_numbers() {
        let err = DumpError::StatementParse {
            line: 42,
            source: ParseError::UnbalancedParens { pos: 30 },
        };
        assert_eq!(
            err.to_string(),
            "statement at line 42: unbalanced parentheses starting at position 30"
        );
    }

    #[test]
    fn input_errors_name_the_path() {
        let err = DumpError::InputNotFound {
            path: PathBuf::from("missing.sql"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().starts_with("cannot open input missing.sql"));
    }
}
