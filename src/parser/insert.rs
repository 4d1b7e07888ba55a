// INSERT parser: turns assembled statements into InsertRecords.
// Decomposition is an explicit scanner (quote state + paren depth); regex is
// only used to classify the statement prefix and numeric literals.

use crate::error::{DumpError, ParseError};
use crate::logger;
use crate::parser::statement::StatementReader;
use crate::parser::{InsertRecord, Value};
use regex::Regex;
use std::io::BufRead;

pub struct InsertParser {
    insert_re: Regex,
    number_re: Regex,
}

impl InsertParser {
    // Build regexes once for reuse.
    pub fn new() -> Self {
        let insert_re = Regex::new(r"(?i)^\s*INSERT\s+INTO\b\s*").expect("valid insert regex");
        let number_re = Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$")
            .expect("valid number regex");
        Self {
            insert_re,
            number_re,
        }
    }

    /// Parse one statement. `Ok(None)` means the statement is not an INSERT
    /// and is ignored.
    pub fn parse_statement(&self, text: &str) -> Result<Option<InsertRecord>, ParseError> {
        let Some(prefix) = self.insert_re.find(text) else {
            return Ok(None);
        };
        let mut cur = Cursor::new(text, prefix.end());

        let table = parse_table_name(&mut cur)?;
        cur.skip_ws();

        let columns = if cur.peek() == Some('(') {
            Some(parse_column_list(&mut cur)?)
        } else {
            None
        };
        cur.skip_ws();

        if !cur.eat_keyword("VALUES") && !cur.eat_keyword("VALUE") {
            return Err(ParseError::MissingValues { pos: cur.pos });
        }

        let mut rows = Vec::new();
        loop {
            cur.skip_ws();
            let tuple_pos = cur.pos;
            match cur.peek() {
                Some('(') => {}
                Some(ch) => return Err(ParseError::UnexpectedChar { ch, pos: tuple_pos }),
                None => return Err(ParseError::EmptyTuple { pos: tuple_pos }),
            }
            let body = scan_group(&mut cur)?;
            if body.trim().is_empty() {
                return Err(ParseError::EmptyTuple { pos: tuple_pos });
            }
            rows.push(
                split_fields(body)
                    .into_iter()
                    .map(|field| self.decode_literal(field))
                    .collect::<Vec<_>>(),
            );

            cur.skip_ws();
            match cur.peek() {
                Some(',') => {
                    cur.bump();
                }
                None => break,
                Some(ch) => {
                    if cur.eat_keyword("ON") {
                        logger::debug(&format!(
                            "InsertParser: {} ignoring ON DUPLICATE KEY clause",
                            table
                        ));
                        break;
                    }
                    return Err(ParseError::UnexpectedChar { ch, pos: cur.pos });
                }
            }
        }

        let expected = columns.as_ref().map_or(rows[0].len(), Vec::len);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != expected {
                return Err(ParseError::ArityMismatch {
                    row,
                    expected,
                    found: values.len(),
                });
            }
        }

        logger::debug(&format!(
            "InsertParser: {} has {} value groups",
            table,
            rows.len()
        ));
        Ok(Some(InsertRecord {
            table,
            columns,
            rows,
        }))
    }

    /// Decode one raw field: NULL, quoted string, number, or the raw text.
    pub fn decode_literal(&self, raw: &str) -> Value {
        if raw.eq_ignore_ascii_case("NULL") {
            return Value::Null;
        }
        if let Some(s) = unquote(raw) {
            return Value::String(s);
        }
        if self.number_re.is_match(raw) {
            return Value::Number(raw.to_string());
        }
        Value::String(raw.to_string())
    }
}

impl Default for InsertParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sequence of records from a dump, in file order. Non-INSERT
/// statements are skipped; malformed ones surface as recoverable
/// `DumpError::StatementParse` items.
pub struct InsertRecords<R> {
    statements: StatementReader<R>,
    parser: InsertParser,
    ignored: usize,
}

impl<R: BufRead> InsertRecords<R> {
    pub fn new(statements: StatementReader<R>) -> Self {
        Self {
            statements,
            parser: InsertParser::new(),
            ignored: 0,
        }
    }

    pub fn statements_seen(&self) -> usize {
        self.statements.statements_processed()
    }

    // Statements that were not INSERTs.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    pub fn lines_read(&self) -> usize {
        self.statements.lines_read()
    }
}

impl<R: BufRead> Iterator for InsertRecords<R> {
    type Item = Result<InsertRecord, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let stmt = match self.statements.next()? {
                Ok(stmt) => stmt,
                Err(e) => return Some(Err(DumpError::InputRead(e))),
            };
            match self.parser.parse_statement(&stmt.text) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {
                    self.ignored += 1;
                }
                Err(source) => {
                    return Some(Err(DumpError::StatementParse {
                        line: stmt.line,
                        source,
                    }))
                }
            }
        }
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    // Case-insensitive keyword that is not a prefix of a longer identifier.
    fn eat_keyword(&mut self, kw: &str) -> bool {
        let rest = self.rest();
        match rest.get(..kw.len()) {
            Some(head) if head.eq_ignore_ascii_case(kw) => {}
            _ => return false,
        }
        if rest[kw.len()..].chars().next().is_some_and(is_ident_char) {
            return false;
        }
        self.pos += kw.len();
        true
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// Backtick- or double-quoted identifier (doubled quote = literal quote), or a
// bare word. May return an empty name; callers decide whether that is valid.
fn parse_identifier(cur: &mut Cursor<'_>) -> Result<String, ParseError> {
    match cur.peek() {
        Some(q @ ('`' | '"')) => {
            let start = cur.pos;
            cur.bump();
            let mut name = String::new();
            loop {
                match cur.bump() {
                    None => return Err(ParseError::UnterminatedString { pos: start }),
                    Some(c) if c == q => {
                        if cur.peek() == Some(q) {
                            cur.bump();
                            name.push(q);
                        } else {
                            return Ok(name);
                        }
                    }
                    Some(c) => name.push(c),
                }
            }
        }
        _ => {
            let start = cur.pos;
            while cur.peek().is_some_and(|c| {
                !c.is_whitespace() && !matches!(c, '(' | ')' | ',' | '.' | ';' | '`' | '"' | '\'')
            }) {
                cur.bump();
            }
            Ok(cur.text[start..cur.pos].to_string())
        }
    }
}

// `db`.`table` resolves to its last segment.
fn parse_table_name(cur: &mut Cursor<'_>) -> Result<String, ParseError> {
    let mut name = parse_identifier(cur)?;
    while cur.peek() == Some('.') {
        cur.bump();
        name = parse_identifier(cur)?;
    }
    if name.is_empty() {
        return Err(ParseError::MissingTableName);
    }
    Ok(name)
}

fn parse_column_list(cur: &mut Cursor<'_>) -> Result<Vec<String>, ParseError> {
    let start = cur.pos;
    cur.bump();
    let mut columns = Vec::new();
    loop {
        cur.skip_ws();
        let column = parse_identifier(cur)?;
        if column.is_empty() {
            return Err(ParseError::InvalidColumnList { pos: start });
        }
        columns.push(column);
        cur.skip_ws();
        match cur.bump() {
            Some(',') => continue,
            Some(')') => return Ok(columns),
            Some(ch) => {
                return Err(ParseError::UnexpectedChar {
                    ch,
                    pos: cur.pos - ch.len_utf8(),
                })
            }
            None => return Err(ParseError::UnbalancedParens { pos: start }),
        }
    }
}

// Consume a parenthesized group starting at `(` and return its inner text.
fn scan_group<'a>(cur: &mut Cursor<'a>) -> Result<&'a str, ParseError> {
    let open = cur.pos;
    cur.bump();
    let body_start = cur.pos;
    let mut depth = 1usize;
    let mut quote: Option<(char, usize)> = None;
    let mut escape = false;

    while let Some(c) = cur.bump() {
        if let Some((q, _)) = quote {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some((c, cur.pos - 1)),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&cur.text[body_start..cur.pos - 1]);
                }
            }
            _ => {}
        }
    }

    match quote {
        Some((_, pos)) => Err(ParseError::UnterminatedString { pos }),
        None => Err(ParseError::UnbalancedParens { pos: open }),
    }
}

// Split a tuple body on commas outside quotes and nested parentheses.
fn split_fields(body: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut depth = 0i32;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                fields.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(body[start..].trim());
    fields
}

// Strip the quotes of a single complete literal and unescape \' \" \\ and
// doubled quotes. Other backslash sequences stay verbatim. Returns None when
// `raw` is not exactly one quoted literal.
fn unquote(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    let q = chars.next().filter(|c| *c == '\'' || *c == '"')?;
    let mut chars = chars.peekable();
    let mut out = String::with_capacity(raw.len());

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(e @ ('\'' | '"' | '\\')) => out.push(e),
                Some(e) => {
                    out.push('\\');
                    out.push(e);
                }
                None => return None,
            }
        } else if c == q {
            if chars.peek() == Some(&q) {
                chars.next();
                out.push(q);
            } else {
                return chars.next().is_none().then_some(out);
            }
        } else {
            out.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> InsertRecord {
        InsertParser::new()
            .parse_statement(sql)
            .expect("statement parses")
            .expect("statement is an INSERT")
    }

    fn parse_err(sql: &str) -> ParseError {
        InsertParser::new()
            .parse_statement(sql)
            .expect_err("statement is malformed")
    }

    fn num(s: &str) -> Value {
        Value::Number(s.to_string())
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn parses_users_example() {
        let record = parse("INSERT INTO `users` (id, name) VALUES (1, 'O\\'Brien'), (2, NULL)");
        assert_eq!(record.table, "users");
        assert_eq!(
            record.columns,
            Some(vec!["id".to_string(), "name".to_string()])
        );
        assert_eq!(
            record.rows,
            vec![vec![num("1"), text("O'Brien")], vec![num("2"), Value::Null]]
        );
    }

    #[test]
    fn positional_insert_has_no_columns() {
        let record = parse("INSERT INTO orders VALUES (10,'pending',19.99)");
        assert_eq!(record.table, "orders");
        assert_eq!(record.columns, None);
        assert_eq!(record.rows, vec![vec![num("10"), text("pending"), num("19.99")]]);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let record = parse("  insert\n  into items\n(`sku`,`qty`)\nvalues ('a-1', 3)");
        assert_eq!(record.table, "items");
        assert_eq!(record.columns, Some(vec!["sku".to_string(), "qty".to_string()]));
        assert_eq!(record.rows.len(), 1);
    }

    #[test]
    fn other_statements_are_ignored() {
        let parser = InsertParser::new();
        for sql in [
            "CREATE TABLE t (id int)",
            "UPDATE t SET id = 2",
            "SET NAMES utf8mb4",
            "LOCK TABLES `t` WRITE",
            "INSERTED INTO t VALUES (1)",
        ] {
            assert_eq!(parser.parse_statement(sql), Ok(None), "{sql}");
        }
    }

    #[test]
    fn qualified_and_quoted_table_names() {
        assert_eq!(parse("INSERT INTO `shop`.`orders` VALUES (1)").table, "orders");
        assert_eq!(parse("INSERT INTO \"audit log\" VALUES (1)").table, "audit log");
        assert_eq!(parse("INSERT INTO `we``ird` VALUES (1)").table, "we`ird");
        assert_eq!(parse("INSERT INTO t(a) VALUES(1)").table, "t");
    }

    #[test]
    fn nested_parentheses_and_commas_stay_in_one_field() {
        let record = parse("INSERT INTO geo VALUES (1, POINT(1, 2), 'a, (b)', \"x,y\")");
        assert_eq!(
            record.rows[0],
            vec![num("1"), text("POINT(1, 2)"), text("a, (b)"), text("x,y")]
        );
    }

    #[test]
    fn n_tuples_of_arity_k() {
        let tuples: Vec<String> = (0..25)
            .map(|i| format!("({i}, 'name {i}', NULL, -{i}.5)"))
            .collect();
        let sql = format!("INSERT INTO wide VALUES {}", tuples.join(",\n"));
        let record = parse(&sql);
        assert_eq!(record.rows.len(), 25);
        assert!(record.rows.iter().all(|row| row.len() == 4));
        assert_eq!(record.rows[7][1], text("name 7"));
    }

    #[test]
    fn decodes_literals() {
        let parser = InsertParser::new();
        assert_eq!(parser.decode_literal("NULL"), Value::Null);
        assert_eq!(parser.decode_literal("null"), Value::Null);
        assert_eq!(parser.decode_literal("'NULL'"), text("NULL"));
        assert_eq!(parser.decode_literal("''"), text(""));
        assert_eq!(parser.decode_literal("'it''s'"), text("it's"));
        assert_eq!(parser.decode_literal("\"say \\\"hi\\\"\""), text("say \"hi\""));
        assert_eq!(parser.decode_literal("'C:\\\\temp'"), text("C:\\temp"));
        assert_eq!(parser.decode_literal("'a\\nb'"), text("a\\nb"));
        assert_eq!(parser.decode_literal("'multi\nline'"), text("multi\nline"));
        assert_eq!(parser.decode_literal("-12.50"), num("-12.50"));
        assert_eq!(parser.decode_literal("+3"), num("+3"));
        assert_eq!(parser.decode_literal(".5"), num(".5"));
        assert_eq!(parser.decode_literal("1e-7"), num("1e-7"));
        assert_eq!(parser.decode_literal("12345678901234567890.123"), num("12345678901234567890.123"));
        assert_eq!(parser.decode_literal("0x1F"), text("0x1F"));
        assert_eq!(parser.decode_literal("NOW()"), text("NOW()"));
        assert_eq!(parser.decode_literal(""), text(""));
    }

    #[test]
    fn escaped_quote_decodes_to_single_quote() {
        let record = parse("INSERT INTO q VALUES ('\\'', 'don\\'t')");
        assert_eq!(record.rows[0], vec![text("'"), text("don't")]);
    }

    #[test]
    fn on_duplicate_key_clause_is_ignored() {
        let record = parse("INSERT INTO t (id) VALUES (1), (2) ON DUPLICATE KEY UPDATE id = id");
        assert_eq!(record.rows.len(), 2);
    }

    #[test]
    fn unbalanced_parenthesis_is_an_error() {
        assert!(matches!(
            parse_err("INSERT INTO t VALUES (1, 2"),
            ParseError::UnbalancedParens { .. }
        ));
        assert!(matches!(
            parse_err("INSERT INTO t VALUES (1, 2))"),
            ParseError::UnexpectedChar { ch: ')', .. }
        ));
        assert!(matches!(
            parse_err("INSERT INTO t (a, b VALUES (1, 2)"),
            ParseError::UnexpectedChar { ch: 'V', .. }
        ));
    }

    #[test]
    fn unterminated_literal_is_an_error() {
        assert_eq!(
            parse_err("INSERT INTO t VALUES (1, 'abc)"),
            ParseError::UnterminatedString { pos: 25 }
        );
    }

    #[test]
    fn missing_values_is_an_error() {
        assert!(matches!(
            parse_err("INSERT INTO t SELECT * FROM u"),
            ParseError::MissingValues { .. }
        ));
        assert_eq!(parse_err("INSERT INTO (a) VALUES (1)"), ParseError::MissingTableName);
    }

    #[test]
    fn empty_tuples_are_errors() {
        assert!(matches!(parse_err("INSERT INTO t VALUES"), ParseError::EmptyTuple { .. }));
        assert!(matches!(parse_err("INSERT INTO t VALUES ()"), ParseError::EmptyTuple { .. }));
        assert!(matches!(parse_err("INSERT INTO t VALUES (1),"), ParseError::EmptyTuple { .. }));
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        assert_eq!(
            parse_err("INSERT INTO t VALUES (1, 2), (3)"),
            ParseError::ArityMismatch {
                row: 1,
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            parse_err("INSERT INTO t (a, b, c) VALUES (1, 2)"),
            ParseError::ArityMismatch {
                row: 0,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn records_skip_malformed_statements() {
        let dump = "\
-- dump header
CREATE TABLE a (id int);
INSERT INTO a VALUES (1);
INSERT INTO a VALUES (2, ;
INSERT INTO b VALUES ('multi
line');
";
        let mut records = InsertRecords::new(StatementReader::new(dump.as_bytes()));

        let first = records.next().expect("item").expect("record");
        assert_eq!(first.table, "a");

        match records.next() {
            Some(Err(DumpError::StatementParse { line, .. })) => assert_eq!(line, 4),
            other => panic!("expected a parse error, got {other:?}"),
        }

        let third = records.next().expect("item").expect("record");
        assert_eq!(third.table, "b");
        assert_eq!(third.rows[0], vec![text("multi\nline")]);

        assert!(records.next().is_none());
        assert_eq!(records.statements_seen(), 4);
        assert_eq!(records.ignored(), 1);
        assert_eq!(records.lines_read(), 6);
    }
}
