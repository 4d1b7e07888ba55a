// OutputWriter: owns one CSV destination per table, opened lazily on the
// table's first record. Every destination is flushed by close(), or by Drop
// when a run aborts before reaching close().

use crate::error::DumpError;
use crate::logger;
use crate::parser::{InsertRecord, Value};
use csv::{QuoteStyle, Terminator};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Serialize;
use std::borrow::Cow;
use std::fs::{self, File};
use std::path::PathBuf;

/// Where and how table files are written.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub dir: PathBuf,
    // Without the leading dot.
    pub extension: String,
    pub crlf: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            extension: "csv".to_string(),
            crlf: false,
        }
    }
}

/// Final state of one table's destination.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub file: PathBuf,
    pub header: bool,
    pub rows: u64,
    pub dropped_rows: u64,
    pub failed: bool,
}

type TableCsv = csv::Writer<File>;

struct TableOutput {
    path: PathBuf,
    // None once the destination failed (or could not be opened).
    writer: Option<TableCsv>,
    header: Option<Vec<String>>,
    arity: Option<usize>,
    rows: u64,
    dropped_rows: u64,
}

impl TableOutput {
    fn new(path: PathBuf, writer: Option<TableCsv>) -> Self {
        Self {
            path,
            writer,
            header: None,
            arity: None,
            rows: 0,
            dropped_rows: 0,
        }
    }

    fn write_header(&mut self, columns: Vec<String>) -> Result<(), csv::Error> {
        if let Some(w) = self.writer.as_mut() {
            write_fields(w, columns.iter().map(String::as_str))?;
        }
        self.arity = Some(columns.len());
        self.header = Some(columns);
        Ok(())
    }

    fn write_record(
        &mut self,
        table: &str,
        columns: Option<Vec<String>>,
        rows: &[Vec<Value>],
    ) -> Result<usize, csv::Error> {
        if self.writer.is_none() {
            logger::debug(&format!(
                "OutputWriter: {} destination failed earlier, dropping {} rows",
                table,
                rows.len()
            ));
            self.dropped_rows += rows.len() as u64;
            return Ok(0);
        }

        // Header goes out once, from the first record naming columns, and
        // only while the file holds no data rows yet.
        let mut order: Option<Vec<usize>> = None;
        if let Some(columns) = columns {
            if self.header.is_none() && self.arity.is_none() {
                self.write_header(columns)?;
            } else if let Some(header) = &self.header {
                if *header != columns {
                    match column_order(header, &columns) {
                        Some(idx) => order = Some(idx),
                        None => {
                            logger::warn(&format!(
                                "OutputWriter: {} skip {} rows (columns [{}] do not match header [{}])",
                                table,
                                rows.len(),
                                columns.join(", "),
                                header.join(", ")
                            ));
                            self.dropped_rows += rows.len() as u64;
                            return Ok(0);
                        }
                    }
                }
            } else {
                logger::debug(&format!(
                    "OutputWriter: {} already has positional rows, column list not used as header",
                    table
                ));
            }
        }

        let expected = *self.arity.get_or_insert(rows.first().map_or(0, Vec::len));
        let Some(writer) = self.writer.as_mut() else {
            return Ok(0);
        };
        let mut written = 0usize;
        for (i, row) in rows.iter().enumerate() {
            if row.len() != expected {
                logger::warn(&format!(
                    "OutputWriter: {} skip row (expected {} fields, got {})",
                    table,
                    expected,
                    row.len()
                ));
                self.dropped_rows += 1;
                continue;
            }
            let result = match &order {
                Some(idx) => write_fields(writer, idx.iter().map(|&j| row[j].as_field())),
                None => write_fields(writer, row.iter().map(Value::as_field)),
            };
            if let Err(e) = result {
                self.rows += written as u64;
                self.dropped_rows += (rows.len() - i) as u64;
                return Err(e);
            }
            written += 1;
        }
        self.rows += written as u64;
        Ok(written)
    }

    // Flush and release the destination; returns the flush error if any.
    fn release(&mut self) -> std::io::Result<()> {
        match self.writer.take() {
            Some(mut w) => w.flush(),
            None => Ok(()),
        }
    }
}

/// Per-table CSV serializer. Table state lives here, not in globals, so a
/// writer's lifetime bounds every file it opened.
pub struct OutputWriter {
    options: OutputOptions,
    tables: IndexMap<String, TableOutput>,
}

impl OutputWriter {
    pub fn create(options: OutputOptions) -> Result<Self, DumpError> {
        fs::create_dir_all(&options.dir).map_err(|source| DumpError::OutputDir {
            path: options.dir.clone(),
            source,
        })?;
        Ok(Self {
            options,
            tables: IndexMap::new(),
        })
    }

    /// Write one record's rows to its table file, opening it on first use.
    /// Returns the number of rows written. An error is scoped to the
    /// record's table: the table is marked failed and other tables go on.
    pub fn emit(&mut self, record: InsertRecord) -> Result<usize, DumpError> {
        let InsertRecord {
            table,
            columns,
            rows,
        } = record;

        let out = match self.tables.entry(table.clone()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let path = self.options.dir.join(format!(
                    "{}.{}",
                    file_stem(&table),
                    self.options.extension
                ));
                logger::debug(&format!(
                    "OutputWriter: opening {} for table {}",
                    path.display(),
                    table
                ));
                match writer_builder(&self.options).from_path(&path) {
                    Ok(w) => slot.insert(TableOutput::new(path, Some(w))),
                    Err(source) => {
                        slot.insert(TableOutput::new(path, None)).dropped_rows += rows.len() as u64;
                        return Err(DumpError::OutputWrite { table, source });
                    }
                }
            }
        };

        match out.write_record(&table, columns, &rows) {
            Ok(n) => Ok(n),
            Err(source) => {
                if let Err(e) = out.release() {
                    logger::debug(&format!("OutputWriter: {} flush after failure: {}", table, e));
                }
                Err(DumpError::OutputWrite { table, source })
            }
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Flush and release every destination, in first-seen order.
    pub fn close(mut self) -> Vec<TableSummary> {
        let tables = std::mem::take(&mut self.tables);
        let mut summaries = Vec::with_capacity(tables.len());
        for (table, mut out) in tables {
            let mut failed = out.writer.is_none();
            if let Err(e) = out.release() {
                logger::error(&format!(
                    "OutputWriter: failed to flush {}: {}",
                    out.path.display(),
                    e
                ));
                failed = true;
            }
            summaries.push(TableSummary {
                table,
                file: out.path,
                header: out.header.is_some(),
                rows: out.rows,
                dropped_rows: out.dropped_rows,
                failed,
            });
        }
        summaries
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        for (table, out) in self.tables.iter_mut() {
            if let Err(e) = out.release() {
                logger::error(&format!("OutputWriter: failed to flush {}: {}", table, e));
            }
        }
    }
}

// Quoting is done in quote_field (it also quotes on `'`), so the csv
// writer itself never quotes.
fn writer_builder(options: &OutputOptions) -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(b',')
        .quote_style(QuoteStyle::Never)
        .flexible(true)
        .terminator(if options.crlf {
            Terminator::CRLF
        } else {
            Terminator::Any(b'\n')
        });
    builder
}

fn write_fields<'a, I>(writer: &mut TableCsv, fields: I) -> Result<(), csv::Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let quoted: Vec<Cow<'a, str>> = fields.into_iter().map(quote_field).collect();
    writer.write_record(quoted.iter().map(|f| f.as_bytes()))
}

// RFC 4180 quoting; a field containing the delimiter, either quote
// character, or a line break is wrapped in `"` with `"` doubled.
fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\'', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

// Map each header column to its index in `columns`; None unless both hold
// the same set of names (exact match first, then case-insensitive).
fn column_order(header: &[String], columns: &[String]) -> Option<Vec<usize>> {
    if header.len() != columns.len() {
        return None;
    }
    header
        .iter()
        .map(|h| {
            columns
                .iter()
                .position(|c| c == h)
                .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(h)))
        })
        .collect()
}

// Table names made of [A-Za-z0-9_-] are used as-is; anything else is
// sanitized and suffixed with a short hash so names stay distinct and
// never leave the output directory.
fn file_stem(name: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if !name.is_empty() && name.chars().all(is_safe) {
        return name.to_string();
    }
    let mut out: String = name
        .chars()
        .map(|c| if is_safe(c) { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push_str("table");
    }
    let sum = blake3::hash(name.as_bytes());
    format!("{}_{}", out, hex::encode(&sum.as_bytes()[..4]))
}
