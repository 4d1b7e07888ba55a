// Conversion pipeline: stream INSERT records out of the dump and hand them to
// the per-table writer. Malformed statements are skipped with a warning and
// a failing table never stops the others.

use crate::error::DumpError;
use crate::logger;
use crate::parser::insert::InsertRecords;
use crate::parser::statement::StatementReader;
use crate::progress::ProgressManager;
use crate::writer::{OutputOptions, OutputWriter, TableSummary};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

const READER_CAPACITY: usize = 1024 * 1024;

#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    pub statements: usize,
    pub inserts: usize,
    pub ignored_statements: usize,
    pub malformed_statements: usize,
    pub lines: usize,
    pub rows_written: u64,
    pub rows_dropped: u64,
    pub elapsed_ms: u128,
    pub tables: Vec<TableSummary>,
}

impl Summary {
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.failed)
            .map(|t| t.table.as_str())
            .collect()
    }
}

/// Convert every INSERT of `input` into per-table files under `options.dir`.
///
/// Fails before writing anything when the input cannot be opened. Once
/// writing started, only read errors on the input abort the run; the
/// destinations opened so far are still flushed on that path.
pub fn convert_dump(
    input: &Path,
    options: &OutputOptions,
    progress: &ProgressManager,
) -> Result<Summary, DumpError> {
    let start = Instant::now();
    logger::debug(&format!("convert_dump: Opening file {}", input.display()));
    let file = File::open(input).map_err(|source| DumpError::InputNotFound {
        path: input.to_path_buf(),
        source,
    })?;

    let statements = StatementReader::new(BufReader::with_capacity(READER_CAPACITY, file))
        .with_progress(progress.new_file_bar(input));
    let mut records = InsertRecords::new(statements);
    let mut writer = OutputWriter::create(options.clone())?;
    let mut summary = Summary::default();

    for item in records.by_ref() {
        match item {
            Ok(record) => {
                summary.inserts += 1;
                if let Err(e) = writer.emit(record) {
                    logger::error(&e.to_string());
                }
            }
            Err(e @ DumpError::StatementParse { .. }) => {
                summary.malformed_statements += 1;
                logger::warn(&format!("skipping {}", e));
            }
            // `writer` is dropped on this path, which flushes what it holds.
            Err(e) => return Err(e),
        }
    }

    summary.statements = records.statements_seen();
    summary.ignored_statements = records.ignored();
    summary.lines = records.lines_read();
    logger::debug(&format!("convert_dump: closing {} table files", writer.table_count()));
    summary.tables = writer.close();
    summary.rows_written = summary.tables.iter().map(|t| t.rows).sum();
    summary.rows_dropped = summary.tables.iter().map(|t| t.dropped_rows).sum();
    summary.elapsed_ms = start.elapsed().as_millis();

    logger::debug(&format!(
        "convert_dump: {} statements, {} inserts, {} rows into {} tables in {:?}",
        summary.statements,
        summary.inserts,
        summary.rows_written,
        summary.tables.len(),
        start.elapsed()
    ));
    Ok(summary)
}
