// sqldump2csv: split the INSERT statements of a SQL dump into one CSV file
// per table. Parsing streams the dump line by line; each table's file is
// opened on its first INSERT.

mod convert;
mod error;
mod logger;
mod parser;
mod progress;
mod writer;

use clap::{CommandFactory, Parser};
use convert::Summary;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use writer::OutputOptions;

// Command-line flags and positional arguments.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable debug logging (disables the progress bar).
    #[arg(long)]
    debug: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Directory for the per-table files (created if missing).
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Extension of the per-table files.
    #[arg(long, default_value = "csv")]
    extension: String,

    /// Terminate rows with CRLF instead of LF.
    #[arg(long)]
    crlf: bool,

    /// Write the run summary as JSON to this file.
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// SQL dump file to convert.
    dump: PathBuf,
}

fn main() -> ExitCode {
    if std::env::args().len() == 1 {
        if let Err(e) = write_usage(&mut io::stdout()) {
            logger::error(&format!("cannot print usage: {}", e));
        }
        eprintln!();
        return ExitCode::FAILURE;
    }
    let args = Args::parse();

    logger::set_debug(args.debug);
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            logger::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    logger::debug(&format!("main: Input file: {}", args.dump.display()));
    logger::debug(&format!("main: Output dir: {}", args.output_dir.display()));

    // Progress bars are disabled in debug mode to avoid mangled output.
    let progress = progress::ProgressManager::new(!args.debug && !args.no_progress);
    let options = OutputOptions {
        dir: args.output_dir,
        extension: args.extension.trim_start_matches('.').to_string(),
        crlf: args.crlf,
    };

    let summary = convert::convert_dump(&args.dump, &options, &progress)?;

    if let Some(path) = args.summary_json.as_ref() {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)?;
    }
    print_summary(&summary)?;

    let failed = summary.failed_tables();
    if !failed.is_empty() {
        logger::error(&format!(
            "{} table(s) could not be written: {}",
            failed.len(),
            failed.join(", ")
        ));
        return Ok(ExitCode::FAILURE);
    }
    logger::info(&format!(
        "wrote {} table file(s) to {}",
        summary.tables.len(),
        options.dir.display()
    ));
    Ok(ExitCode::SUCCESS)
}

fn write_usage<W: Write>(out: &mut W) -> io::Result<()> {
    Args::command().write_help(out)?;
    out.flush()
}

fn print_summary(summary: &Summary) -> io::Result<()> {
    let sep = "=".repeat(60);
    let mut stderr = io::stderr();
    writeln!(stderr, "\n{}\nSUMMARY\n{}", sep, sep)?;
    writeln!(stderr, "Statements: {}", summary.statements)?;
    writeln!(stderr, "Inserts:    {}", summary.inserts)?;
    writeln!(stderr, "Skipped:    {}", summary.malformed_statements)?;
    writeln!(stderr, "Ignored:    {}", summary.ignored_statements)?;
    writeln!(stderr, "Rows:       {}", summary.rows_written)?;
    if summary.rows_dropped > 0 {
        writeln!(stderr, "Dropped:    {}", summary.rows_dropped)?;
    }
    writeln!(stderr, "Tables:     {}", summary.tables.len())?;
    writeln!(stderr, "{}", sep)?;
    Ok(())
}
