//! Reusable CLI runner: installs logging, dispatches the parsed command and prints its
//! outcome. `main` only maps the result to an exit code.

use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::cli::{self, Args, Commands};
use crate::compress::{self, AddSummary};
use crate::extract::{self, Action, ArchiveReport, Layout};

/// What a finished command amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// The command ran to the end, but some entries failed or the archive ended early.
    Partial,
}

/// Sets up `tracing` on stderr. `ZLITE_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("ZLITE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    // a second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn print_add_summary(archive: &Path, summary: &AddSummary, started: Instant) {
    let ratio = if summary.bytes_in > 0 {
        summary.bytes_out as f64 / summary.bytes_in as f64 * 100.0
    } else {
        0.0
    };
    println!(
        "Created {}: {} entries ({} files, {} hard links, {} symlinks, {} dirs)",
        archive.display(),
        summary.entries,
        summary.files,
        summary.hardlinks,
        summary.symlinks,
        summary.dirs
    );
    println!(
        "{} -> {} bytes ({:.1}%) in {:.2?}",
        summary.bytes_in,
        summary.bytes_out,
        ratio,
        started.elapsed()
    );
}

fn print_report(report: &ArchiveReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, report)?;
        writeln!(out)?;
        return Ok(());
    }
    if report.operation == "list" {
        extract::write_listing(report, &mut out)?;
        return Ok(());
    }
    for entry in report.entries.iter().filter(|e| e.status.is_failed()) {
        if let extract::EntryStatus::Failed(e) = &entry.status {
            writeln!(out, "FAILED {}: {e}", entry.path)?;
        }
    }
    if let Some(e) = &report.format_error {
        writeln!(out, "Archive ends early ({} entries unread): {e}", report.unread)?;
    }
    writeln!(
        out,
        "{} {}: {} entries, {} failed ({:?} format)",
        report.operation,
        report.archive.display(),
        report.entries.len(),
        report.failed(),
        report.format
    )?;
    Ok(())
}

fn report_status(report: &ArchiveReport) -> RunStatus {
    if report.is_clean() {
        RunStatus::Success
    } else {
        RunStatus::Partial
    }
}

fn run_read(archive: &Path, action: Action<'_>, json: bool) -> Result<RunStatus, Box<dyn std::error::Error>> {
    let report = extract::run(archive, action)?;
    print_report(&report, json)?;
    Ok(report_status(&report))
}

/// Executes one parsed command.
pub fn dispatch(command: &Commands) -> Result<RunStatus, Box<dyn std::error::Error>> {
    match command {
        Commands::Add { archive, inputs, .. } => {
            let options = command.compress_options().unwrap_or_default();
            let started = Instant::now();
            let summary = compress::run(inputs, archive, &options)?;
            print_add_summary(archive, &summary, started);
            Ok(RunStatus::Success)
        }
        Commands::Extract { archive, output } => run_read(
            archive,
            Action::Extract { output, layout: Layout::FullPaths },
            false,
        ),
        Commands::ExtractFlat { archive, output } => {
            run_read(archive, Action::Extract { output, layout: Layout::Flat }, false)
        }
        Commands::List { archive, json } => run_read(archive, Action::List, *json),
        Commands::Test { archive, json } => run_read(archive, Action::Test, *json),
    }
}

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<RunStatus, Box<dyn std::error::Error>> {
    let Args { verbose, command } = cli::run()?;
    init_logging(verbose);
    dispatch(&command)
}
