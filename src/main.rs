//! Main entry point for the pyiunpack CLI application.
//!
//! Lists or extracts the archive embedded in a bundled executable and
//! reports the outcome through the process exit code.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use pyiunpack::cli::{EXIT_FATAL, exit_code};
use pyiunpack::{ArchiveExtractor, ArchiveParser, Cli, LocalFileReader, Summary, Toc};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let started = Instant::now();
    let reader = Arc::new(
        LocalFileReader::new(&cli.archive)
            .with_context(|| format!("cannot open {}", cli.archive.display()))?,
    );

    // Parse errors are fatal for the whole run
    let toc = match ArchiveParser::new(reader.clone()).parse().await {
        Ok(toc) => toc,
        Err(e) => {
            eprintln!("{}: {}", cli.archive.display(), e);
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    if cli.list {
        list_entries(&toc, cli.verbose);
        return Ok(ExitCode::SUCCESS);
    }

    let output_dir = cli.output_dir();
    let extractor = ArchiveExtractor::with_options(reader, cli.extract_options(started));

    let summary = match extractor.extract_all(&toc, &output_dir).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{}: {}", cli.archive.display(), e);
            if toc.is_partially_corrupt() {
                eprintln!("use --allow-partial or --skip-invalid to extract the readable entries");
            }
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    if !cli.is_quiet() {
        print_summary(&summary, &output_dir);
    }

    if let Some(report) = &cli.report {
        write_report(&summary, report)?;
    }

    Ok(ExitCode::from(exit_code(&summary)))
}

/// Print archive metadata and one line per TOC entry.
fn list_entries(toc: &Toc, verbose: bool) {
    println!("Python version: {}", toc.trailer.python_version());
    if verbose {
        println!("Runtime library: {}", toc.trailer.library_name());
        println!("Package length: {}", toc.trailer.package_length);
    }
    println!("Number of entries: {}", toc.entries.len());
    println!();

    println!(
        "{:>10}  {:>10}  {:>4}  {:<12}  Name",
        "Stored", "Length", "Cmpr", "Kind"
    );
    println!("{}", "-".repeat(70));

    for entry in &toc.entries {
        println!(
            "{:>10}  {:>10}  {:>4}  {:<12}  {}",
            entry.stored_length,
            entry.uncompressed_length,
            if entry.is_compressed { "yes" } else { "no" },
            format!("{:?}", entry.kind),
            entry.name
        );
    }

    for invalid in &toc.invalid {
        eprintln!("warning: {}", invalid.reason);
    }
}

/// Print the per-entry outcome table.
fn print_summary(summary: &Summary, output_dir: &Path) {
    for failure in &summary.failures {
        println!("  {:<20} {}", failure.kind.to_string(), failure.name);
        println!("  {:<20} {}", "", failure.message);
    }
    for name in &summary.skipped {
        println!("  {:<20} {}", "skipped", name);
    }

    println!(
        "\nExtracted {} of {} entries ({}) to {}",
        summary.succeeded,
        summary.requested,
        format_size(summary.total_bytes()),
        output_dir.display()
    );
    if !summary.failures.is_empty() {
        println!("{} entries failed", summary.failures.len());
    }
    if summary.timed_out {
        println!(
            "Timed out: {} entries were not started",
            summary.requested - summary.attempted - summary.skipped.len()
        );
    }
}

fn write_report(summary: &Summary, path: &Path) -> Result<()> {
    let json = summary.to_json().context("cannot serialize summary")?;
    std::fs::write(path, json).with_context(|| format!("cannot write report {}", path.display()))
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
