use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::archive::{DEFAULT_MAX_ENTRY_SIZE, ExtractOptions, Summary};

/// Exit code for a fully successful run.
pub const EXIT_OK: u8 = 0;
/// Exit code when the archive cannot be parsed or is refused as a whole.
pub const EXIT_FATAL: u8 = 1;
/// Exit code when at least one entry failed or the deadline expired.
pub const EXIT_ENTRY_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "pyiunpack")]
#[command(version)]
#[command(about = "Extract the embedded archive of a PyInstaller-style bundle", long_about = None)]
#[command(after_help = "Examples:\n  \
  pyiunpack app.exe                      extract into app.exe_extracted\n  \
  pyiunpack -l app.exe                   list entries without extracting\n  \
  pyiunpack app.exe -o out --report r.json   extract into out, write a JSON report")]
pub struct Cli {
    /// Bundled executable to read
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Extract into DIR (default: <ARCHIVE>_extracted)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Extract even if some TOC entries point outside the file
    #[arg(long)]
    pub allow_partial: bool,

    /// Do not attempt entries that point outside the file (implies --allow-partial)
    #[arg(long)]
    pub skip_invalid: bool,

    /// List entries only
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Number of entries extracted concurrently
    #[arg(short = 'j', long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Stop starting new entries after SECS seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Write the extraction summary as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Refuse to inflate any entry beyond BYTES
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_ENTRY_SIZE)]
    pub max_entry_size: u64,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default `env_logger` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.is_very_quiet() {
            "off"
        } else if self.is_quiet() {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_dir(&self.archive))
    }

    /// Build extraction options; `started` anchors the `--timeout` deadline.
    pub fn extract_options(&self, started: Instant) -> ExtractOptions {
        let mut options = ExtractOptions::new()
            .allow_partial(self.allow_partial)
            .skip_invalid(self.skip_invalid)
            .jobs(self.jobs)
            .max_entry_size(self.max_entry_size);
        if let Some(secs) = self.timeout {
            options = options.deadline(started + Duration::from_secs(secs));
        }
        options
    }
}

/// `<archive>_extracted`, next to the archive.
pub fn default_output_dir(archive: &std::path::Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push("_extracted");
    PathBuf::from(name)
}

pub fn exit_code(summary: &Summary) -> u8 {
    if summary.is_success() {
        EXIT_OK
    } else {
        EXIT_ENTRY_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn parses_defaults() {
        let cli = Cli::parse_from(["pyiunpack", "dist/app.exe"]);
        assert_eq!(cli.archive, Path::new("dist/app.exe"));
        assert_eq!(cli.output_dir(), Path::new("dist/app.exe_extracted"));
        assert_eq!(cli.jobs, 1);
        assert!(!cli.allow_partial);
        assert_eq!(cli.log_filter(), "warn");

        let options = cli.extract_options(Instant::now());
        assert!(options.deadline.is_none());
        assert_eq!(options.max_entry_size, DEFAULT_MAX_ENTRY_SIZE);
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "pyiunpack",
            "app",
            "--output",
            "out",
            "--skip-invalid",
            "-j",
            "4",
            "--timeout",
            "30",
            "-qq",
        ]);
        assert_eq!(cli.output_dir(), Path::new("out"));
        assert_eq!(cli.log_filter(), "off");

        let started = Instant::now();
        let options = cli.extract_options(started);
        assert!(options.allow_partial);
        assert!(options.skip_invalid);
        assert_eq!(options.jobs, 4);
        assert_eq!(options.deadline, Some(started + Duration::from_secs(30)));
    }

    #[test]
    fn exit_code_follows_summary() {
        let mut summary = Summary::default();
        assert_eq!(exit_code(&summary), EXIT_OK);

        summary.timed_out = true;
        assert_eq!(exit_code(&summary), EXIT_ENTRY_FAILED);
    }
}
