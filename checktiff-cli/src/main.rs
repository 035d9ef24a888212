//! checktiff - validate TIFF files by decoding every strip and tile.

use anyhow::Context;
use checktiff::{
    SourceDescriptor, ValidateOptions, ValidationResult, Validator, DEFAULT_MESSAGE_LIMIT,
};
use clap::Parser;
use console::style;
use glob::glob;
use rayon::prelude::*;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Exit status when at least one file has errors.
const EXIT_INVALID: i32 = 1;

/// Exit status for unusable arguments.
const EXIT_USAGE: i32 = 2;

/// Display name for data read from standard input.
const STDIN_NAME: &str = "<stdin>";

/// Output mode for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    /// Per-file status lines with diagnostics.
    Normal,
    /// One JSON object per file plus a summary line.
    Json,
    /// Only the paths of invalid files.
    Quiet,
    /// Normal output plus sizes, timings and debug logging.
    Verbose,
}

/// Command-line arguments for the checktiff tool.
#[derive(Parser, Debug)]
#[command(name = "checktiff")]
#[command(version)]
#[command(about = "Validate TIFF files by decoding every strip and tile")]
#[command(long_about = "checktiff decodes every row (or tile) of each TIFF file and \n\
    reports every error and warning raised along the way.\n\n\
    Exit status is 0 when no file has errors, 1 otherwise and 2 for usage errors.\n\n\
    EXAMPLES:\n    \
    checktiff scan.tif\n    \
    checktiff 'archive/**/*.tif' --jobs 8\n    \
    checktiff --all-directories multipage.tif --json\n    \
    cat scan.tif | checktiff --stdin")]
struct Args {
    /// Files or glob patterns to validate (e.g., "scans/*.tif")
    files: Vec<String>,

    /// Also validate one file read from standard input
    #[arg(long)]
    stdin: bool,

    /// Validate every image directory, not just the first
    #[arg(short = 'a', long)]
    all_directories: bool,

    /// Truncate diagnostics longer than this many bytes
    #[arg(long, default_value_t = DEFAULT_MESSAGE_LIMIT)]
    max_message_len: usize,

    /// Number of files to validate in parallel
    #[arg(short = 'j', long, default_value = "1")]
    jobs: usize,

    /// Verbose output (sizes, timings and debug logging)
    #[arg(short, long, conflicts_with = "quiet", conflicts_with = "json")]
    verbose: bool,

    /// Quiet mode (only print paths of invalid files)
    #[arg(short, long, conflicts_with = "verbose", conflicts_with = "json")]
    quiet: bool,

    /// JSON output mode for programmatic parsing
    #[arg(long, conflicts_with = "verbose", conflicts_with = "quiet")]
    json: bool,
}

impl Args {
    /// Determine the output mode based on flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else if self.verbose {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        }
    }

    /// Validation options selected by flags.
    fn validate_options(&self) -> ValidateOptions {
        ValidateOptions::new()
            .all_directories(self.all_directories)
            .message_limit(self.max_message_len)
    }
}

/// Something to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// File on disk.
    File(PathBuf),
    /// Bytes read from standard input.
    Stdin(Vec<u8>),
}

impl Target {
    fn display_name(&self) -> String {
        match self {
            Target::File(path) => path.display().to_string(),
            Target::Stdin(_) => STDIN_NAME.to_string(),
        }
    }
}

/// Validation outcome for one file.
#[derive(Debug, Clone, Serialize)]
struct FileReport {
    /// Type of message.
    #[serde(rename = "type")]
    msg_type: &'static str,
    /// File path, or `<stdin>`.
    file: String,
    /// Whether no errors were raised.
    valid: bool,
    /// Size of the input in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    /// Time spent validating.
    elapsed_seconds: f64,
    /// Captured diagnostics.
    #[serde(flatten)]
    result: ValidationResult,
}

/// Totals over all files.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct Summary {
    /// Type of message.
    #[serde(rename = "type")]
    msg_type: &'static str,
    /// Files validated.
    total: usize,
    /// Files without errors.
    valid: usize,
    /// Files with errors.
    invalid: usize,
    /// Warnings across all files.
    warnings: usize,
    /// Wall-clock time in seconds.
    elapsed_seconds: f64,
}

impl Summary {
    fn from_reports(reports: &[FileReport], elapsed: Duration) -> Self {
        let valid = reports.iter().filter(|r| r.valid).count();
        Summary {
            msg_type: "summary",
            total: reports.len(),
            valid,
            invalid: reports.len() - valid,
            warnings: reports.iter().map(|r| r.result.warnings.len()).sum(),
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }
}

/// Check whether an argument is a glob pattern rather than a path.
fn is_pattern(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Expand glob patterns into files.
///
/// Plain paths are kept as given, missing or not, so that they are reported
/// as unreadable. A pattern matching nothing is kept the same way.
fn expand_inputs(args: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for arg in args {
        if !is_pattern(arg) {
            files.push(PathBuf::from(arg));
            continue;
        }

        let mut matched = 0usize;
        for entry in glob(arg).with_context(|| format!("Invalid glob pattern: {}", arg))? {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        files.push(path);
                        matched += 1;
                    }
                }
                Err(e) => {
                    warn!("Error matching pattern: {}", e);
                }
            }
        }

        if matched == 0 {
            warn!("No files found matching pattern: {}", arg);
            files.push(PathBuf::from(arg));
        }
    }

    Ok(files)
}

/// Validate one target.
fn validate_target(validator: &Validator, target: &Target) -> FileReport {
    let start = Instant::now();
    let (result, size_bytes) = match target {
        Target::File(path) => (
            validator.validate(SourceDescriptor::Path(path)),
            std::fs::metadata(path).ok().map(|m| m.len()),
        ),
        Target::Stdin(data) => (
            validator.validate(SourceDescriptor::Buffer(data)),
            Some(data.len() as u64),
        ),
    };
    let elapsed = start.elapsed();
    let file = target.display_name();

    debug!(
        file = %file,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "validated"
    );

    FileReport {
        msg_type: "file",
        file,
        valid: result.is_valid(),
        size_bytes,
        elapsed_seconds: elapsed.as_secs_f64(),
        result,
    }
}

/// Validate all targets, in parallel when more than one job is requested.
///
/// Reports come back in input order.
fn validate_all(args: &Args, targets: &[Target]) -> anyhow::Result<Vec<FileReport>> {
    let validator = Validator::new(args.validate_options());
    let jobs = args.jobs.max(1);

    if jobs == 1 || targets.len() < 2 {
        return Ok(targets.iter().map(|t| validate_target(&validator, t)).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to build thread pool")?;
    Ok(pool.install(|| {
        targets
            .par_iter()
            .map(|t| validate_target(&validator, t))
            .collect()
    }))
}

/// Format `count` with a singular or plural noun.
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// One-line description of a result.
fn describe(result: &ValidationResult) -> String {
    match (result.errors.len(), result.warnings.len()) {
        (0, 0) => "OK".to_string(),
        (0, w) => plural(w, "warning"),
        (e, 0) => plural(e, "error"),
        (e, w) => format!("{}, {}", plural(e, "error"), plural(w, "warning")),
    }
}

/// Format bytes as human-readable size.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Print one report in the selected mode.
fn print_report(report: &FileReport, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            println!("{}", serde_json::to_string(report)?);
        }
        OutputMode::Quiet => {
            if !report.valid {
                println!("{}", report.file);
            }
        }
        OutputMode::Normal | OutputMode::Verbose => {
            let status = if !report.valid {
                style("✗").red()
            } else if !report.result.warnings.is_empty() {
                style("!").yellow()
            } else {
                style("✓").green()
            };

            if mode == OutputMode::Verbose {
                let size = report
                    .size_bytes
                    .map(format_size)
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "  {} {} ({}; {}, {:.3}s)",
                    status,
                    report.file,
                    describe(&report.result),
                    size,
                    report.elapsed_seconds
                );
            } else {
                println!("  {} {} ({})", status, report.file, describe(&report.result));
            }

            for error in &report.result.errors {
                println!("      {} {}", style("error:").red(), error);
            }
            for warning in &report.result.warnings {
                println!("      {} {}", style("warning:").yellow(), warning);
            }
        }
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!();
    println!("{}", style("Summary:").cyan().bold());
    println!("  Total:    {}", plural(summary.total, "file"));
    println!("  Valid:    {}", style(summary.valid).green());
    if summary.invalid > 0 {
        println!("  Invalid:  {}", style(summary.invalid).red());
    }
    if summary.warnings > 0 {
        println!("  Warnings: {}", style(summary.warnings).yellow());
    }
    println!("  Time:     {:.2}s", summary.elapsed_seconds);
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("+---------------------------------------------+").cyan()
    );
    println!(
        "{}  {}  {}",
        style("|").cyan(),
        style("CHECKTIFF").cyan().bold(),
        style("                               |").cyan()
    );
    println!(
        "{}  {}  {}",
        style("|").cyan(),
        style("Full-scan TIFF validation").white(),
        style("               |").cyan()
    );
    println!(
        "{}",
        style("+---------------------------------------------+").cyan()
    );
    println!();
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    let output_mode = args.output_mode();

    // Initialize logging (not in JSON or quiet mode)
    if output_mode != OutputMode::Json && output_mode != OutputMode::Quiet {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(if args.verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            })
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    if args.files.is_empty() && !args.stdin {
        eprintln!(
            "{} No input files; pass FILES or --stdin",
            style("Error:").red().bold()
        );
        std::process::exit(EXIT_USAGE);
    }

    let mut targets: Vec<Target> = match expand_inputs(&args.files) {
        Ok(files) => files.into_iter().map(Target::File).collect(),
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(EXIT_USAGE);
        }
    };

    if args.stdin {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read standard input")?;
        targets.push(Target::Stdin(data));
    }

    // Print header (only in normal/verbose mode)
    if output_mode == OutputMode::Normal || output_mode == OutputMode::Verbose {
        print_header();
    }

    debug!(files = targets.len(), jobs = args.jobs, "starting validation");

    let start = Instant::now();
    let reports = validate_all(&args, &targets)?;
    for report in &reports {
        print_report(report, output_mode)?;
    }

    let summary = Summary::from_reports(&reports, start.elapsed());
    match output_mode {
        OutputMode::Json => println!("{}", serde_json::to_string(&summary)?),
        OutputMode::Normal | OutputMode::Verbose => print_summary(&summary),
        OutputMode::Quiet => {}
    }

    if summary.invalid > 0 {
        std::process::exit(EXIT_INVALID);
    }
    Ok(())
}
