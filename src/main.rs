//! fsinv - Whole-filesystem inventory to CSV.
//!
//! Usage:
//!   fsinv scan [--root /] [-o file_inventory.csv]   Inventory every local file
//!   fsinv mounts                                    Show mount classification
//!   fsinv timeline file_inventory.csv               Files per month
//!   fsinv --help                                    Show help

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fsinventory_analyze::{TimeField, TimelineAnalyzer, TimelineConfig, TimelineReport};
use fsinventory_core::{
    CancelToken, ExcludedFsTypes, InventoryConfig, InventoryError, PathPolicy,
};
use fsinventory_output::{InventoryRunner, RunStatus, RunSummary};
use fsinventory_scan::{MountTable, ScanProgress};

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "fsinv",
    version,
    about = "Whole-filesystem inventory scanner",
    long_about = "fsinv walks a filesystem, skips virtual and remote mounts, and \
                  streams one CSV row per file (and optionally per directory) \
                  with bounded memory."
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inventory a filesystem tree into CSV
    Scan(ScanArgs),

    /// Show the mount table and how each mount is classified
    Mounts {
        #[command(flatten)]
        exclusions: ExclusionArgs,
    },

    /// Summarize an inventory by month
    Timeline {
        /// Inventory CSV to read
        #[arg(default_value = "file_inventory.csv")]
        csv: PathBuf,

        /// Timestamp to group by
        #[arg(long, default_value = "modified")]
        field: FieldArg,

        /// Only include files from the last N years
        #[arg(long)]
        years: Option<u32>,

        /// Largest files listed per month
        #[arg(long, default_value = "3")]
        samples: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Directory to inventory
    #[arg(long, default_value = "/")]
    root: PathBuf,

    /// CSV file to write
    #[arg(short, long, default_value = "file_inventory.csv")]
    output: PathBuf,

    /// Records per write batch
    #[arg(short, long, default_value = "10000")]
    chunk_size: usize,

    /// Also emit one row per directory with its subtree size
    #[arg(long)]
    aggregate: bool,

    /// Omit the change_time column
    #[arg(long)]
    no_change_time: bool,

    /// How names that are not printable ASCII are written
    #[arg(long, default_value = "lossy")]
    path_policy: PolicyArg,

    /// Run without root privileges (unreadable directories are skipped)
    #[arg(long)]
    allow_unprivileged: bool,

    #[command(flatten)]
    exclusions: ExclusionArgs,
}

#[derive(Args)]
struct ExclusionArgs {
    /// Base set of excluded filesystem types
    #[arg(long, default_value = "standard")]
    exclude_set: ExcludeSet,

    /// Additional filesystem type to exclude (repeatable)
    #[arg(long = "exclude-fs", value_name = "TYPE")]
    exclude_fs: Vec<String>,
}

impl ExclusionArgs {
    fn to_excluded(&self) -> ExcludedFsTypes {
        let base = match self.exclude_set {
            ExcludeSet::Standard => ExcludedFsTypes::standard(),
            ExcludeSet::Remote => ExcludedFsTypes::remote_only(),
            ExcludeSet::None => ExcludedFsTypes::none(),
        };
        self.exclude_fs
            .iter()
            .fold(base, |set, fs_type| set.with_type(fs_type.as_str()))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ExcludeSet {
    /// Virtual, pseudo and network filesystems
    #[default]
    Standard,
    /// Network filesystems only
    Remote,
    /// Exclude nothing
    None,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum PolicyArg {
    /// Replace undecodable bytes with U+FFFD
    #[default]
    Lossy,
    /// Percent-escape bytes outside printable ASCII (reversible)
    Percent,
}

impl From<PolicyArg> for PathPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Lossy => PathPolicy::Lossy,
            PolicyArg::Percent => PathPolicy::Percent,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum FieldArg {
    #[default]
    Modified,
    Accessed,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan(args) => run_scan(args).await,
        Command::Mounts { exclusions } => {
            run_mounts(&exclusions)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Timeline {
            csv,
            field,
            years,
            samples,
            format,
        } => {
            run_timeline(&csv, field, years, samples, format)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fsinv={level},fsinventory={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run an inventory, cancelling cleanly on Ctrl-C.
async fn run_scan(args: ScanArgs) -> Result<ExitCode> {
    require_privilege(is_privileged(), args.allow_unprivileged)?;

    let config = InventoryConfig::builder()
        .root(args.root)
        .output(args.output)
        .batch_size(args.chunk_size)
        .aggregate_directories(args.aggregate)
        .track_change_time(!args.no_change_time)
        .path_policy(PathPolicy::from(args.path_policy))
        .excluded_fs_types(args.exclusions.to_excluded())
        .build()
        .map_err(InventoryError::from)?;
    let output = config.output.clone();

    info!(
        root = %config.root.display(),
        output = %output.display(),
        batch_size = config.batch_size,
        aggregate = config.aggregate_directories,
        "Starting inventory"
    );

    let runner = InventoryRunner::new();
    let progress = tokio::spawn(log_progress(runner.subscribe()));

    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let mut job = tokio::task::spawn_blocking(move || runner.run(&config, worker_cancel));

    let joined = tokio::select! {
        joined = &mut job => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, writing buffered records and stopping");
            cancel.cancel();
            job.await
        }
    };
    let summary = joined
        .context("Inventory worker stopped unexpectedly")?
        .context("Inventory failed")?;
    let _ = progress.await;

    print_summary(&summary, &output);

    if summary.status == RunStatus::Cancelled {
        warn!(
            records = summary.writer.records_written,
            "Inventory interrupted; CSV holds a partial inventory"
        );
    }
    Ok(ExitCode::from(exit_status(&summary.status)))
}

/// Process exit status for a finished run.
fn exit_status(status: &RunStatus) -> u8 {
    match status {
        RunStatus::Complete => 0,
        RunStatus::Cancelled => EXIT_INTERRUPTED,
        RunStatus::Failed { .. } => 1,
    }
}

/// Log broadcast progress until the walk's sender goes away.
async fn log_progress(mut rx: broadcast::Receiver<ScanProgress>) {
    loop {
        match rx.recv().await {
            Ok(progress) => info!(
                files = progress.files,
                directories = progress.directories,
                size = %format_size(progress.bytes),
                rate = %format!("{:.0} files/s", progress.files_per_second()),
                current = %progress.current_path.display(),
                "Progress"
            ),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_summary(summary: &RunSummary, output: &Path) {
    let stats = &summary.stats;

    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {}",
        summary.root.display(),
        format_size(stats.total_size)
    );
    println!(
        " {} files, {} directories",
        stats.files, stats.directories
    );
    println!(
        " {} records written to {} in {} batch(es)",
        summary.writer.records_written,
        output.display(),
        summary.writer.batches_written
    );
    if stats.pruned_mounts > 0 {
        println!(" {} excluded mount(s) pruned", stats.pruned_mounts);
    }
    if stats.skipped_directories + stats.skipped_entries > 0 {
        println!(
            " {} unreadable directories, {} unreadable entries skipped",
            stats.skipped_directories, stats.skipped_entries
        );
    }
    if let Some(manifest) = &summary.manifest {
        println!(" Manifest: {}", manifest.display());
    }
    let status = match &summary.status {
        RunStatus::Complete => "complete",
        RunStatus::Cancelled => "cancelled",
        RunStatus::Failed { .. } => "failed",
    };
    println!(
        " Finished ({status}) in {:.2}s",
        summary.elapsed.as_secs_f64()
    );
    println!("{}", "─".repeat(60));

    if summary.warnings > 0 {
        println!();
        println!("{} warning(s) during scan", summary.warnings);
    }
}

/// Print the live mount table.
fn run_mounts(exclusions: &ExclusionArgs) -> Result<()> {
    let table = MountTable::load(&exclusions.to_excluded()).context("Cannot read mount table")?;

    println!("{:<10} {:<14} MOUNT POINT", "STATUS", "TYPE");
    for entry in table.entries() {
        let status = if entry.excluded { "excluded" } else { "scannable" };
        println!(
            "{:<10} {:<14} {}",
            status,
            truncate(&entry.fs_type, 14),
            entry.mount_point.display()
        );
    }
    println!();
    println!(
        "{} mount(s), {} excluded",
        table.len(),
        table.entries().iter().filter(|e| e.excluded).count()
    );
    Ok(())
}

/// Print files per month from a persisted inventory.
fn run_timeline(
    csv: &Path,
    field: FieldArg,
    years: Option<u32>,
    samples: usize,
    format: OutputFormat,
) -> Result<()> {
    let config = TimelineConfig::builder()
        .field(match field {
            FieldArg::Modified => TimeField::Modified,
            FieldArg::Accessed => TimeField::Accessed,
        })
        .since_years(years)
        .samples_per_bucket(samples)
        .build()
        .context("Invalid timeline settings")?;

    let report = TimelineAnalyzer::with_config(config)
        .analyze_path(csv)
        .with_context(|| format!("Cannot analyze {}", csv.display()))?;

    match format {
        OutputFormat::Text => print_timeline(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_timeline(report: &TimelineReport) {
    if report.buckets.is_empty() {
        println!("No dated files in the inventory.");
        return;
    }

    let peak = report.busiest_month().map_or(1, |b| b.file_count.max(1));

    println!(
        "Files by {} month",
        match report.field {
            TimeField::Modified => "modification",
            TimeField::Accessed => "access",
        }
    );
    if let Some(since) = report.since {
        println!("Since {}", since.format("%Y-%m-%d"));
    }
    println!("{}", "─".repeat(60));

    for bucket in &report.buckets {
        let ratio = bucket.file_count as f64 / peak as f64;
        println!(
            " {}  {} {:>9} files {:>10}",
            bucket.month,
            make_bar(ratio, 20),
            bucket.file_count,
            format_size(bucket.total_size)
        );
        for sample in &bucket.samples {
            println!(
                "            {:>10}  {}",
                format_size(sample.size),
                truncate(&sample.path, 60)
            );
        }
    }

    println!("{}", "─".repeat(60));
    println!(
        " {} files, {} total",
        report.total_files,
        format_size(report.total_size)
    );
    if report.undated_files > 0 {
        println!(" {} file(s) without a usable timestamp", report.undated_files);
    }
    if report.outside_window > 0 {
        println!(" {} file(s) older than the window", report.outside_window);
    }
}

/// Refuse a whole-filesystem scan without root unless explicitly allowed.
fn require_privilege(privileged: bool, allow_unprivileged: bool) -> Result<()> {
    if !privileged && !allow_unprivileged {
        bail!(
            "fsinv must run as root to inventory the whole filesystem \
             (pass --allow-unprivileged to scan anyway)"
        );
    }
    Ok(())
}

/// Whether the process runs with an effective uid of 0.
#[cfg(unix)]
fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_privileged() -> bool {
    false
}

fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{keep}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_privilege() {
        assert!(require_privilege(true, false).is_ok());
        assert!(require_privilege(false, true).is_ok());
        assert!(require_privilege(false, false).is_err());
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&RunStatus::Complete), 0);
        assert_eq!(exit_status(&RunStatus::Cancelled), 130);
        assert_eq!(
            exit_status(&RunStatus::Failed {
                message: "disk full".into()
            }),
            1
        );
    }

    #[test]
    fn test_zero_batch_size_is_a_config_error() {
        let err = InventoryConfig::builder()
            .batch_size(0usize)
            .build()
            .map_err(InventoryError::from)
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidConfig { .. }));
    }
}
