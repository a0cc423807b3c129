use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flup_tracker::services::{archive, staging};
use flup_tracker::{AmendmentLedger, ImportOptions, LoopKind, TrackerConfig, TrackerError};

#[derive(Parser)]
#[command(
    name = "flup-tracker",
    about = "Amendment log and archive manager for fLup loop histories"
)]
struct Cli {
    /// Directory holding live logs, archives, and config
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Mint a new closed-loop instance
    CreateCflup,
    /// List closed-loop instances with amendment counts
    ListCflups,
    /// Print one category's state summary
    LoopStatus { category: String },
    /// List rotated archive files, most recent first
    ListLoopArchives { category: Option<String> },
    /// Export a category's full history as one bundle
    ExportLoopArchive {
        category: String,
        out_file: Option<PathBuf>,
    },
    /// Merge or replace a category's history from an exported bundle
    ImportLoopArchive {
        path: PathBuf,
        /// Overwrite the live log instead of merging
        #[arg(long)]
        replace: bool,
        /// Skip per-entry field validation
        #[arg(long)]
        no_validate: bool,
        /// Leave instance counters untouched
        #[arg(long)]
        no_counters: bool,
    },
    /// Import several bundles in turn, reporting per-file outcomes
    ImportMultipleArchives {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        no_validate: bool,
        #[arg(long)]
        no_counters: bool,
    },
    /// Read-only integrity check of a bundle
    ValidateArchive { path: PathBuf },
    /// Per-category byte and file totals
    ArchiveUsage,
    /// Aggregate counts across all categories
    Status,
}

// Exit codes: 0 success, 1 I/O or unexpected failure, 2 validation
// failure, 3 nothing-to-export / not found.
const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID: u8 = 2;
const EXIT_EMPTY: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = TrackerConfig::load(&cli.data_dir)
        .map(|c| c.verbose)
        .unwrap_or(false);
    init_tracing(verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<TrackerError>() {
        Some(TrackerError::Validation { .. }) | Some(TrackerError::UnknownCategory(_)) => {
            ExitCode::from(EXIT_INVALID)
        }
        Some(TrackerError::NotFound { .. }) => ExitCode::from(EXIT_EMPTY),
        _ => ExitCode::from(EXIT_FAILURE),
    }
}

fn parse_kind(tag: &str) -> Result<LoopKind, TrackerError> {
    LoopKind::from_tag(tag).ok_or_else(|| TrackerError::UnknownCategory(tag.to_string()))
}

fn run(cli: Cli) -> Result<ExitCode> {
    let data_dir = cli.data_dir;
    match cli.cmd {
        None => service_pass(&data_dir),
        Some(Cmd::CreateCflup) => {
            let mut ledger = AmendmentLedger::open(&data_dir)?;
            let id = ledger.create_instance(LoopKind::Closed)?;
            println!("created {id}");
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::ListCflups) => {
            let ledger = AmendmentLedger::open(&data_dir)?;
            let instances = ledger.instances(LoopKind::Closed);
            for inst in &instances {
                println!(
                    "{}  created {}  {} amendment(s)",
                    inst.id,
                    inst.created.to_rfc3339(),
                    inst.amendment_count
                );
            }
            println!("{} instance(s) total", instances.len());
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::LoopStatus { category }) => {
            let kind = parse_kind(&category)?;
            let ledger = AmendmentLedger::open(&data_dir)?;
            print_category_status(&ledger, kind);
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::ListLoopArchives { category }) => {
            let kind = category.as_deref().map(parse_kind).transpose()?;
            let infos = archive::list_archives(&data_dir, kind)?;
            if infos.is_empty() {
                println!("no rotated archives");
            }
            for info in &infos {
                println!(
                    "{}  [{}]  {} entries  {} bytes",
                    info.path.display(),
                    info.category,
                    info.entries,
                    info.bytes
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::ExportLoopArchive { category, out_file }) => {
            let kind = parse_kind(&category)?;
            let outcome = archive::export_archive(&data_dir, kind, out_file)?;
            println!(
                "exported {} entries to {}",
                outcome.total_entries,
                outcome.path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::ImportLoopArchive {
            path,
            replace,
            no_validate,
            no_counters,
        }) => {
            let mut ledger = AmendmentLedger::open(&data_dir)?;
            let options = ImportOptions {
                merge: !replace,
                validate: !no_validate,
                update_counters: !no_counters,
            };
            let outcome = archive::import_archive(&mut ledger, &path, options)
                .with_context(|| format!("importing {}", path.display()))?;
            print_import_outcome(&path, &outcome);
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::ImportMultipleArchives {
            paths,
            replace,
            no_validate,
            no_counters,
        }) => {
            let mut ledger = AmendmentLedger::open(&data_dir)?;
            let options = ImportOptions {
                merge: !replace,
                validate: !no_validate,
                update_counters: !no_counters,
            };
            let mut failures = 0usize;
            for path in &paths {
                match archive::import_archive(&mut ledger, path, options) {
                    Ok(outcome) => print_import_outcome(path, &outcome),
                    Err(e) => {
                        println!("{}: FAILED: {e}", path.display());
                        failures += 1;
                    }
                }
            }
            println!(
                "imported {}/{} bundle(s)",
                paths.len() - failures,
                paths.len()
            );
            if failures > 0 {
                Ok(ExitCode::from(EXIT_FAILURE))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Some(Cmd::ValidateArchive { path }) => {
            let report = archive::validate_archive(&path)?;
            println!(
                "{}: category '{}', {} entries ({} valid, {} invalid)",
                path.display(),
                report.category,
                report.total_entries,
                report.valid_entries,
                report.invalid_entries
            );
            for problem in &report.problems {
                println!("  {problem}");
            }
            if !report.instance_ids.is_empty() {
                println!("instances: {}", report.instance_ids.join(", "));
            }
            if report.passed() {
                println!("bundle is valid");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("bundle is INVALID");
                Ok(ExitCode::from(EXIT_INVALID))
            }
        }
        Some(Cmd::ArchiveUsage) => {
            let usage = archive::archive_usage(&data_dir)?;
            for row in &usage {
                println!(
                    "{}: live {} bytes, {} archive file(s) totaling {} bytes ({} bytes overall)",
                    row.category,
                    row.live_bytes,
                    row.archive_files,
                    row.archive_bytes,
                    row.total_bytes()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Cmd::Status) => {
            let ledger = AmendmentLedger::open(&data_dir)?;
            print_status(&ledger);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// One pass: load state, drain externally-staged events, print state.
/// Staging trouble is reported but never aborts the pass.
fn service_pass(data_dir: &std::path::Path) -> Result<ExitCode> {
    let mut ledger = AmendmentLedger::open(data_dir)?;
    if ledger.config().staging_enabled {
        match staging::drain_staged(&mut ledger) {
            Ok(outcome) => {
                if outcome.appended + outcome.dropped + outcome.retained > 0 {
                    println!(
                        "staged events: {} appended, {} dropped, {} retained",
                        outcome.appended, outcome.dropped, outcome.retained
                    );
                }
            }
            Err(e) => tracing::warn!("staged-event pickup failed: {e}"),
        }
    }
    print_status(&ledger);
    Ok(ExitCode::SUCCESS)
}

fn print_status(ledger: &AmendmentLedger) {
    let mut total = 0usize;
    for status in ledger.status() {
        total += status.live_entries;
        match status.instance_count {
            Some(instances) => println!(
                "{}: {} live entries, {} instance(s), live log {} bytes",
                status.category, status.live_entries, instances, status.live_log_bytes
            ),
            None => println!(
                "{}: {} live entries, live log {} bytes",
                status.category, status.live_entries, status.live_log_bytes
            ),
        }
    }
    println!("{total} live entries across all categories");
}

fn print_category_status(ledger: &AmendmentLedger, kind: LoopKind) {
    let status = ledger.loop_status(kind);
    println!("category: {}", status.category);
    println!("live entries: {}", status.live_entries);
    if let Some(instances) = status.instance_count {
        println!("instances: {instances}");
    }
    match status.last_timestamp {
        Some(ts) => println!("last amendment: {}", ts.to_rfc3339()),
        None => println!("last amendment: none"),
    }
    println!("live log: {} bytes", status.live_log_bytes);
}

fn print_import_outcome(path: &std::path::Path, outcome: &archive::ImportOutcome) {
    let mode = if outcome.replaced { "replaced" } else { "merged" };
    print!(
        "{}: {mode} {} entries into '{}' ({} skipped)",
        path.display(),
        outcome.imported,
        outcome.category,
        outcome.skipped
    );
    match &outcome.backup {
        Some(backup) => println!(", backup at {}", backup.display()),
        None => println!(),
    }
}
