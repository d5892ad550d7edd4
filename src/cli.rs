//! `osxc` command-line front-end.
//!
//! Thin shell over the library: parses arguments, wires the engine from the
//! on-disk config, prints results. Exit codes: 0 success, 1 partial (errors
//! recorded), 2 usage error (clap's own), 3 audit/infrastructure failure.

#![allow(missing_docs)]

use std::io::Write as _;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::audit::event::{AuditQuery, EventCategory, EventResult};
use crate::audit::export::{self, ExportFormat};
use crate::audit::store::AuditStore;
use crate::cleaner::executor::CleanupEngine;
use crate::cleaner::{Request, TriggerKind, format_size};
use crate::core::config::Config;
use crate::core::errors::CleanerError;
use crate::core::paths::home_dir;
use crate::reports::parse_crash_reports;
use crate::safety::level::CleanupLevel;
use crate::scanner::ScanConfig;
use crate::snapshots::SnapshotService;

pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_INFRA: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "osxc", version, about = "Safety-classified disk cleanup")]
pub struct Cli {
    /// Path to the engine config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    Light,
    Normal,
    Deep,
    System,
}

impl From<LevelArg> for CleanupLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Light => Self::Light,
            LevelArg::Normal => Self::Normal,
            LevelArg::Deep => Self::Deep,
            LevelArg::System => Self::System,
        }
    }
}

impl std::fmt::Display for LevelArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(CleanupLevel::from(*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Jsonl,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => Self::Json,
            FormatArg::Jsonl => Self::JsonLines,
            FormatArg::Csv => Self::Csv,
        }
    }
}

impl std::fmt::Display for FormatArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a cleanup.
    Clean {
        #[arg(long, value_enum, default_value_t = LevelArg::Normal)]
        level: LevelArg,
        /// Account what would be freed without deleting anything.
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt (for scheduled invocations).
        #[arg(long)]
        non_interactive: bool,
        #[arg(long)]
        system_caches: bool,
        #[arg(long)]
        developer_caches: bool,
        #[arg(long)]
        browser_caches: bool,
        #[arg(long)]
        logs: bool,
        /// Extra paths to clean as custom targets.
        #[arg(long = "path")]
        paths: Vec<PathBuf>,
    },
    /// Measure a directory tree without touching it.
    Analyze {
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        min_size: u64,
        #[arg(long)]
        include_hidden: bool,
        #[arg(long)]
        max_depth: Option<usize>,
        /// How many of the largest/oldest entries to print.
        #[arg(long, default_value_t = 15)]
        top: usize,
    },
    /// Inspect or export the audit trail.
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Summarize crash/diagnostic reports in a directory.
    Reports { dir: PathBuf },
    /// List local snapshots of a volume.
    Snapshots {
        #[arg(default_value = "/")]
        volume: String,
    },
    /// Emit shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Query events.
    Query {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        result: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Oldest first instead of newest first.
        #[arg(long)]
        asc: bool,
    },
    /// Print the statistics report.
    Stats,
    /// Export events to a file.
    Export {
        #[arg(long, value_enum, default_value_t = FormatArg::Jsonl)]
        format: FormatArg,
        /// Destination; defaults to the exports directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Prune events past the retention window.
    Retention {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        vacuum: bool,
    },
    /// Show the database location and size.
    Path,
}

/// Entry point called from `main`; returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| home_dir().join(".config/osxcleaner/config.toml"));
    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return EXIT_USAGE;
        }
    };

    match dispatch(cli.command, &config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            match err {
                CleanerError::AuditOpen { .. }
                | CleanerError::AuditSchema { .. }
                | CleanerError::AuditInsert { .. }
                | CleanerError::AuditQuery { .. }
                | CleanerError::AuditUnavailable { .. } => EXIT_INFRA,
                CleanerError::EmptyTargetSet | CleanerError::InvalidConfig { .. } => EXIT_USAGE,
                _ => EXIT_PARTIAL,
            }
        }
    }
}

fn dispatch(command: Command, config: &Config) -> crate::core::errors::Result<i32> {
    match command {
        Command::Clean {
            level,
            dry_run,
            non_interactive,
            system_caches,
            developer_caches,
            browser_caches,
            logs,
            paths,
        } => {
            let mut request = Request::new(level.into());
            request.dry_run = dry_run;
            request.include_system_caches = system_caches;
            request.include_developer_caches = developer_caches;
            request.include_browser_caches = browser_caches;
            request.include_logs = logs;
            request.extra_paths = paths;
            request.trigger = if non_interactive {
                TriggerKind::Scheduled
            } else {
                TriggerKind::Manual
            };

            if !dry_run && !non_interactive && !confirm(level) {
                println!("aborted");
                return Ok(EXIT_OK);
            }

            let engine = CleanupEngine::from_config(config)?;
            let result = engine.clean(&request)?;
            println!("{}", result.summary());
            for error in &result.errors {
                eprintln!(
                    "  {} {}: {}",
                    "failed".yellow(),
                    error.path.display(),
                    error.reason
                );
            }
            Ok(if result.errors.is_empty() {
                EXIT_OK
            } else {
                EXIT_PARTIAL
            })
        }

        Command::Analyze {
            path,
            min_size,
            include_hidden,
            max_depth,
            top,
        } => {
            let scan_config = ScanConfig {
                min_size,
                include_hidden,
                max_depth,
                top_n: top,
                ..config.scanner.clone()
            };
            let engine = CleanupEngine::from_config(config)?;
            let result = engine.analyze(&path, &scan_config);

            println!(
                "{}: {} in {} files, {} directories ({} unreadable)",
                path.display(),
                format_size(result.total_size).bold(),
                result.file_count,
                result.dir_count,
                result.errors
            );
            for (category, agg) in &result.by_category {
                println!(
                    "  {category:<16} {:>10}  {} items",
                    format_size(agg.size),
                    agg.item_count
                );
            }
            if !result.largest.is_empty() {
                println!("largest:");
                for item in &result.largest {
                    println!("  {:>10}  {}", format_size(item.size), item.path.display());
                }
            }
            Ok(EXIT_OK)
        }

        Command::Audit { command } => run_audit(command, config),

        Command::Reports { dir } => {
            let analysis = parse_crash_reports(&dir);
            println!(
                "{} reports, {}",
                analysis.total_reports,
                format_size(analysis.total_size)
            );
            for (app, stats) in &analysis.by_app {
                let marker = if stats.has_repeated_crashes {
                    " (repeated)".red().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {app:<24} {:>4}x  {:>10}  latest {}{marker}",
                    stats.count,
                    format_size(stats.total_bytes),
                    stats.latest.format("%Y-%m-%d %H:%M"),
                );
            }
            println!(
                "older than 30 days: {} reports, {}",
                analysis.old_reports,
                format_size(analysis.old_bytes)
            );
            Ok(EXIT_OK)
        }

        Command::Snapshots { volume } => {
            let service = SnapshotService::new();
            match service.list_snapshots(&volume) {
                Ok(snapshots) if snapshots.is_empty() => {
                    println!("no local snapshots on {volume}");
                }
                Ok(snapshots) => {
                    for snapshot in snapshots {
                        let date = snapshot
                            .date
                            .map_or_else(|| "unknown".to_string(), |d| d.to_string());
                        println!("  {}  {date}", snapshot.id);
                    }
                }
                Err(err) => {
                    // Snapshot tooling being absent must not fail cleanup
                    // workflows; report and move on.
                    eprintln!("{} {err}", "warning:".yellow());
                }
            }
            Ok(EXIT_OK)
        }

        Command::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(EXIT_OK)
        }
    }
}

fn run_audit(command: AuditCommand, config: &Config) -> crate::core::errors::Result<i32> {
    let store = AuditStore::open(&config.paths.audit_db())?;
    match command {
        AuditCommand::Query {
            category,
            action,
            target,
            result,
            limit,
            asc,
        } => {
            let query = AuditQuery {
                category: category.as_deref().and_then(EventCategory::parse),
                action_contains: action,
                target_contains: target,
                result: result.as_deref().and_then(EventResult::parse),
                limit: Some(limit),
                order_asc: asc,
                ..Default::default()
            };
            for event in store.query(&query)? {
                println!(
                    "{}  {:<8} {:<12} {:<8} {}",
                    event.timestamp_sortable(),
                    event.category,
                    event.action,
                    event.result,
                    event.target
                );
            }
            Ok(EXIT_OK)
        }
        AuditCommand::Stats => {
            let stats = store.statistics(&AuditQuery::default())?;
            print!("{}", export::statistics_report(&stats));
            Ok(EXIT_OK)
        }
        AuditCommand::Export { format, output } => {
            let format: ExportFormat = format.into();
            let events = store.query(&AuditQuery {
                order_asc: true,
                ..Default::default()
            })?;
            let path = output
                .unwrap_or_else(|| export::default_export_path(&config.paths.exports_dir(), format));
            let result = export::export(&events, format, &path)?;
            println!(
                "exported {} events ({}) to {}",
                result.event_count,
                format_size(result.bytes_written),
                result.path.display()
            );
            Ok(EXIT_OK)
        }
        AuditCommand::Retention { days, vacuum } => {
            let days = days.unwrap_or(config.audit.retention_days);
            let removed = store.apply_retention(days, vacuum || config.audit.auto_vacuum)?;
            println!("removed {removed} events older than {days} days");
            Ok(EXIT_OK)
        }
        AuditCommand::Path => {
            println!("{}", store.database_path().display());
            println!("{}", format_size(store.database_size()));
            Ok(EXIT_OK)
        }
    }
}

fn confirm(level: LevelArg) -> bool {
    print!(
        "Run {} cleanup? This deletes files. [y/N] ",
        level.to_string().bold()
    );
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}
