mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use wikivault_api::{ApiClient, ApiClientConfig};
use wikivault_checkpoint::CheckpointStore;
use wikivault_config::{
    Config, LogLevel, PartialApiConfig, PartialConfig, PartialLoggingConfig, PartialRunConfig,
    PartialStorageConfig,
};
use wikivault_storage::StorageCore;
use wikivault_types::{RunStatus, RunSummary};

use crate::progress::CliProgress;

/// Exit code used for a user-requested interruption (spec §5's "dedicated
/// interruption exit code"), distinct from the general failure code clap and
/// anyhow otherwise produce.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "wikivault", version)]
#[command(about = "Archival pipeline for a MediaWiki-backed wiki")]
struct Cli {
    /// Directory to look for `.wikivault.toml` in (walks up if not found).
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// MediaWiki API base URL, e.g. https://en.wikipedia.org/w/api.php
    #[arg(long)]
    base_url: Option<String>,

    /// Path to the SQLite database file.
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Directory downloaded files are written into.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Namespace IDs to scrape (repeatable). Overrides the config file.
    #[arg(long = "namespace")]
    namespaces: Vec<i32>,

    /// Start a run even if another run is marked as in progress.
    #[arg(long)]
    force: bool,

    /// Suppress progress rendering below WARNING.
    #[arg(long)]
    quiet: bool,

    /// Log level: DEBUG, INFO, WARNING, ERROR, or CRITICAL.
    #[arg(long)]
    level: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a complete history sweep of every configured namespace.
    Full {
        /// Report how much work a full scrape would do without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Reconcile a prior snapshot against the live wiki since the last completed run.
    Incremental {
        /// Explicit RFC3339 baseline timestamp, overriding the last completed run's end time.
        #[arg(long)]
        since: Option<chrono::DateTime<chrono::Utc>>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(summary) => report_and_exit(&summary),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<RunSummary> {
    let config = build_config(&cli)?;

    let _ = wikivault_core::install_tracing(&config.logging);

    std::fs::create_dir_all(&config.storage.data_dir)
        .with_context(|| format!("creating data dir {}", config.storage.data_dir.display()))?;

    let storage = StorageCore::open(&config.storage.database_path).with_context(|| {
        format!("opening storage at {}", config.storage.database_path.display())
    })?;

    let api = ApiClient::new(ApiClientConfig {
        base_url: config.api.base_url.clone(),
        user_agent: config.api.user_agent.clone(),
        timeout: std::time::Duration::from_secs(config.api.timeout_seconds),
        rate_limit_per_second: config.api.rate_limit_per_second,
        ..Default::default()
    })
    .context("constructing API client")?;

    let mut reporter = CliProgress::new(!cli.quiet && progress::is_tty());

    match cli.cmd {
        Commands::Full { dry_run } => {
            let mut config = config;
            config.run.dry_run = dry_run;
            let checkpoint_store = CheckpointStore::at_path(config.storage.checkpoint_path.clone());
            let cancel = install_cancel_handler();
            wikivault_core::run_full_scrape(&storage, &api, &checkpoint_store, &config, &cancel, &mut reporter)
        }
        Commands::Incremental { since } => {
            let mut config = config;
            if since.is_some() {
                config.run.since = since;
            }
            wikivault_core::run_incremental_scrape(&storage, &api, &config, &mut reporter)
        }
    }
}

/// Install a `Ctrl-C` handler that flips a cooperative cancellation flag
/// observed by the orchestrator at page boundaries (spec §5: the handler
/// only needs to set a flag; no work item is abandoned mid-transaction).
fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed)) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler, cancellation will be unavailable");
    }
    cancel
}

fn build_config(cli: &Cli) -> Result<Config> {
    let defaults = PartialConfig::default();
    let file = wikivault_config::load_config(&cli.config_dir)
        .context("loading .wikivault.toml")?;

    let level = cli
        .level
        .as_deref()
        .map(|s| log_level_from_str(s).ok_or_else(|| anyhow::anyhow!("unrecognized log level: {s}")))
        .transpose()?;

    let cli_overrides = PartialConfig {
        api: PartialApiConfig {
            base_url: cli.base_url.clone(),
            ..Default::default()
        },
        storage: PartialStorageConfig {
            database_path: cli.database_path.clone(),
            data_dir: cli.data_dir.clone(),
            ..Default::default()
        },
        run: PartialRunConfig {
            namespaces: if cli.namespaces.is_empty() {
                None
            } else {
                Some(cli.namespaces.clone())
            },
            force: if cli.force { Some(true) } else { None },
            ..Default::default()
        },
        logging: PartialLoggingConfig {
            quiet: if cli.quiet { Some(true) } else { None },
            level,
        },
    };

    defaults
        .merge(&file)
        .merge(&cli_overrides)
        .finalize()
        .context("validating configuration")
}

fn report_and_exit(summary: &RunSummary) -> ExitCode {
    print_summary(summary);
    ExitCode::from(exit_code_for(summary.status))
}

/// Maps a terminal [`RunStatus`] to a process exit code. `Interrupted` gets
/// its own code (spec §5: "exit with a dedicated interruption exit code"),
/// distinct from a general failure.
fn exit_code_for(status: RunStatus) -> u8 {
    match status {
        RunStatus::Completed => 0,
        RunStatus::Interrupted => EXIT_INTERRUPTED,
        RunStatus::Failed | RunStatus::Running => 1,
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "run {} ({}): {:?}",
        summary.run_id, summary.mode, summary.status
    );
    println!(
        "pages processed: {}  revisions stored: {}  files downloaded: {}",
        summary.pages_processed, summary.revisions_stored, summary.files_downloaded
    );
    println!("duration: {:?}", summary.duration);

    if summary.failed_page_count > 0 {
        println!(
            "failures: {} (showing up to {} sample ids)",
            summary.failed_page_count,
            summary.sample_failures.len()
        );
        for failure in &summary.sample_failures {
            match failure.page_id {
                Some(id) => println!("  page {id}: {}", failure.message),
                None => println!("  {}", failure.message),
            }
        }
    }
}

fn log_level_from_str(s: &str) -> Option<LogLevel> {
    match s.to_ascii_uppercase().as_str() {
        "DEBUG" => Some(LogLevel::Debug),
        "INFO" => Some(LogLevel::Info),
        "WARNING" => Some(LogLevel::Warning),
        "ERROR" => Some(LogLevel::Error),
        "CRITICAL" => Some(LogLevel::Critical),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_from_str_parses_known_levels() {
        assert_eq!(log_level_from_str("debug"), Some(LogLevel::Debug));
        assert_eq!(log_level_from_str("CRITICAL"), Some(LogLevel::Critical));
        assert_eq!(log_level_from_str("bogus"), None);
    }

    #[test]
    fn build_config_picks_up_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            config_dir: dir.path().to_path_buf(),
            base_url: Some("https://example.org/w/api.php".to_string()),
            database_path: None,
            data_dir: None,
            namespaces: vec![0, 1],
            force: true,
            quiet: false,
            level: None,
            cmd: Commands::Full { dry_run: true },
        };
        let config = build_config(&cli).unwrap();
        assert_eq!(config.api.base_url, "https://example.org/w/api.php");
        assert_eq!(config.run.namespaces, vec![0, 1]);
        assert!(config.run.force);
    }

    #[test]
    fn exit_code_for_maps_run_status_to_exit_code() {
        assert_eq!(exit_code_for(RunStatus::Completed), 0);
        assert_eq!(exit_code_for(RunStatus::Interrupted), EXIT_INTERRUPTED);
        assert_eq!(exit_code_for(RunStatus::Failed), 1);
    }
}
