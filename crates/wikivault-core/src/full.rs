//! Full Orchestrator (spec §4.11): the from-scratch/resumable pipeline —
//! discovery then per-page revision/link/file processing, namespace by
//! namespace, checkpointed so an interrupted run can pick up where it left
//! off without re-fetching completed work.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use wikivault_api::ApiClient;
use wikivault_checkpoint::{Checkpoint, CheckpointStore, ConfigFingerprint};
use wikivault_config::Config;
use wikivault_progress::{Progress, Stage};
use wikivault_retry::RetryStrategyConfig;
use wikivault_storage::StorageCore;
use wikivault_types::{
    PageRunStatus, PageStatus, PreconditionError, RunMode, RunStatus, RunSummary,
};

use crate::discovery::discover_namespace;
use crate::page::process_page;

/// Run the run-exclusivity precondition (spec §4.5, §A.7): refuse to start
/// if another run is already marked `running`, unless `force` is set.
pub fn check_run_exclusivity(storage: &StorageCore, force: bool) -> Result<(), PreconditionError> {
    if force {
        return Ok(());
    }
    match storage.runs().running() {
        Ok(Some(_)) => Err(PreconditionError::RunAlreadyInProgress),
        _ => Ok(()),
    }
}

fn retry_config_for(config: &Config) -> RetryStrategyConfig {
    let mut retry_config = wikivault_retry::RetryPolicy::Default.to_config();
    retry_config.max_attempts = config.api.max_retries.max(1);
    retry_config
}

/// `dry_run`: preview discovery across every declared namespace without
/// writing anything to storage or the checkpoint, and without fetching
/// revisions or files — a cheap "how much work would this be" report (spec
/// §6.4's `run.dry_run`, full mode only).
fn run_full_scrape_preview(api: &ApiClient, namespaces: &[i32]) -> anyhow::Result<RunSummary> {
    let started = Utc::now();
    let mut pages_seen = 0u64;
    let mut failures = Vec::new();

    for namespace in namespaces {
        for item in api.list_pages(*namespace) {
            match item {
                Ok(_) => pages_seen += 1,
                Err(e) => {
                    failures.push((None, format!("namespace {namespace}: {e}")));
                    break;
                }
            }
        }
    }

    Ok(RunSummary {
        run_id: 0,
        mode: RunMode::Full,
        status: RunStatus::Completed,
        pages_processed: pages_seen,
        revisions_stored: 0,
        files_downloaded: 0,
        duration: (Utc::now() - started).to_std().unwrap_or_default(),
        sample_failures: RunSummary::sample_failures_from(&failures),
        failed_page_count: failures.len(),
    })
}

/// Run a full scrape of every namespace in `config.run.namespaces`.
///
/// Resumes from `checkpoint_store` when a checkpoint is present and its
/// fingerprint matches the requested run; otherwise starts fresh. `cancel`
/// is polled once per page boundary so a caller's signal handler can request
/// a clean, resumable stop (spec §5's cancellation semantics).
pub fn run_full_scrape(
    storage: &StorageCore,
    api: &ApiClient,
    checkpoint_store: &CheckpointStore,
    config: &Config,
    cancel: &AtomicBool,
    progress: &mut dyn Progress,
) -> anyhow::Result<RunSummary> {
    check_run_exclusivity(storage, config.run.force)?;

    if config.run.dry_run {
        return run_full_scrape_preview(api, &config.run.namespaces);
    }

    let fingerprint = ConfigFingerprint {
        namespaces: config.run.namespaces.clone(),
        rate_limit_per_second: config.api.rate_limit_per_second,
        mode: RunMode::Full,
    };

    let mut checkpoint = match checkpoint_store.load() {
        Ok(Some(existing)) if !config.run.force && existing.matches_fingerprint(&fingerprint) => {
            tracing::info!("resuming full scrape from checkpoint");
            existing
        }
        Ok(_) => Checkpoint::new(fingerprint.clone()),
        Err(_) => Checkpoint::new(fingerprint.clone()),
    };

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let run = storage.runs().start(RunMode::Full)?;
    let retry_config = retry_config_for(config);

    let mut pages_scraped = 0u64;
    let mut revisions_scraped = 0u64;
    let mut files_downloaded = 0u64;
    let mut failures: Vec<(Option<u64>, String)> = Vec::new();
    let mut total_pages_seen = 0u64;
    let mut namespaces_failed_discovery = 0usize;
    let mut interrupted = false;

    'namespaces: for namespace in &config.run.namespaces {
        if checkpoint.is_namespace_complete(*namespace) {
            continue;
        }

        let (pages, discover_err) = discover_namespace(api, storage, *namespace, progress);
        if let Some(err) = &discover_err {
            tracing::warn!(namespace, error = %err, "namespace discovery failed");
            failures.push((None, err.clone()));
            if pages.is_empty() {
                namespaces_failed_discovery += 1;
            }
        }

        let total = pages.len() as u64;
        for (idx, page) in pages.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                interrupted = true;
                break 'namespaces;
            }
            if checkpoint.is_page_complete(page.page_id) {
                continue;
            }

            total_pages_seen += 1;
            progress.report(Stage::Scrape, idx as u64 + 1, Some(total));

            match process_page(api, storage, &retry_config, &config.storage.data_dir, page.page_id, None) {
                Ok(outcome) => {
                    pages_scraped += 1;
                    revisions_scraped += outcome.revisions_inserted;
                    files_downloaded += outcome.files_downloaded;
                    storage.page_status().upsert(&PageRunStatus {
                        page_id: page.page_id,
                        run_id: run.run_id,
                        status: PageStatus::Success,
                        last_revision_id: None,
                        error_message: None,
                        scraped_at: Some(Utc::now()),
                    })?;
                    checkpoint_store.mark_page_complete(&mut checkpoint, page.page_id)?;
                }
                Err(e) => {
                    tracing::warn!(page_id = page.page_id, error = %e, "page scrape failed");
                    failures.push((Some(page.page_id), e.to_string()));
                    storage.page_status().upsert(&PageRunStatus {
                        page_id: page.page_id,
                        run_id: run.run_id,
                        status: PageStatus::Failed,
                        last_revision_id: None,
                        error_message: Some(e.to_string()),
                        scraped_at: Some(Utc::now()),
                    })?;
                }
            }
        }

        if !interrupted {
            checkpoint_store.mark_namespace_complete(&mut checkpoint, *namespace)?;
        }
    }

    let page_failures: Vec<_> = failures.iter().filter(|(id, _)| id.is_some()).cloned().collect();

    let status = if interrupted {
        RunStatus::Interrupted
    } else if namespaces_failed_discovery == config.run.namespaces.len() {
        RunStatus::Failed
    } else if total_pages_seen > 0
        && (page_failures.len() as f64 / total_pages_seen as f64) >= config.run.failure_threshold_fraction
    {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };

    storage.runs().finish(
        run.run_id,
        status,
        pages_scraped,
        revisions_scraped,
        files_downloaded,
        failures.first().map(|(_, m)| m.as_str()),
    )?;

    if status == RunStatus::Completed {
        checkpoint_store.delete()?;
    }

    Ok(RunSummary {
        run_id: run.run_id,
        mode: RunMode::Full,
        status,
        pages_processed: pages_scraped,
        revisions_stored: revisions_scraped,
        files_downloaded,
        duration: (Utc::now() - run.start_time).to_std().unwrap_or_default(),
        sample_failures: RunSummary::sample_failures_from(&failures),
        failed_page_count: page_failures.len(),
    })
}
