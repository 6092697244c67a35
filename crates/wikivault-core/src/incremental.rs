//! Incremental Orchestrator (spec §4.13): processes only what changed since
//! the last completed run, using the Change Detector's classification
//! rather than a full namespace walk.

use chrono::Utc;
use wikivault_api::ApiClient;
use wikivault_config::Config;
use wikivault_progress::{Progress, Stage};
use wikivault_storage::StorageCore;
use wikivault_types::{PageRunStatus, PageStatus, RunMode, RunStatus, RunSummary};

use crate::changes::{detect_changes, resolve_baseline};
use crate::full::check_run_exclusivity;
use crate::page::process_page;

/// Run an incremental scrape: resolve the change window since the last
/// completed run (or `config.run.since`), classify what changed, and apply
/// each bucket (new/modified pages are (re)scraped, moves rename in place,
/// deletes remove the page and its history).
///
/// Fails with [`wikivault_types::PreconditionError::FirstRunRequiresFullScrape`]
/// when there is no prior completed run and no explicit `since` (spec §8
/// scenario 4).
pub fn run_incremental_scrape(
    storage: &StorageCore,
    api: &ApiClient,
    config: &Config,
    progress: &mut dyn Progress,
) -> anyhow::Result<RunSummary> {
    check_run_exclusivity(storage, config.run.force)?;

    let since = resolve_baseline(storage, config.run.since)?;
    let until = Utc::now();

    let run = storage.runs().start(RunMode::Incremental)?;
    let retry_config = {
        let mut cfg = wikivault_retry::RetryPolicy::Default.to_config();
        cfg.max_attempts = config.api.max_retries.max(1);
        cfg
    };

    let change_set = detect_changes(api, storage, since, until)?;
    tracing::info!(
        new = change_set.new_page_ids.len(),
        modified = change_set.modified_page_ids.len(),
        moved = change_set.moved.len(),
        deleted = change_set.deleted_page_ids.len(),
        "change set computed"
    );

    let mut pages_scraped = 0u64;
    let mut revisions_scraped = 0u64;
    let mut files_downloaded = 0u64;
    let mut failures: Vec<(Option<u64>, String)> = Vec::new();

    let to_scrape: Vec<u64> = change_set
        .new_page_ids
        .iter()
        .chain(change_set.modified_page_ids.iter())
        .copied()
        .collect();
    let total = to_scrape.len() as u64;

    for (idx, page_id) in to_scrape.iter().enumerate() {
        progress.report(Stage::Scrape, idx as u64 + 1, Some(total));
        match process_page(api, storage, &retry_config, &config.storage.data_dir, *page_id, Some(since)) {
            Ok(outcome) => {
                pages_scraped += 1;
                revisions_scraped += outcome.revisions_inserted;
                files_downloaded += outcome.files_downloaded;
                storage.page_status().upsert(&PageRunStatus {
                    page_id: *page_id,
                    run_id: run.run_id,
                    status: PageStatus::Success,
                    last_revision_id: None,
                    error_message: None,
                    scraped_at: Some(Utc::now()),
                })?;
            }
            Err(e) => {
                tracing::warn!(page_id, error = %e, "incremental page scrape failed");
                failures.push((Some(*page_id), e.to_string()));
                storage.page_status().upsert(&PageRunStatus {
                    page_id: *page_id,
                    run_id: run.run_id,
                    status: PageStatus::Failed,
                    last_revision_id: None,
                    error_message: Some(e.to_string()),
                    scraped_at: Some(Utc::now()),
                })?;
            }
        }
    }

    for moved in &change_set.moved {
        if let Err(e) = storage.pages().rename(moved.page_id, moved.new_namespace, &moved.new_title, until) {
            tracing::warn!(page_id = moved.page_id, error = %e, "failed to apply page move");
            failures.push((Some(moved.page_id), e.to_string()));
        } else {
            pages_scraped += 1;
        }
    }

    for page_id in &change_set.deleted_page_ids {
        if let Err(e) = storage.pages().delete(*page_id) {
            tracing::warn!(page_id, error = %e, "failed to apply page deletion");
            failures.push((Some(*page_id), e.to_string()));
        } else {
            pages_scraped += 1;
        }
    }

    let total_pages_seen = change_set.total_pages() as u64;
    let status = if total_pages_seen > 0
        && (failures.len() as f64 / total_pages_seen as f64) >= config.run.failure_threshold_fraction
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

    Ok(RunSummary {
        run_id: run.run_id,
        mode: RunMode::Incremental,
        status,
        pages_processed: pages_scraped,
        revisions_stored: revisions_scraped,
        files_downloaded,
        duration: (Utc::now() - run.start_time).to_std().unwrap_or_default(),
        sample_failures: RunSummary::sample_failures_from(&failures),
        failed_page_count: failures.len(),
    })
}
