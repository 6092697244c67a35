//! # Core
//!
//! The ingestion engine: discovery, revision/file scraping, link
//! extraction, change detection, and the full/incremental orchestrators
//! that tie them together over the storage core (spec §1 — this crate and
//! `wikivault-storage` are the system's core; everything else is a
//! supporting concern or explicitly out of scope).
//!
//! Orchestration entry points are [`run_full_scrape`] and
//! [`run_incremental_scrape`]; both take a [`wikivault_config::Config`], a
//! [`wikivault_storage::StorageCore`], a [`wikivault_api::ApiClient`], and a
//! `&mut dyn wikivault_progress::Progress`, and return a
//! [`wikivault_types::RunSummary`] rather than panicking or aborting the
//! process on a partial failure.

mod changes;
mod discovery;
mod errors;
mod files;
mod full;
mod incremental;
mod logging;
mod page;
mod revisions;

pub use changes::{detect_changes, resolve_baseline};
pub use discovery::discover_namespace;
pub use errors::CoreError;
pub use full::{check_run_exclusivity, run_full_scrape};
pub use incremental::run_incremental_scrape;
pub use logging::install_tracing;
pub use page::{process_page, PageOutcome};
pub use revisions::scrape_revisions;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use wikivault_checkpoint::CheckpointStore;
    use wikivault_config::{ApiConfig, Config, LoggingConfig, RunConfig, StorageConfig};
    use wikivault_progress::NullProgress;
    use wikivault_storage::StorageCore;
    use wikivault_types::PreconditionError;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            api: ApiConfig {
                base_url: "http://127.0.0.1:1".to_string(),
                user_agent: "wikivault-test/0.1".to_string(),
                timeout_seconds: 1,
                max_retries: 1,
                rate_limit_per_second: 1000.0,
            },
            storage: StorageConfig {
                database_path: dir.join("wikivault.sqlite3"),
                data_dir: dir.join("data"),
                checkpoint_path: dir.join("checkpoint.json"),
            },
            run: RunConfig {
                namespaces: vec![0],
                force: false,
                dry_run: false,
                since: None,
                failure_threshold_fraction: 0.10,
            },
            logging: LoggingConfig {
                level: wikivault_config::LogLevel::Info,
                quiet: true,
            },
        }
    }

    #[test]
    fn run_exclusivity_blocks_concurrent_runs_unless_forced() {
        let storage = StorageCore::open_in_memory().unwrap();
        storage.runs().start(wikivault_types::RunMode::Full).unwrap();

        let err = check_run_exclusivity(&storage, false).unwrap_err();
        assert_eq!(err, PreconditionError::RunAlreadyInProgress);
        assert!(check_run_exclusivity(&storage, true).is_ok());
    }

    #[test]
    fn incremental_scrape_refuses_without_a_prior_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageCore::open_in_memory().unwrap();
        let api = wikivault_api::ApiClient::new(wikivault_api::ApiClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();
        let config = test_config(dir.path());
        let mut progress = NullProgress;

        let err = run_incremental_scrape(&storage, &api, &config, &mut progress).unwrap_err();
        assert!(err.downcast_ref::<PreconditionError>().is_some());
    }

    #[test]
    fn full_scrape_dry_run_does_not_create_a_scrape_run_row() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageCore::open_in_memory().unwrap();
        let api = wikivault_api::ApiClient::new(wikivault_api::ApiClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();
        let mut config = test_config(dir.path());
        config.run.dry_run = true;
        config.run.namespaces = vec![];
        let checkpoint_store = CheckpointStore::new(dir.path());
        let cancel = AtomicBool::new(false);
        let mut progress = NullProgress;

        let summary = run_full_scrape(&storage, &api, &checkpoint_store, &config, &cancel, &mut progress).unwrap();
        assert_eq!(summary.pages_processed, 0);
        assert!(storage.runs().latest().unwrap().is_none());
    }
}
