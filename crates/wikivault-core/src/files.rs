//! File Scraper (spec §4.9): resolves a `[[File:...]]`/`[[Image:...]]` link
//! target to its current metadata, downloads the bytes only when the
//! upstream hash has changed, and writes them under the configured data
//! directory.

use std::path::Path;

use wikivault_api::ApiClient;
use wikivault_retry::{retry_with_classifier, RetryStrategyConfig};
use wikivault_storage::StorageCore;

use crate::errors::CoreError;

/// Fetch `filename`'s metadata, download its bytes if the hash changed
/// since the last run, and upsert the metadata row. Returns whether bytes
/// were (re)downloaded.
pub fn scrape_file(
    api: &ApiClient,
    storage: &StorageCore,
    retry_config: &RetryStrategyConfig,
    data_dir: &Path,
    filename: &str,
) -> Result<bool, CoreError> {
    let info = retry_with_classifier(retry_config, |e: &CoreError| e.is_transient(), |_| {
        api.fetch_file_info(filename).map_err(CoreError::from)
    })?;

    let needs_refresh = storage.files().needs_refresh(filename, &info.sha1)?;

    let mut downloaded = false;
    if needs_refresh {
        let bytes = retry_with_classifier(retry_config, |e: &CoreError| e.is_transient(), |_| {
            api.download_file(&info.url, &info.sha1).map_err(CoreError::from)
        })?;
        std::fs::create_dir_all(data_dir)?;
        std::fs::write(data_dir.join(sanitize_filename(filename)), bytes)?;
        downloaded = true;
    }

    storage.files().upsert(&info)?;
    Ok(downloaded)
}

/// Filenames come from wiki content, not from this process; strip any path
/// separator before joining onto `data_dir` so a crafted title can't write
/// outside it.
fn sanitize_filename(filename: &str) -> String {
    filename.replace(['/', '\\'], "_")
}
