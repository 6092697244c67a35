//! Revision Scraper (spec §4.8): pulls every revision of a page newer than
//! an optional baseline and hands the full, contiguous set back to the
//! caller — never a partial page's worth.

use chrono::{DateTime, Utc};
use wikivault_api::ApiClient;
use wikivault_retry::{retry_with_classifier, RetryStrategyConfig};
use wikivault_types::{ApiError, Revision};

/// Fetch every revision of `page_id` since `since` (exclusive), retrying the
/// whole fetch from scratch on a transient failure.
///
/// The underlying stream is lazy and stateful; there is no clean way to
/// resume a multi-page continuation mid-stream after a transient error, so
/// a retry restarts the page's revision fetch from the beginning rather
/// than resuming from the failed continuation token. Because revision
/// insertion is idempotent (`ON CONFLICT DO NOTHING`), refetching revisions
/// already seen in an earlier attempt is wasted work, not a correctness
/// hazard (spec §4.8, §4.6).
pub fn scrape_revisions(
    api: &ApiClient,
    retry_config: &RetryStrategyConfig,
    page_id: u64,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Revision>, ApiError> {
    retry_with_classifier(retry_config, ApiError::is_transient, |attempt| {
        if attempt > 0 {
            tracing::debug!(page_id, attempt, "retrying revision fetch");
        }
        let mut revisions = Vec::new();
        for item in api.fetch_revisions(page_id, since) {
            revisions.push(item?);
        }
        Ok(revisions)
    })
}
