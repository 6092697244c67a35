//! Discovery (spec §4.7): lists every page in a namespace via `list=allpages`
//! and persists it into the Page repository in one batch per namespace.

use wikivault_api::ApiClient;
use wikivault_progress::{Progress, Stage};
use wikivault_storage::StorageCore;
use wikivault_types::{Page, PageDescriptor};

/// List every page in `namespace` and upsert it into storage.
///
/// Returns the descriptors discovered (possibly a prefix of the namespace's
/// full page set, if the stream errored partway through) and the error
/// message, if any. A namespace-level discovery failure does not abort the
/// run: the caller persists whatever was discovered before the failure and
/// moves on to the next namespace (spec §4.7, §4.11 step 2).
pub fn discover_namespace(
    api: &ApiClient,
    storage: &StorageCore,
    namespace: i32,
    progress: &mut dyn Progress,
) -> (Vec<PageDescriptor>, Option<String>) {
    let mut pages = Vec::new();
    let mut error = None;

    for item in api.list_pages(namespace) {
        match item {
            Ok(descriptor) => {
                pages.push(descriptor);
                progress.report(Stage::Discover, pages.len() as u64, None);
            }
            Err(e) => {
                error = Some(format!("namespace {namespace}: discovery failed: {e}"));
                break;
            }
        }
    }

    if !pages.is_empty() {
        let now = chrono::Utc::now();
        let rows: Vec<Page> = pages
            .iter()
            .map(|d| Page {
                page_id: d.page_id,
                namespace: d.namespace,
                title: d.title.clone(),
                is_redirect: d.is_redirect,
                created_at: now,
                updated_at: now,
            })
            .collect();
        if let Err(e) = storage.pages().upsert_batch(&rows) {
            error = Some(format!("namespace {namespace}: failed to persist pages: {e}"));
        }
    }

    (pages, error)
}
