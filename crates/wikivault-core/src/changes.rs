//! Change Detector (spec §4.12): classifies everything that happened to the
//! wiki since the last completed run into four disjoint buckets, collapsing
//! a page that appears in more than one bucket to its most significant
//! action (delete > move > edit > new).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use wikivault_api::{ApiClient, LogEvent, RecentChangeKind};
use wikivault_storage::StorageCore;
use wikivault_types::{ChangeSet, MovedPage, PreconditionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Action {
    New,
    Edit,
    Move,
    Delete,
}

/// Resolve the baseline timestamp for an incremental run: the caller's
/// explicit `since`, or the end time of the last completed run. Returns
/// [`PreconditionError::FirstRunRequiresFullScrape`] when neither is
/// available (spec §4.13 step 1, §8 scenario 4).
pub fn resolve_baseline(
    storage: &StorageCore,
    since_override: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, PreconditionError> {
    if let Some(since) = since_override {
        return Ok(since);
    }
    storage
        .runs()
        .last_completed()
        .ok()
        .flatten()
        .and_then(|run| run.end_time)
        .ok_or(PreconditionError::FirstRunRequiresFullScrape)
}

/// Compute the [`ChangeSet`] covering `[since, until]` from recent changes
/// and move/delete log events.
pub fn detect_changes(
    api: &ApiClient,
    storage: &StorageCore,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<ChangeSet, wikivault_types::ApiError> {
    let mut actions: HashMap<u64, Action> = HashMap::new();
    let mut moves: HashMap<u64, MovedPage> = HashMap::new();

    for item in api.recent_changes(since, until) {
        let change = item?;
        let action = match change.kind {
            RecentChangeKind::New => Action::New,
            RecentChangeKind::Edit => Action::Edit,
        };
        upgrade(&mut actions, change.page_id, action);
    }

    for item in api.log_events("move", since, until) {
        let event = item?;
        if let LogEvent::Move { page_id, new_title, new_namespace, timestamp: _, old_title } = event {
            let Some(page_id) = page_id.or_else(|| resolve_page_id(storage, &old_title)) else {
                tracing::warn!(old_title, "move event has no resolvable page id, skipping");
                continue;
            };
            // The move target's namespace comes from the log event itself
            // (`params.target_ns`), never from the page's pre-move stored
            // namespace — a move can cross namespaces (e.g. Draft: -> main,
            // main -> Talk:), and reusing the old namespace would persist
            // the rename under the wrong one.
            let Some(new_namespace) = new_namespace else {
                tracing::warn!(
                    page_id,
                    new_title,
                    "move event has no target namespace, skipping"
                );
                continue;
            };
            moves.insert(page_id, MovedPage { page_id, new_namespace, new_title });
            upgrade(&mut actions, page_id, Action::Move);
        }
    }

    for item in api.log_events("delete", since, until) {
        let event = item?;
        if let LogEvent::Delete { page_id, title, timestamp: _ } = event {
            let Some(page_id) = page_id.or_else(|| resolve_page_id(storage, &title)) else {
                tracing::warn!(title, "delete event has no resolvable page id, skipping");
                continue;
            };
            upgrade(&mut actions, page_id, Action::Delete);
        }
    }

    let mut change_set = ChangeSet::default();
    for (page_id, action) in actions {
        match action {
            Action::New => change_set.new_page_ids.push(page_id),
            Action::Edit => change_set.modified_page_ids.push(page_id),
            Action::Move => {
                if let Some(moved) = moves.remove(&page_id) {
                    change_set.moved.push(moved);
                }
            }
            Action::Delete => change_set.deleted_page_ids.push(page_id),
        }
    }
    change_set.new_page_ids.sort_unstable();
    change_set.modified_page_ids.sort_unstable();
    change_set.deleted_page_ids.sort_unstable();
    change_set.moved.sort_by_key(|m| m.page_id);

    Ok(change_set)
}

fn upgrade(actions: &mut HashMap<u64, Action>, page_id: u64, action: Action) {
    match actions.get(&page_id) {
        Some(existing) if *existing >= action => {}
        _ => {
            actions.insert(page_id, action);
        }
    }
}

/// Best-effort fallback when a log event doesn't carry a page id: look the
/// page up by its pre-event title in the default namespace. Returns `None`
/// (and the event is dropped with a warning) when that fails, rather than
/// guessing a namespace.
fn resolve_page_id(storage: &StorageCore, title: &str) -> Option<u64> {
    storage.pages().get_by_title(0, title).ok().flatten().map(|p| p.page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_keeps_highest_priority_action() {
        let mut actions = HashMap::new();
        upgrade(&mut actions, 1, Action::New);
        upgrade(&mut actions, 1, Action::Edit);
        assert_eq!(actions[&1], Action::Edit);
        upgrade(&mut actions, 1, Action::Move);
        assert_eq!(actions[&1], Action::Move);
        upgrade(&mut actions, 1, Action::Edit);
        assert_eq!(actions[&1], Action::Move, "a later edit must not downgrade a move");
        upgrade(&mut actions, 1, Action::Delete);
        assert_eq!(actions[&1], Action::Delete);
    }

    #[test]
    fn action_precedence_matches_delete_move_edit_new() {
        assert!(Action::Delete > Action::Move);
        assert!(Action::Move > Action::Edit);
        assert!(Action::Edit > Action::New);
    }

    #[test]
    fn resolve_baseline_prefers_explicit_since_override() {
        let storage = StorageCore::open_in_memory().unwrap();
        let since = Utc::now();
        assert_eq!(resolve_baseline(&storage, Some(since)).unwrap(), since);
    }

    #[test]
    fn resolve_baseline_fails_without_prior_completed_run() {
        let storage = StorageCore::open_in_memory().unwrap();
        let err = resolve_baseline(&storage, None).unwrap_err();
        assert_eq!(err, PreconditionError::FirstRunRequiresFullScrape);
    }

    #[test]
    fn resolve_baseline_uses_last_completed_run_end_time() {
        let storage = StorageCore::open_in_memory().unwrap();
        let run = storage.runs().start(wikivault_types::RunMode::Full).unwrap();
        storage
            .runs()
            .finish(run.run_id, wikivault_types::RunStatus::Completed, 1, 1, 0, None)
            .unwrap();
        let baseline = resolve_baseline(&storage, None).unwrap();
        let latest = storage.runs().last_completed().unwrap().unwrap();
        assert_eq!(Some(baseline), latest.end_time);
    }
}
