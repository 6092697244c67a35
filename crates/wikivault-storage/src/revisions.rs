use rusqlite::{params, Connection, OptionalExtension};
use wikivault_types::{Revision, StorageError};

use crate::map_sql_err;

/// Repository over the `revisions` table (spec §4.6).
pub struct RevisionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> RevisionRepository<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a revision, doing nothing if `revision_id` is already present.
    /// This is the idempotency contract that lets the incremental
    /// orchestrator re-fetch and re-store a changed page without producing
    /// duplicate history (spec §4.6's central incremental-correctness rule).
    ///
    /// Returns whether a row was actually inserted.
    pub fn insert(&self, revision: &Revision) -> Result<bool, StorageError> {
        let tags_json = revision
            .tags
            .as_ref()
            .map(|tags| serde_json::to_string(tags))
            .transpose()
            .map_err(|e| StorageError::Integrity(format!("tags serialization: {e}")))?;

        let rows = self
            .conn
            .execute(
                "INSERT INTO revisions(
                     revision_id, page_id, parent_id, timestamp, user, user_id,
                     comment, content, size, sha1, minor, tags
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(revision_id) DO NOTHING",
                params![
                    revision.revision_id as i64,
                    revision.page_id as i64,
                    revision.parent_id.map(|id| id as i64),
                    revision.timestamp,
                    revision.user,
                    revision.user_id.map(|id| id as i64),
                    revision.comment,
                    revision.content,
                    revision.size as i64,
                    revision.sha1,
                    revision.minor,
                    tags_json,
                ],
            )
            .map_err(map_sql_err)?;
        Ok(rows > 0)
    }

    /// Insert a batch of revisions inside a single transaction, returning
    /// how many were newly inserted (vs. already present).
    pub fn insert_batch(&self, revisions: &[Revision]) -> Result<usize, StorageError> {
        crate::tx::with_transaction(self.conn, || {
            let mut inserted = 0;
            for revision in revisions {
                if self.insert(revision)? {
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }

    pub fn get(&self, revision_id: u64) -> Result<Option<Revision>, StorageError> {
        self.conn
            .query_row(
                "SELECT revision_id, page_id, parent_id, timestamp, user, user_id,
                        comment, content, size, sha1, minor, tags
                 FROM revisions WHERE revision_id = ?1",
                params![revision_id as i64],
                Self::row_to_revision,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
    }

    /// The most recent revision for a page, ordered by timestamp then id to
    /// break ties deterministically.
    pub fn get_latest(&self, page_id: u64) -> Result<Option<Revision>, StorageError> {
        self.conn
            .query_row(
                "SELECT revision_id, page_id, parent_id, timestamp, user, user_id,
                        comment, content, size, sha1, minor, tags
                 FROM revisions WHERE page_id = ?1
                 ORDER BY timestamp DESC, revision_id DESC LIMIT 1",
                params![page_id as i64],
                Self::row_to_revision,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
    }

    pub fn list_for_page(&self, page_id: u64) -> Result<Vec<Revision>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT revision_id, page_id, parent_id, timestamp, user, user_id,
                        comment, content, size, sha1, minor, tags
                 FROM revisions WHERE page_id = ?1 ORDER BY timestamp, revision_id",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map(params![page_id as i64], Self::row_to_revision)
            .map_err(map_sql_err)?;
        let results: Result<Vec<Result<Revision, StorageError>>, rusqlite::Error> =
            rows.collect();
        results
            .map_err(map_sql_err)?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM revisions", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(map_sql_err)
    }

    fn row_to_revision(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Revision, StorageError>> {
        let tags_json: Option<String> = row.get(11)?;
        let tags = match tags_json {
            Some(json) => match serde_json::from_str::<Vec<String>>(&json) {
                Ok(tags) => Some(tags),
                Err(e) => return Ok(Err(StorageError::Integrity(format!("tags: {e}")))),
            },
            None => None,
        };
        Ok(Ok(Revision {
            revision_id: row.get::<_, i64>(0)? as u64,
            page_id: row.get::<_, i64>(1)? as u64,
            parent_id: row.get::<_, Option<i64>>(2)?.map(|id| id as u64),
            timestamp: row.get(3)?,
            user: row.get(4)?,
            user_id: row.get::<_, Option<i64>>(5)?.map(|id| id as u64),
            comment: row.get(6)?,
            content: row.get(7)?,
            size: row.get::<_, i64>(8)? as u64,
            sha1: row.get(9)?,
            minor: row.get(10)?,
            tags,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageCore;
    use chrono::Utc;

    fn sample_revision(revision_id: u64, page_id: u64, content: &str) -> Revision {
        Revision {
            revision_id,
            page_id,
            parent_id: None,
            timestamp: Utc::now(),
            user: Some("Alice".to_string()),
            user_id: Some(7),
            comment: Some("edit".to_string()),
            content: content.to_string(),
            size: content.len() as u64,
            sha1: Revision::content_sha1(content),
            minor: false,
            tags: Some(vec!["mobile edit".to_string()]),
        }
    }

    fn store_with_page(core: &StorageCore, page_id: u64) {
        core.pages()
            .upsert(&wikivault_types::Page {
                page_id,
                namespace: 0,
                title: format!("Page {page_id}"),
                is_redirect: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn insert_is_idempotent_on_conflict() {
        let core = StorageCore::open_in_memory().unwrap();
        store_with_page(&core, 1);
        let revision = sample_revision(100, 1, "hello");
        assert!(core.revisions().insert(&revision).unwrap());
        assert!(!core.revisions().insert(&revision).unwrap());
        assert_eq!(core.revisions().count().unwrap(), 1);
    }

    #[test]
    fn get_latest_orders_by_timestamp_then_id() {
        let core = StorageCore::open_in_memory().unwrap();
        store_with_page(&core, 1);
        let mut older = sample_revision(100, 1, "v1");
        older.timestamp = Utc::now() - chrono::Duration::hours(1);
        let newer = sample_revision(101, 1, "v2");
        core.revisions().insert(&older).unwrap();
        core.revisions().insert(&newer).unwrap();
        let latest = core.revisions().get_latest(1).unwrap().unwrap();
        assert_eq!(latest.revision_id, 101);
    }

    #[test]
    fn tags_round_trip_through_json_text() {
        let core = StorageCore::open_in_memory().unwrap();
        store_with_page(&core, 1);
        core.revisions()
            .insert(&sample_revision(100, 1, "hi"))
            .unwrap();
        let fetched = core.revisions().get(100).unwrap().unwrap();
        assert_eq!(fetched.tags, Some(vec!["mobile edit".to_string()]));
    }
}
