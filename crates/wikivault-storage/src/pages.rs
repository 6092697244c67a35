use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use wikivault_types::{Page, StorageError};

use crate::map_sql_err;

/// Repository over the `pages` table (spec §4.6).
pub struct PageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> PageRepository<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a page, or update its mutable fields (`title`, `is_redirect`,
    /// `updated_at`) if `page_id` already exists. `page_id` itself is
    /// wiki-assigned and never changes.
    pub fn upsert(&self, page: &Page) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO pages(page_id, namespace, title, is_redirect, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(page_id) DO UPDATE SET
                     title = excluded.title,
                     is_redirect = excluded.is_redirect,
                     updated_at = excluded.updated_at",
                params![
                    page.page_id as i64,
                    page.namespace,
                    page.title,
                    page.is_redirect,
                    page.created_at,
                    page.updated_at,
                ],
            )
            .map_err(map_sql_err)?;
        Ok(())
    }

    /// Upsert a batch of pages inside a single transaction (spec §4.2:
    /// discovery persists pages in batches, not one-by-one).
    pub fn upsert_batch(&self, pages: &[Page]) -> Result<(), StorageError> {
        crate::tx::with_transaction(self.conn, || {
            for page in pages {
                self.upsert(page)?;
            }
            Ok(())
        })
    }

    pub fn get(&self, page_id: u64) -> Result<Option<Page>, StorageError> {
        self.conn
            .query_row(
                "SELECT page_id, namespace, title, is_redirect, created_at, updated_at
                 FROM pages WHERE page_id = ?1",
                params![page_id as i64],
                Self::row_to_page,
            )
            .optional()
            .map_err(map_sql_err)
    }

    pub fn get_by_title(&self, namespace: i32, title: &str) -> Result<Option<Page>, StorageError> {
        self.conn
            .query_row(
                "SELECT page_id, namespace, title, is_redirect, created_at, updated_at
                 FROM pages WHERE namespace = ?1 AND title = ?2",
                params![namespace, title],
                Self::row_to_page,
            )
            .optional()
            .map_err(map_sql_err)
    }

    /// Rename a page in place (spec §4.12: a move changes `title`/`namespace`
    /// without touching `page_id` or its revision history).
    pub fn rename(
        &self,
        page_id: u64,
        new_namespace: i32,
        new_title: &str,
        renamed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let rows = self
            .conn
            .execute(
                "UPDATE pages SET namespace = ?1, title = ?2, updated_at = ?3 WHERE page_id = ?4",
                params![new_namespace, new_title, renamed_at, page_id as i64],
            )
            .map_err(map_sql_err)?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("page {page_id}")));
        }
        Ok(())
    }

    /// Delete a page and (via `ON DELETE CASCADE`) its revisions and links.
    pub fn delete(&self, page_id: u64) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM pages WHERE page_id = ?1", params![page_id as i64])
            .map_err(map_sql_err)?;
        Ok(())
    }

    pub fn list_by_namespace(&self, namespace: i32) -> Result<Vec<Page>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT page_id, namespace, title, is_redirect, created_at, updated_at
                 FROM pages WHERE namespace = ?1 ORDER BY page_id",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map(params![namespace], Self::row_to_page)
            .map_err(map_sql_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(map_sql_err)
    }

    fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<Page> {
        Ok(Page {
            page_id: row.get::<_, i64>(0)? as u64,
            namespace: row.get(1)?,
            title: row.get(2)?,
            is_redirect: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageCore;

    fn sample_page(page_id: u64, title: &str) -> Page {
        let now = Utc::now();
        Page {
            page_id,
            namespace: 0,
            title: title.to_string(),
            is_redirect: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let core = StorageCore::open_in_memory().unwrap();
        let page = sample_page(1, "Main Page");
        core.pages().upsert(&page).unwrap();
        let fetched = core.pages().get(1).unwrap().unwrap();
        assert_eq!(fetched.title, "Main Page");
    }

    #[test]
    fn upsert_is_idempotent_on_conflict() {
        let core = StorageCore::open_in_memory().unwrap();
        let mut page = sample_page(1, "Main Page");
        core.pages().upsert(&page).unwrap();
        page.title = "Main Page (renamed)".to_string();
        core.pages().upsert(&page).unwrap();
        assert_eq!(core.pages().count().unwrap(), 1);
        assert_eq!(
            core.pages().get(1).unwrap().unwrap().title,
            "Main Page (renamed)"
        );
    }

    #[test]
    fn rename_updates_title_and_namespace_only() {
        let core = StorageCore::open_in_memory().unwrap();
        core.pages().upsert(&sample_page(1, "Old Title")).unwrap();
        core.pages().rename(1, 2, "New Title", Utc::now()).unwrap();
        let page = core.pages().get(1).unwrap().unwrap();
        assert_eq!(page.title, "New Title");
        assert_eq!(page.namespace, 2);
        assert_eq!(page.page_id, 1);
    }

    #[test]
    fn rename_missing_page_is_not_found() {
        let core = StorageCore::open_in_memory().unwrap();
        let err = core.pages().rename(999, 0, "X", Utc::now()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn delete_cascades_to_revisions_and_links() {
        let core = StorageCore::open_in_memory().unwrap();
        core.pages().upsert(&sample_page(1, "Doomed")).unwrap();
        core.revisions()
            .insert(&wikivault_types::Revision {
                revision_id: 10,
                page_id: 1,
                parent_id: None,
                timestamp: Utc::now(),
                user: None,
                user_id: None,
                comment: None,
                content: "hello".to_string(),
                size: 5,
                sha1: wikivault_types::Revision::content_sha1("hello"),
                minor: false,
                tags: None,
            })
            .unwrap();
        core.pages().delete(1).unwrap();
        assert!(core.revisions().get(10).unwrap().is_none());
    }
}
