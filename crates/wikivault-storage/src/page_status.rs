use rusqlite::{params, Connection, OptionalExtension};
use wikivault_types::{PageRunStatus, PageStatus, StorageError};

use crate::map_sql_err;

/// Repository over the `scrape_page_status` table (spec §4.5, §4.6): the
/// resume granularity for an interrupted run.
pub struct PageRunStatusRepository<'a> {
    conn: &'a Connection,
}

impl<'a> PageRunStatusRepository<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, status: &PageRunStatus) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO scrape_page_status(
                     page_id, run_id, status, last_revision_id, error_message, scraped_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(page_id, run_id) DO UPDATE SET
                     status = excluded.status,
                     last_revision_id = excluded.last_revision_id,
                     error_message = excluded.error_message,
                     scraped_at = excluded.scraped_at",
                params![
                    status.page_id as i64,
                    status.run_id,
                    status.status.as_str(),
                    status.last_revision_id.map(|id| id as i64),
                    status.error_message,
                    status.scraped_at,
                ],
            )
            .map_err(map_sql_err)?;
        Ok(())
    }

    pub fn get(&self, page_id: u64, run_id: i64) -> Result<Option<PageRunStatus>, StorageError> {
        self.conn
            .query_row(
                "SELECT page_id, run_id, status, last_revision_id, error_message, scraped_at
                 FROM scrape_page_status WHERE page_id = ?1 AND run_id = ?2",
                params![page_id as i64, run_id],
                Self::row_to_status,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
            .map_err(map_sql_err)
    }

    /// Pages already marked [`PageStatus::Success`] or [`PageStatus::Skipped`]
    /// in `run_id` — the set an orchestrator resuming after interruption must
    /// not redo (spec §4.5: resume skips pages already accounted for).
    pub fn completed_page_ids(&self, run_id: i64) -> Result<Vec<u64>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT page_id FROM scrape_page_status
                 WHERE run_id = ?1 AND status IN (?2, ?3)",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map(
                params![run_id, PageStatus::Success.as_str(), PageStatus::Skipped.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(map_sql_err)?;
        rows.map(|r| r.map(|id| id as u64))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_err)
    }

    pub fn failed_for_run(&self, run_id: i64) -> Result<Vec<PageRunStatus>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT page_id, run_id, status, last_revision_id, error_message, scraped_at
                 FROM scrape_page_status WHERE run_id = ?1 AND status = ?2
                 ORDER BY page_id",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map(params![run_id, PageStatus::Failed.as_str()], Self::row_to_status)
            .map_err(map_sql_err)?;
        rows.collect::<Result<Result<Vec<_>, _>, _>>()
            .map_err(map_sql_err)?
            .map_err(map_sql_err)
    }

    fn row_to_status(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<Result<PageRunStatus, StorageError>> {
        let status_str: String = row.get(2)?;
        let status = match status_str.parse::<PageStatus>() {
            Ok(s) => s,
            Err(e) => return Ok(Err(StorageError::Integrity(e))),
        };
        Ok(Ok(PageRunStatus {
            page_id: row.get::<_, i64>(0)? as u64,
            run_id: row.get(1)?,
            status,
            last_revision_id: row.get::<_, Option<i64>>(3)?.map(|id| id as u64),
            error_message: row.get(4)?,
            scraped_at: row.get(5)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageCore;
    use wikivault_types::RunMode;

    #[test]
    fn upsert_is_keyed_on_page_and_run() {
        let core = StorageCore::open_in_memory().unwrap();
        let run = core.runs().start(RunMode::Full).unwrap();
        core.page_status()
            .upsert(&PageRunStatus {
                page_id: 1,
                run_id: run.run_id,
                status: PageStatus::Pending,
                last_revision_id: None,
                error_message: None,
                scraped_at: None,
            })
            .unwrap();
        core.page_status()
            .upsert(&PageRunStatus {
                page_id: 1,
                run_id: run.run_id,
                status: PageStatus::Success,
                last_revision_id: Some(99),
                error_message: None,
                scraped_at: Some(chrono::Utc::now()),
            })
            .unwrap();
        let status = core.page_status().get(1, run.run_id).unwrap().unwrap();
        assert_eq!(status.status, PageStatus::Success);
        assert_eq!(status.last_revision_id, Some(99));
    }

    #[test]
    fn completed_page_ids_includes_success_and_skipped_only() {
        let core = StorageCore::open_in_memory().unwrap();
        let run = core.runs().start(RunMode::Full).unwrap();
        for (page_id, status) in [
            (1, PageStatus::Success),
            (2, PageStatus::Skipped),
            (3, PageStatus::Failed),
            (4, PageStatus::Pending),
        ] {
            core.page_status()
                .upsert(&PageRunStatus {
                    page_id,
                    run_id: run.run_id,
                    status,
                    last_revision_id: None,
                    error_message: None,
                    scraped_at: None,
                })
                .unwrap();
        }
        let mut completed = core.page_status().completed_page_ids(run.run_id).unwrap();
        completed.sort();
        assert_eq!(completed, vec![1, 2]);
    }
}
