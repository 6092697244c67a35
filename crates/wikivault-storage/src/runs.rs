use rusqlite::{params, Connection, OptionalExtension};
use wikivault_types::{RunMode, RunStatus, ScrapeRun, StorageError};

use crate::map_sql_err;
use crate::schema;

/// Repository over the `scrape_runs` table (spec §4.5, §4.6).
pub struct ScrapeRunRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ScrapeRunRepository<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Start a new run, allocating its `run_id` from the portable id
    /// sequence (there is no other locally-generated id in this schema).
    pub fn start(&self, mode: RunMode) -> Result<ScrapeRun, StorageError> {
        let run_id = schema::next_id(self.conn, "scrape_runs")?;
        let start_time = chrono::Utc::now();
        self.conn
            .execute(
                "INSERT INTO scrape_runs(run_id, mode, start_time, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, mode.to_string(), start_time, RunStatus::Running.as_str()],
            )
            .map_err(map_sql_err)?;
        Ok(ScrapeRun {
            run_id,
            mode,
            start_time,
            end_time: None,
            status: RunStatus::Running,
            pages_scraped: 0,
            revisions_scraped: 0,
            files_downloaded: 0,
            error_message: None,
        })
    }

    /// Mark a run terminal, recording final counters and an optional error.
    pub fn finish(
        &self,
        run_id: i64,
        status: RunStatus,
        pages_scraped: u64,
        revisions_scraped: u64,
        files_downloaded: u64,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        let rows = self
            .conn
            .execute(
                "UPDATE scrape_runs SET
                     status = ?1, end_time = ?2, pages_scraped = ?3,
                     revisions_scraped = ?4, files_downloaded = ?5, error_message = ?6
                 WHERE run_id = ?7",
                params![
                    status.as_str(),
                    chrono::Utc::now(),
                    pages_scraped as i64,
                    revisions_scraped as i64,
                    files_downloaded as i64,
                    error_message,
                    run_id,
                ],
            )
            .map_err(map_sql_err)?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("scrape run {run_id}")));
        }
        Ok(())
    }

    pub fn get(&self, run_id: i64) -> Result<Option<ScrapeRun>, StorageError> {
        self.conn
            .query_row(
                "SELECT run_id, mode, start_time, end_time, status,
                        pages_scraped, revisions_scraped, files_downloaded, error_message
                 FROM scrape_runs WHERE run_id = ?1",
                params![run_id],
                Self::row_to_run,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
            .map_err(map_sql_err)
    }

    /// The most recent run regardless of status, used to resolve "is a run
    /// already in progress" (spec §4.5, §A.7) and "what was the last
    /// successful full run" for incremental mode.
    pub fn latest(&self) -> Result<Option<ScrapeRun>, StorageError> {
        self.conn
            .query_row(
                "SELECT run_id, mode, start_time, end_time, status,
                        pages_scraped, revisions_scraped, files_downloaded, error_message
                 FROM scrape_runs ORDER BY run_id DESC LIMIT 1",
                [],
                Self::row_to_run,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
            .map_err(map_sql_err)
    }

    /// The most recent run still in [`RunStatus::Running`], if any — used
    /// by the run-exclusivity check (spec §A.7) to refuse a concurrent run.
    pub fn running(&self) -> Result<Option<ScrapeRun>, StorageError> {
        self.conn
            .query_row(
                "SELECT run_id, mode, start_time, end_time, status,
                        pages_scraped, revisions_scraped, files_downloaded, error_message
                 FROM scrape_runs WHERE status = ?1 ORDER BY run_id DESC LIMIT 1",
                params![RunStatus::Running.as_str()],
                Self::row_to_run,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
            .map_err(map_sql_err)
    }

    /// The most recent successfully completed run, used as the baseline
    /// timestamp for an incremental run's change window.
    pub fn last_completed(&self) -> Result<Option<ScrapeRun>, StorageError> {
        self.conn
            .query_row(
                "SELECT run_id, mode, start_time, end_time, status,
                        pages_scraped, revisions_scraped, files_downloaded, error_message
                 FROM scrape_runs WHERE status = ?1 ORDER BY run_id DESC LIMIT 1",
                params![RunStatus::Completed.as_str()],
                Self::row_to_run,
            )
            .optional()
            .map_err(map_sql_err)?
            .transpose()
            .map_err(map_sql_err)
    }

    fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ScrapeRun, StorageError>> {
        let mode_str: String = row.get(1)?;
        let mode = match mode_str.as_str() {
            "full" => RunMode::Full,
            "incremental" => RunMode::Incremental,
            other => return Ok(Err(StorageError::Integrity(format!("unknown run mode: {other}")))),
        };
        let status_str: String = row.get(4)?;
        let status = match status_str.parse::<RunStatus>() {
            Ok(s) => s,
            Err(e) => return Ok(Err(StorageError::Integrity(e))),
        };
        Ok(Ok(ScrapeRun {
            run_id: row.get(0)?,
            mode,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            status,
            pages_scraped: row.get::<_, i64>(5)? as u64,
            revisions_scraped: row.get::<_, i64>(6)? as u64,
            files_downloaded: row.get::<_, i64>(7)? as u64,
            error_message: row.get(8)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageCore;

    #[test]
    fn start_allocates_increasing_run_ids() {
        let core = StorageCore::open_in_memory().unwrap();
        let first = core.runs().start(RunMode::Full).unwrap();
        let second = core.runs().start(RunMode::Incremental).unwrap();
        assert_eq!(first.run_id, 1);
        assert_eq!(second.run_id, 2);
    }

    #[test]
    fn running_returns_none_once_finished() {
        let core = StorageCore::open_in_memory().unwrap();
        let run = core.runs().start(RunMode::Full).unwrap();
        assert!(core.runs().running().unwrap().is_some());
        core.runs()
            .finish(run.run_id, RunStatus::Completed, 10, 20, 0, None)
            .unwrap();
        assert!(core.runs().running().unwrap().is_none());
    }

    #[test]
    fn last_completed_ignores_failed_runs() {
        let core = StorageCore::open_in_memory().unwrap();
        let run = core.runs().start(RunMode::Full).unwrap();
        core.runs()
            .finish(run.run_id, RunStatus::Failed, 0, 0, 0, Some("boom"))
            .unwrap();
        assert!(core.runs().last_completed().unwrap().is_none());

        let run2 = core.runs().start(RunMode::Full).unwrap();
        core.runs()
            .finish(run2.run_id, RunStatus::Completed, 5, 5, 0, None)
            .unwrap();
        assert_eq!(core.runs().last_completed().unwrap().unwrap().run_id, run2.run_id);
    }
}
