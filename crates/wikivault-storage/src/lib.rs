//! # Storage Core
//!
//! Owns the single rusqlite connection, the schema migrator, and a
//! repository per entity (spec §4.6, §5, §6.2). Repositories hold a shared
//! `&Connection` rather than an owned/exclusive one, so callers can obtain
//! several at once (e.g. the Full Orchestrator needs `pages()`, `revisions()`
//! and `links()` in the same loop iteration); writes are serialized by
//! [`tx::with_transaction`] issuing `BEGIN IMMEDIATE` rather than by the type
//! system.
//!
//! The schema dialect deliberately avoids `AUTOINCREMENT`, a native JSON
//! column type, and a timezone-aware timestamp type, so the same DDL would
//! also run unmodified against a server SQL engine (spec §A.6).

mod files;
mod links;
mod page_status;
mod pages;
mod revisions;
mod runs;
mod schema;
mod tx;

use std::path::Path;

use rusqlite::Connection;
use wikivault_types::{rusqlite_error_shim::SqlError, StorageError};

pub use files::FileRepository;
pub use links::LinkRepository;
pub use page_status::PageRunStatusRepository;
pub use pages::PageRepository;
pub use revisions::RevisionRepository;
pub use runs::ScrapeRunRepository;
pub use schema::CURRENT_SCHEMA_VERSION;

/// Converts a `rusqlite::Error` into the crate-agnostic [`StorageError`],
/// recognizing lock contention and constraint violations specially so
/// callers can distinguish transient from fatal failures without depending
/// on rusqlite themselves.
pub(crate) fn map_sql_err(err: rusqlite::Error) -> StorageError {
    use rusqlite::ffi::ErrorCode;

    if let rusqlite::Error::SqliteFailure(sqlite_err, ref message) = err {
        match sqlite_err.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                return StorageError::Locked;
            }
            ErrorCode::ConstraintViolation => {
                let detail = message.clone().unwrap_or_else(|| err.to_string());
                return StorageError::Integrity(detail);
            }
            _ => {}
        }
    }

    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
        return StorageError::NotFound("query returned no rows".to_string());
    }

    StorageError::Sql(SqlError(err.to_string()))
}

/// Owns the connection and hands out repositories over it.
pub struct StorageCore {
    conn: Connection,
}

impl StorageCore {
    /// Open (creating if absent) the database at `path`, apply pragmas, and
    /// run the schema migrator.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(map_sql_err)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests and by callers that want a
    /// scratch store with no persistence.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(map_sql_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(map_sql_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(map_sql_err)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn pages(&self) -> PageRepository<'_> {
        PageRepository::new(&self.conn)
    }

    pub fn revisions(&self) -> RevisionRepository<'_> {
        RevisionRepository::new(&self.conn)
    }

    pub fn files(&self) -> FileRepository<'_> {
        FileRepository::new(&self.conn)
    }

    pub fn links(&self) -> LinkRepository<'_> {
        LinkRepository::new(&self.conn)
    }

    pub fn runs(&self) -> ScrapeRunRepository<'_> {
        ScrapeRunRepository::new(&self.conn)
    }

    pub fn page_status(&self) -> PageRunStatusRepository<'_> {
        PageRunStatusRepository::new(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let core = StorageCore::open_in_memory().unwrap();
        assert_eq!(
            core.pages().count().unwrap(),
            0,
            "fresh store has no pages"
        );
    }

    #[test]
    fn open_on_disk_round_trips_through_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("wiki.sqlite3");

        {
            let core = StorageCore::open(&db_path).unwrap();
            core.pages()
                .upsert(&wikivault_types::Page {
                    page_id: 1,
                    namespace: 0,
                    title: "Main Page".to_string(),
                    is_redirect: false,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                })
                .unwrap();
        }

        let reopened = StorageCore::open(&db_path).unwrap();
        assert!(reopened.pages().get(1).unwrap().is_some());
    }
}
