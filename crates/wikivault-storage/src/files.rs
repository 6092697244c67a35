use rusqlite::{params, Connection, OptionalExtension};
use wikivault_types::{File, StorageError};

use crate::map_sql_err;

/// Repository over the `files` table (spec §4.6). `filename` is the
/// wiki-wide primary key; file bytes live on disk, never in this table.
pub struct FileRepository<'a> {
    conn: &'a Connection,
}

impl<'a> FileRepository<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, file: &File) -> Result<(), StorageError> {
        self.conn
            .execute(
                "INSERT INTO files(
                     filename, url, description_url, sha1, size, width, height,
                     mime_type, timestamp, uploader
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(filename) DO UPDATE SET
                     url = excluded.url,
                     description_url = excluded.description_url,
                     sha1 = excluded.sha1,
                     size = excluded.size,
                     width = excluded.width,
                     height = excluded.height,
                     mime_type = excluded.mime_type,
                     timestamp = excluded.timestamp,
                     uploader = excluded.uploader",
                params![
                    file.filename,
                    file.url,
                    file.description_url,
                    file.sha1,
                    file.size as i64,
                    file.width,
                    file.height,
                    file.mime_type,
                    file.timestamp,
                    file.uploader,
                ],
            )
            .map_err(map_sql_err)?;
        Ok(())
    }

    pub fn get(&self, filename: &str) -> Result<Option<File>, StorageError> {
        self.conn
            .query_row(
                "SELECT filename, url, description_url, sha1, size, width, height,
                        mime_type, timestamp, uploader
                 FROM files WHERE filename = ?1",
                params![filename],
                Self::row_to_file,
            )
            .optional()
            .map_err(map_sql_err)
    }

    /// True when the stored `sha1` for `filename` differs from `sha1`, i.e.
    /// the file needs to be re-downloaded (spec §4.8: files are re-fetched
    /// only when their hash changes).
    pub fn needs_refresh(&self, filename: &str, sha1: &str) -> Result<bool, StorageError> {
        match self.get(filename)? {
            Some(existing) => Ok(!existing.sha1.eq_ignore_ascii_case(sha1)),
            None => Ok(true),
        }
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(map_sql_err)
    }

    fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<File> {
        Ok(File {
            filename: row.get(0)?,
            url: row.get(1)?,
            description_url: row.get(2)?,
            sha1: row.get(3)?,
            size: row.get::<_, i64>(4)? as u64,
            width: row.get(5)?,
            height: row.get(6)?,
            mime_type: row.get(7)?,
            timestamp: row.get(8)?,
            uploader: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageCore;
    use chrono::Utc;

    fn sample_file(sha1: &str) -> File {
        File {
            filename: "Example.png".to_string(),
            url: "https://example.org/Example.png".to_string(),
            description_url: "https://example.org/File:Example.png".to_string(),
            sha1: sha1.to_string(),
            size: 1024,
            width: Some(100),
            height: Some(200),
            mime_type: "image/png".to_string(),
            timestamp: Utc::now(),
            uploader: Some("Uploader".to_string()),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let core = StorageCore::open_in_memory().unwrap();
        core.files().upsert(&sample_file("abc123")).unwrap();
        let fetched = core.files().get("Example.png").unwrap().unwrap();
        assert_eq!(fetched.sha1, "abc123");
    }

    #[test]
    fn needs_refresh_reports_false_when_hash_unchanged() {
        let core = StorageCore::open_in_memory().unwrap();
        core.files().upsert(&sample_file("abc123")).unwrap();
        assert!(!core.files().needs_refresh("Example.png", "abc123").unwrap());
        assert!(core.files().needs_refresh("Example.png", "different").unwrap());
    }

    #[test]
    fn needs_refresh_is_true_for_unknown_file() {
        let core = StorageCore::open_in_memory().unwrap();
        assert!(core.files().needs_refresh("Nope.png", "abc123").unwrap());
    }
}
