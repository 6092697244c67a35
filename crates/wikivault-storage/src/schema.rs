//! Schema migrator (spec §4.6, §6.2, §A.6).
//!
//! The DDL below is written in the dialect common to SQLite and a server
//! engine such as PostgreSQL: no `AUTOINCREMENT`, no native JSON column type
//! (JSON payloads are TEXT), no timezone-aware timestamp type (timestamps
//! are TEXT in RFC 3339). Locally-generated ids (`scrape_runs.run_id`) come
//! from `id_sequences`, a portable counter table, rather than any
//! engine-specific identity/serial vocabulary.

use rusqlite::Connection;
use wikivault_types::StorageError;

use crate::map_sql_err;

/// The schema version this build knows how to read and write. Bumped
/// whenever the DDL below changes in a way that isn't purely additive.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS id_sequences (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pages (
    page_id     INTEGER PRIMARY KEY,
    namespace   INTEGER NOT NULL,
    title       TEXT NOT NULL,
    is_redirect INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(namespace, title)
);
CREATE INDEX IF NOT EXISTS idx_pages_title ON pages(title);
CREATE INDEX IF NOT EXISTS idx_pages_namespace ON pages(namespace);
CREATE INDEX IF NOT EXISTS idx_pages_is_redirect ON pages(page_id) WHERE is_redirect = 1;

CREATE TABLE IF NOT EXISTS revisions (
    revision_id INTEGER PRIMARY KEY,
    page_id     INTEGER NOT NULL REFERENCES pages(page_id) ON DELETE CASCADE,
    parent_id   INTEGER REFERENCES revisions(revision_id) ON DELETE SET NULL,
    timestamp   TEXT NOT NULL,
    user        TEXT,
    user_id     INTEGER,
    comment     TEXT,
    content     TEXT NOT NULL,
    size        INTEGER NOT NULL CHECK(size >= 0),
    sha1        TEXT NOT NULL,
    minor       INTEGER NOT NULL DEFAULT 0,
    tags        TEXT
);
CREATE INDEX IF NOT EXISTS idx_revisions_page_timestamp ON revisions(page_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_revisions_timestamp ON revisions(timestamp);
CREATE INDEX IF NOT EXISTS idx_revisions_sha1 ON revisions(sha1);
CREATE INDEX IF NOT EXISTS idx_revisions_parent_id ON revisions(parent_id) WHERE parent_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_revisions_user_id ON revisions(user_id) WHERE user_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS files (
    filename        TEXT PRIMARY KEY,
    url             TEXT NOT NULL,
    description_url TEXT NOT NULL,
    sha1            TEXT NOT NULL,
    size            INTEGER NOT NULL CHECK(size >= 0),
    width           INTEGER,
    height          INTEGER,
    mime_type       TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    uploader        TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_sha1 ON files(sha1);
CREATE INDEX IF NOT EXISTS idx_files_timestamp ON files(timestamp);
CREATE INDEX IF NOT EXISTS idx_files_mime_type ON files(mime_type);

CREATE TABLE IF NOT EXISTS links (
    source_page_id INTEGER NOT NULL REFERENCES pages(page_id) ON DELETE CASCADE,
    target_title   TEXT NOT NULL,
    link_type      TEXT NOT NULL,
    UNIQUE(source_page_id, target_title, link_type)
);
CREATE INDEX IF NOT EXISTS idx_links_source_page_id ON links(source_page_id);
CREATE INDEX IF NOT EXISTS idx_links_target_title ON links(target_title);
CREATE INDEX IF NOT EXISTS idx_links_link_type ON links(link_type);
CREATE INDEX IF NOT EXISTS idx_links_type_target ON links(link_type, target_title);

CREATE TABLE IF NOT EXISTS scrape_runs (
    run_id            INTEGER PRIMARY KEY,
    mode              TEXT NOT NULL,
    start_time        TEXT NOT NULL,
    end_time          TEXT,
    status            TEXT NOT NULL,
    pages_scraped     INTEGER NOT NULL DEFAULT 0,
    revisions_scraped INTEGER NOT NULL DEFAULT 0,
    files_downloaded  INTEGER NOT NULL DEFAULT 0,
    error_message     TEXT
);
CREATE INDEX IF NOT EXISTS idx_scrape_runs_status ON scrape_runs(status);
CREATE INDEX IF NOT EXISTS idx_scrape_runs_start_time ON scrape_runs(start_time DESC);

CREATE TABLE IF NOT EXISTS scrape_page_status (
    page_id          INTEGER NOT NULL,
    run_id           INTEGER NOT NULL REFERENCES scrape_runs(run_id) ON DELETE CASCADE,
    status           TEXT NOT NULL,
    last_revision_id INTEGER,
    error_message    TEXT,
    scraped_at       TEXT,
    PRIMARY KEY(page_id, run_id)
);
CREATE INDEX IF NOT EXISTS idx_scrape_page_status_run_id ON scrape_page_status(run_id);
CREATE INDEX IF NOT EXISTS idx_scrape_page_status_status ON scrape_page_status(status);

CREATE TABLE IF NOT EXISTS latest_content (
    page_id        INTEGER PRIMARY KEY,
    title          TEXT NOT NULL,
    latest_content TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS trg_revisions_latest_content
AFTER INSERT ON revisions
BEGIN
    INSERT INTO latest_content(page_id, title, latest_content)
    SELECT p.page_id, p.title, r.content
    FROM pages p
    JOIN revisions r ON r.page_id = p.page_id
    WHERE p.page_id = NEW.page_id
    ORDER BY r.timestamp DESC, r.revision_id DESC
    LIMIT 1
    ON CONFLICT(page_id) DO UPDATE SET
        title = excluded.title,
        latest_content = excluded.latest_content;
END;

CREATE TRIGGER IF NOT EXISTS trg_pages_title_latest_content
AFTER UPDATE OF title ON pages
BEGIN
    UPDATE latest_content SET title = NEW.title WHERE page_id = NEW.page_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_pages_delete_latest_content
AFTER DELETE ON pages
BEGIN
    DELETE FROM latest_content WHERE page_id = OLD.page_id;
END;
"#;

/// Apply the schema to `conn` (idempotent — every statement is `IF NOT
/// EXISTS`), then record or validate `schema_version`. Refuses to proceed
/// if an existing database reports a version newer than this build knows.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update(None, "foreign_keys", true)
        .map_err(map_sql_err)?;

    let has_version_table: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map_err(map_sql_err)?
        > 0;

    if !has_version_table {
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER NOT NULL, applied_at TEXT NOT NULL);",
        )
        .map_err(map_sql_err)?;
    }

    conn.execute_batch(DDL).map_err(map_sql_err)?;

    let existing: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .map_err(map_sql_err)?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO schema_version(version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![CURRENT_SCHEMA_VERSION, chrono::Utc::now()],
            )
            .map_err(map_sql_err)?;
        }
        Some(version) if version > CURRENT_SCHEMA_VERSION => {
            return Err(StorageError::UnknownSchemaVersion(version));
        }
        Some(_) => {}
    }

    Ok(())
}

/// Allocate the next value of a named, portable sequence (no engine-specific
/// identity/serial column is used so the schema stays dialect-neutral).
pub(crate) fn next_id(conn: &Connection, sequence: &str) -> Result<i64, StorageError> {
    conn.execute(
        "INSERT INTO id_sequences(name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        rusqlite::params![sequence],
    )
    .map_err(map_sql_err)?;
    conn.query_row(
        "SELECT value FROM id_sequences WHERE name = ?1",
        rusqlite::params![sequence],
        |row| row.get(0),
    )
    .map_err(map_sql_err)
}
