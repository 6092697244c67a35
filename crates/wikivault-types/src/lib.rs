//! # Types
//!
//! Shared domain types for wikivault: the entities persisted by the storage
//! core ([`Page`], [`Revision`], [`File`], [`Link`]), the run-tracking
//! records ([`ScrapeRun`], [`PageRunStatus`]), the incremental [`ChangeSet`],
//! and the error taxonomy every other crate in the workspace returns.
//!
//! ## Serialization
//!
//! These types are serialized in two places only: the checkpoint JSON file
//! and the database rows (via the storage core's own row mapping). Both use
//! explicit marshalling; there is no generic reflection-based persistence.
//! Durations are serialized as milliseconds so they round-trip regardless of
//! whether they were supplied as a human string (`"30s"`) or a raw integer.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Deserialize a [`Duration`] from either a human-readable string (`"30s"`) or
/// a raw integer number of milliseconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        String(String),
        U64(u64),
    }

    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {e}"))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serialize a [`Duration`] as milliseconds so it round-trips with
/// [`deserialize_duration`].
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

// ---------------------------------------------------------------------------
// Core entities (spec §3)
// ---------------------------------------------------------------------------

/// A wiki page. `(namespace, title)` is unique; `page_id` is assigned by the
/// source wiki and never regenerated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_id: u64,
    pub namespace: i32,
    pub title: String,
    pub is_redirect: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable revision of a page's wikitext. `revision_id` comes from the
/// source wiki, is globally unique, and is never re-assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub revision_id: u64,
    pub page_id: u64,
    pub parent_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub user: Option<String>,
    pub user_id: Option<u64>,
    pub comment: Option<String>,
    pub content: String,
    pub size: u64,
    /// Lowercase hex SHA1 of `content`.
    pub sha1: String,
    pub minor: bool,
    pub tags: Option<Vec<String>>,
}

impl Revision {
    /// Compute the lowercase hex SHA1 of `content`. Used to validate the
    /// wiki-reported `sha1` field rather than trust it blindly (spec §9's
    /// open question is resolved in favor of validation).
    pub fn content_sha1(content: &str) -> String {
        sha1_hex(content.as_bytes())
    }

    /// True if `sha1` matches the hash of `content`.
    pub fn sha1_matches_content(&self) -> bool {
        self.sha1.eq_ignore_ascii_case(&Self::content_sha1(&self.content))
    }
}

/// An uploaded file's metadata. `filename` is the wiki-wide primary key;
/// content bytes are written to a data directory, never to the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub filename: String,
    pub url: String,
    pub description_url: String,
    pub sha1: String,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: String,
    pub timestamp: DateTime<Utc>,
    pub uploader: Option<String>,
}

/// Classification of a wikitext link, derived from its bracket syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Page,
    Template,
    File,
    Category,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Page => "page",
            LinkType::Template => "template",
            LinkType::File => "file",
            LinkType::Category => "category",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(LinkType::Page),
            "template" => Ok(LinkType::Template),
            "file" => Ok(LinkType::File),
            "category" => Ok(LinkType::Category),
            other => Err(format!("unknown link_type: {other}")),
        }
    }
}

/// A directed edge from a page's latest revision to a (possibly
/// not-yet-existing) target title. `(source_page_id, target_title,
/// link_type)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source_page_id: u64,
    pub target_title: String,
    pub link_type: LinkType,
}

// ---------------------------------------------------------------------------
// Run tracking (spec §3)
// ---------------------------------------------------------------------------

/// Which pipeline mode produced a [`ScrapeRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Full,
    Incremental,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => f.write_str("full"),
            RunMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Terminal and non-terminal states of a [`ScrapeRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "interrupted" => Ok(RunStatus::Interrupted),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A single orchestrator invocation: start/end timestamps, terminal status,
/// and running counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub run_id: i64,
    pub mode: RunMode,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub pages_scraped: u64,
    pub revisions_scraped: u64,
    pub files_downloaded: u64,
    pub error_message: Option<String>,
}

/// Per-page outcome of a single run, used for resume granularity and
/// failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl PageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PageStatus::Pending => "pending",
            PageStatus::Success => "success",
            PageStatus::Failed => "failed",
            PageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PageStatus::Pending),
            "success" => Ok(PageStatus::Success),
            "failed" => Ok(PageStatus::Failed),
            "skipped" => Ok(PageStatus::Skipped),
            other => Err(format!("unknown page status: {other}")),
        }
    }
}

/// `(page_id, run_id)` composite-keyed status row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRunStatus {
    pub page_id: u64,
    pub run_id: i64,
    pub status: PageStatus,
    pub last_revision_id: Option<u64>,
    pub error_message: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Discovery / change descriptors
// ---------------------------------------------------------------------------

/// A page as returned by `list=allpages`, before it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub page_id: u64,
    pub namespace: i32,
    pub title: String,
    pub is_redirect: bool,
}

/// A page move observed in the log-event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovedPage {
    pub page_id: u64,
    pub new_namespace: i32,
    pub new_title: String,
}

/// The four-bucket classification produced by the Change Detector (spec
/// §4.12). Buckets are disjoint: a page appearing in more than one category
/// within the window collapses to the most recent action
/// (delete > move > edit > new).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub new_page_ids: Vec<u64>,
    pub modified_page_ids: Vec<u64>,
    pub moved: Vec<MovedPage>,
    pub deleted_page_ids: Vec<u64>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_page_ids.is_empty()
            && self.modified_page_ids.is_empty()
            && self.moved.is_empty()
            && self.deleted_page_ids.is_empty()
    }

    pub fn total_pages(&self) -> usize {
        self.new_page_ids.len() + self.modified_page_ids.len() + self.moved.len()
            + self.deleted_page_ids.len()
    }
}

// ---------------------------------------------------------------------------
// Run summary (spec §7 "user-visible behaviour" / §A.7)
// ---------------------------------------------------------------------------

/// One sample failure surfaced in a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFailure {
    pub page_id: Option<u64>,
    pub message: String,
}

/// Bounded end-of-run report: up to five failing IDs, three messages, and an
/// "... and K more" indicator rather than an unbounded list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub mode: RunMode,
    pub status: RunStatus,
    pub pages_processed: u64,
    pub revisions_stored: u64,
    pub files_downloaded: u64,
    pub duration: Duration,
    pub sample_failures: Vec<SampleFailure>,
    pub failed_page_count: usize,
}

pub const MAX_SAMPLE_FAILURE_IDS: usize = 5;
pub const MAX_SAMPLE_FAILURE_MESSAGES: usize = 3;

impl RunSummary {
    /// Build the bounded sample-failure list from a (possibly much longer)
    /// list of `(page_id, message)` pairs, truncating per
    /// [`MAX_SAMPLE_FAILURE_IDS`] / [`MAX_SAMPLE_FAILURE_MESSAGES`].
    pub fn sample_failures_from(failures: &[(Option<u64>, String)]) -> Vec<SampleFailure> {
        failures
            .iter()
            .take(MAX_SAMPLE_FAILURE_IDS.max(MAX_SAMPLE_FAILURE_MESSAGES))
            .map(|(page_id, message)| SampleFailure {
                page_id: *page_id,
                message: message.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy (spec §7)
// ---------------------------------------------------------------------------

/// Errors surfaced by the HTTP/API layer. `is_transient` is a predicate over
/// the value, not a type hierarchy — the retry engine queries it rather than
/// matching on error subtypes (spec §9).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("server error: HTTP {0}")]
    Http5xx(u16),
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("maxlag exceeded, server requested {seconds}s wait")]
    MaxLag { seconds: u64 },
    #[error("database lock encountered while persisting a response")]
    StorageLocked,
    #[error("client error: HTTP {0}")]
    Http4xx(u16),
    #[error("response failed schema validation: {0}")]
    SchemaViolation(String),
    #[error("page not found: {0}")]
    NotFound(String),
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    /// True for the transient error set in spec §4.3/§7: timeouts,
    /// connection errors, 5xx, 429, maxlag, and a database lock bubbling up
    /// from storage.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout
                | ApiError::Connection(_)
                | ApiError::Http5xx(_)
                | ApiError::RateLimited
                | ApiError::MaxLag { .. }
                | ApiError::StorageLocked
        )
    }
}

/// Errors from the storage core. Integrity violations are fatal (they
/// indicate an invariant breach); lock contention is transient.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("database is locked")]
    Locked,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unknown schema version {0}, refusing to proceed")]
    UnknownSchemaVersion(i64),
    #[error(transparent)]
    Sql(#[from] rusqlite_error_shim::SqlError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Locked)
    }
}

/// Minimal indirection so `wikivault-types` does not need to depend on
/// `rusqlite` itself; `wikivault-storage` converts `rusqlite::Error` into
/// this shim via `From`.
pub mod rusqlite_error_shim {
    use std::fmt;

    #[derive(Debug)]
    pub struct SqlError(pub String);

    impl fmt::Display for SqlError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl std::error::Error for SqlError {}
}

/// Errors from the checkpoint store. A corrupt file is a warning, not a
/// failure (the caller treats it as no-checkpoint); a write failure is fatal
/// because resumability can no longer be guaranteed.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint file is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to write checkpoint: {0}")]
    WriteFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from configuration loading/merging. Detected only after all
/// sources are merged (spec §6.4/§7).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {message}")]
    Invalid { field: String, message: String },
    #[error("missing required field `{field}`")]
    Missing { field: String },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Preconditions that must hold before an orchestrator may start, surfaced
/// as a distinct kind so the front end can give the user a clear remedy
/// (spec §4.13/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error(
        "incremental run requires a prior completed full scrape; run a full scrape first"
    )]
    FirstRunRequiresFullScrape,
    #[error("another run is already in progress against this database")]
    RunAlreadyInProgress,
}

// ---------------------------------------------------------------------------
// SHA1 (content hashing, spec §3/§8)
// ---------------------------------------------------------------------------

/// SHA1 of `data`, lowercase hex. MediaWiki computes this hash itself and
/// publishes it in `rvprop=sha1`; wikivault recomputes it independently via
/// the RustCrypto `Digest` family rather than trusting the wiki's value
/// (spec §9's open question, resolved toward validation).
pub fn sha1_hex(data: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
