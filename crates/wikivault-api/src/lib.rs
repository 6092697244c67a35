//! The API Client (spec §4.3): typed MediaWiki endpoints over the HTTP
//! Client and Rate Limiter, with server-driven continuation handling and
//! transient/permanent error classification.
//!
//! Every endpoint is exposed as a lazy, rate-limited sequence: each `next()`
//! call issues at most one rate-limited HTTP request and yields the records
//! from that page of results, pulling a fresh continuation token when the
//! buffer is exhausted. Consumers drive the pull rate — there is no internal
//! buffering beyond a single page (spec §9's "lazy sequences driven by API
//! continuation").
//!
//! `maxlag` is attached to every query per spec §6.1; a response reporting a
//! `maxlag` condition is classified transient (`ApiError::MaxLag`) rather
//! than a parse failure, per §A.7.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use wikivault_http::HttpSession;
use wikivault_ratelimit::RateLimiter;
use wikivault_types::{ApiError, File as WikiFile, PageDescriptor, Revision};

/// Configuration for constructing an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub rate_limit_per_second: f64,
    /// Seconds of replication lag the server may report before we back off;
    /// attached to every query as `maxlag` (spec §6.1).
    pub maxlag_seconds: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: format!("wikivault/{} (https://github.com/wikivault/wikivault)", env!("CARGO_PKG_VERSION")),
            timeout: wikivault_http::DEFAULT_TIMEOUT,
            rate_limit_per_second: 2.0,
            maxlag_seconds: 5,
        }
    }
}

/// The MediaWiki API client. Owns the HTTP session and rate limiter; every
/// request (including continuation pulls) passes through `wait()` first.
pub struct ApiClient {
    session: HttpSession,
    base_url: String,
    limiter: RateLimiter,
    maxlag_seconds: u64,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let session = HttpSession::new(config.timeout, config.user_agent)
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        Ok(Self {
            session,
            base_url: config.base_url,
            limiter: RateLimiter::new(config.rate_limit_per_second),
            maxlag_seconds: config.maxlag_seconds,
        })
    }

    /// Issue one rate-limited GET to `action=query` (or another action) with
    /// `params`, returning the parsed JSON body. Classifies transport and
    /// HTTP-level failures into [`ApiError`].
    fn get(&self, mut params: Vec<(&str, String)>) -> Result<Value, ApiError> {
        params.push(("format", "json".to_string()));
        params.push(("maxlag", self.maxlag_seconds.to_string()));

        self.limiter.wait();

        let response = self
            .session
            .client()
            .get(&self.base_url)
            .query(&params)
            .send()
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ApiError::Http5xx(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(ApiError::Http4xx(status.as_u16()));
        }

        let body: Value = response
            .json()
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        if let Some(seconds) = maxlag_wait_seconds(&body) {
            return Err(ApiError::MaxLag { seconds });
        }
        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_str).unwrap_or("");
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown API error");
            if code == "maxlag" {
                return Err(ApiError::MaxLag {
                    seconds: self.maxlag_seconds,
                });
            }
            return Err(ApiError::SchemaViolation(format!("{code}: {info}")));
        }

        Ok(body)
    }

    /// `list=allpages` (spec §4.3, §6.1), paginated via continuation. One
    /// rate-limited call per page of results.
    pub fn list_pages(&self, namespace: i32) -> PageStream<'_> {
        PageStream {
            client: self,
            namespace,
            buffer: Vec::new().into_iter(),
            continuation: Some(HashMap::new()),
            exhausted: false,
        }
    }

    /// `prop=revisions`, paginated, content-bearing. `since` restricts to
    /// revisions strictly after that timestamp.
    ///
    /// Content MUST be read from the response's body field
    /// (`slots.main.*`/`*`), not a summary/comment field — a historical bug
    /// relying on the wrong field silently yielded empty revision content.
    pub fn fetch_revisions<'a>(
        &'a self,
        page_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> RevisionStream<'a> {
        RevisionStream {
            client: self,
            page_id,
            since,
            buffer: Vec::new().into_iter(),
            continuation: Some(HashMap::new()),
            exhausted: false,
        }
    }

    /// `prop=imageinfo` for a single file.
    pub fn fetch_file_info(&self, filename: &str) -> Result<WikiFile, ApiError> {
        let title = format!("File:{filename}");
        let body = self.get(vec![
            ("action", "query".to_string()),
            ("prop", "imageinfo".to_string()),
            ("iiprop", "url|size|sha1|mime|timestamp|user".to_string()),
            ("titles", title),
        ])?;

        let pages = body
            .pointer("/query/pages")
            .ok_or_else(|| ApiError::SchemaViolation("missing query.pages".into()))?;

        let page = pages
            .as_object()
            .and_then(|m| m.values().next())
            .ok_or_else(|| ApiError::SchemaViolation("empty query.pages".into()))?;

        if page.get("missing").is_some() {
            return Err(ApiError::NotFound(filename.to_string()));
        }

        let info = page
            .pointer("/imageinfo/0")
            .ok_or_else(|| ApiError::NotFound(filename.to_string()))?;

        let wire: FileInfoWire =
            serde_json::from_value(info.clone()).map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(WikiFile {
            filename: filename.to_string(),
            url: wire.url,
            description_url: wire.descriptionurl.unwrap_or_default(),
            sha1: wire.sha1,
            size: wire.size,
            width: wire.width,
            height: wire.height,
            mime_type: wire.mime,
            timestamp: wire.timestamp,
            uploader: wire.user,
        })
    }

    /// Download file bytes and verify the SHA1 against `expected_sha1`
    /// (spec §4.3, §4.9).
    pub fn download_file(&self, url: &str, expected_sha1: &str) -> Result<Vec<u8>, ApiError> {
        self.limiter.wait();
        let response = self
            .session
            .client()
            .get(url)
            .send()
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ApiError::Http5xx(status.as_u16()));
        }
        if status.is_client_error() {
            return Err(ApiError::Http4xx(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .map_err(classify_reqwest_error)?
            .to_vec();
        let actual = wikivault_types::sha1_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected_sha1) {
            return Err(ApiError::SchemaViolation(format!(
                "sha1 mismatch: expected {expected_sha1}, got {actual}"
            )));
        }
        Ok(bytes)
    }

    /// `list=recentchanges` in `[since, until]`.
    pub fn recent_changes<'a>(
        &'a self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RecentChangesStream<'a> {
        RecentChangesStream {
            client: self,
            since,
            until,
            buffer: Vec::new().into_iter(),
            continuation: Some(HashMap::new()),
            exhausted: false,
        }
    }

    /// `list=logevents` for `le_type` (`"move"` or `"delete"`) in `[since, until]`.
    pub fn log_events<'a>(
        &'a self,
        le_type: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> LogEventStream<'a> {
        LogEventStream {
            client: self,
            le_type: le_type.to_string(),
            since,
            until,
            buffer: Vec::new().into_iter(),
            continuation: Some(HashMap::new()),
            exhausted: false,
        }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_connect() {
        ApiError::Connection(err.to_string())
    } else if let Some(status) = err.status() {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ApiError::RateLimited
        } else if status.is_server_error() {
            ApiError::Http5xx(status.as_u16())
        } else {
            ApiError::Http4xx(status.as_u16())
        }
    } else {
        ApiError::Connection(err.to_string())
    }
}

/// Detect a MediaWiki `maxlag` condition carried on an HTTP 200 body
/// (`{"error": {"code": "maxlag", "lag": N}}`), returning the server's
/// suggested wait in seconds.
fn maxlag_wait_seconds(body: &Value) -> Option<u64> {
    let error = body.get("error")?;
    let code = error.get("code")?.as_str()?;
    if code != "maxlag" {
        return None;
    }
    let lag = error.get("lag").and_then(Value::as_u64).unwrap_or(5);
    Some(lag)
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FileInfoWire {
    url: String,
    descriptionurl: Option<String>,
    sha1: String,
    size: u64,
    width: Option<u32>,
    height: Option<u32>,
    mime: String,
    timestamp: DateTime<Utc>,
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllPagesWire {
    pageid: u64,
    ns: i32,
    title: String,
    #[serde(default)]
    redirect: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RevisionWire {
    revid: u64,
    #[serde(default)]
    parentid: Option<u64>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    userid: Option<u64>,
    #[serde(default)]
    anon: Option<Value>,
    #[serde(default)]
    comment: Option<String>,
    /// The historical-bug field: content lives here, not in any summary
    /// field. See module docs.
    #[serde(rename = "*", default)]
    content: Option<String>,
    #[serde(default)]
    slots: Option<RevisionSlots>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    sha1: Option<String>,
    #[serde(default)]
    minor: Option<Value>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlots {
    main: RevisionSlotMain,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotMain {
    #[serde(rename = "*", default)]
    content: Option<String>,
}

impl RevisionWire {
    fn body_content(&self) -> String {
        self.content
            .clone()
            .or_else(|| self.slots.as_ref().and_then(|s| s.main.content.clone()))
            .unwrap_or_default()
    }

    fn into_revision(self, page_id: u64) -> Revision {
        let content = self.body_content();
        // Recomputed unconditionally rather than trusted from the wire: spec
        // §9's open question on sha1 resolves to validation, and the
        // cheapest way to guarantee "sha1 == sha1(content)" as an invariant
        // is to never store anything else (§8's testable property).
        let sha1 = Revision::content_sha1(&content);
        if let Some(reported) = &self.sha1 {
            if !reported.eq_ignore_ascii_case(&sha1) {
                tracing::warn!(revision_id = self.revid, "wiki-reported sha1 disagrees with recomputed sha1");
            }
        }
        Revision {
            revision_id: self.revid,
            page_id,
            parent_id: self.parentid.filter(|id| *id != 0),
            timestamp: self.timestamp,
            user: self.user,
            user_id: if self.anon.is_some() { None } else { self.userid },
            comment: self.comment,
            size: self.size.unwrap_or(content.len() as u64),
            content,
            sha1,
            minor: self.minor.is_some(),
            tags: self.tags.filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentChangeWire {
    #[serde(rename = "type")]
    kind: String,
    pageid: u64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    revid: Option<u64>,
}

/// A single `recentchanges` record (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct RecentChange {
    pub page_id: u64,
    pub kind: RecentChangeKind,
    pub timestamp: DateTime<Utc>,
    pub last_revision_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecentChangeKind {
    New,
    Edit,
}

#[derive(Debug, Deserialize)]
struct LogEventWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    pageid: Option<u64>,
    title: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    params: Option<Value>,
}

/// A single `logevents` record, for `type=move` or `type=delete` (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Move {
        page_id: Option<u64>,
        old_title: String,
        new_title: String,
        /// The move target's namespace, from the log event's
        /// `params.target_ns` (MediaWiki reports the destination namespace
        /// directly; it is never inferred from the old page's namespace,
        /// since a move can cross namespaces).
        new_namespace: Option<i32>,
        timestamp: DateTime<Utc>,
    },
    Delete {
        page_id: Option<u64>,
        title: String,
        timestamp: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// Lazy, continuation-driven streams
// ---------------------------------------------------------------------------

fn continuation_params(continuation: &HashMap<String, String>) -> Vec<(String, String)> {
    continuation
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn next_continuation(body: &Value) -> Option<HashMap<String, String>> {
    let cont = body.get("continue")?.as_object()?;
    Some(
        cont.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

/// Lazy sequence of [`PageDescriptor`], pulled one page of API results at a
/// time (spec §4.3, §9).
pub struct PageStream<'a> {
    client: &'a ApiClient,
    namespace: i32,
    buffer: std::vec::IntoIter<PageDescriptor>,
    continuation: Option<HashMap<String, String>>,
    exhausted: bool,
}

impl<'a> PageStream<'a> {
    fn pull(&mut self) -> Result<(), ApiError> {
        let Some(continuation) = self.continuation.take() else {
            self.exhausted = true;
            return Ok(());
        };

        let mut params = vec![
            ("action".to_string(), "query".to_string()),
            ("list".to_string(), "allpages".to_string()),
            ("apnamespace".to_string(), self.namespace.to_string()),
            ("aplimit".to_string(), "max".to_string()),
        ];
        params.extend(continuation_params(&continuation));
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let body = self.client.get(params)?;
        let items = body
            .pointer("/query/allpages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut pages = Vec::with_capacity(items.len());
        for item in items {
            let wire: AllPagesWire =
                serde_json::from_value(item).map_err(|e| ApiError::Parse(e.to_string()))?;
            pages.push(PageDescriptor {
                page_id: wire.pageid,
                namespace: wire.ns,
                title: wire.title,
                is_redirect: wire.redirect.is_some(),
            });
        }

        self.continuation = next_continuation(&body);
        self.buffer = pages.into_iter();
        Ok(())
    }
}

impl<'a> Iterator for PageStream<'a> {
    type Item = Result<PageDescriptor, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(page) = self.buffer.next() {
                return Some(Ok(page));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.pull() {
                self.exhausted = true;
                return Some(Err(e));
            }
            if self.buffer.len() == 0 && self.continuation.is_none() {
                self.exhausted = true;
            }
        }
    }
}

/// Lazy sequence of [`Revision`] for one page.
pub struct RevisionStream<'a> {
    client: &'a ApiClient,
    page_id: u64,
    since: Option<DateTime<Utc>>,
    buffer: std::vec::IntoIter<Revision>,
    continuation: Option<HashMap<String, String>>,
    exhausted: bool,
}

impl<'a> RevisionStream<'a> {
    fn pull(&mut self) -> Result<(), ApiError> {
        let Some(continuation) = self.continuation.take() else {
            self.exhausted = true;
            return Ok(());
        };

        let mut params = vec![
            ("action".to_string(), "query".to_string()),
            ("prop".to_string(), "revisions".to_string()),
            ("pageids".to_string(), self.page_id.to_string()),
            (
                "rvprop".to_string(),
                "ids|timestamp|user|userid|comment|content|sha1|size|tags|flags".to_string(),
            ),
            ("rvlimit".to_string(), "max".to_string()),
            ("rvdir".to_string(), "newer".to_string()),
        ];
        if let Some(since) = self.since {
            params.push(("rvstart".to_string(), since.to_rfc3339()));
        }
        params.extend(continuation_params(&continuation));
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let body = self.client.get(params)?;
        let pages = body
            .pointer("/query/pages")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let Some(page) = pages.values().next() else {
            self.exhausted = true;
            return Ok(());
        };
        if page.get("missing").is_some() {
            return Err(ApiError::NotFound(self.page_id.to_string()));
        }

        let revisions_json = page
            .get("revisions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut revisions = Vec::with_capacity(revisions_json.len());
        for item in revisions_json {
            let wire: RevisionWire =
                serde_json::from_value(item).map_err(|e| ApiError::Parse(e.to_string()))?;
            let revision = wire.into_revision(self.page_id);
            if self.since.is_none_or(|since| revision.timestamp > since) {
                revisions.push(revision);
            }
        }

        self.continuation = next_continuation(&body);
        self.buffer = revisions.into_iter();
        Ok(())
    }
}

impl<'a> Iterator for RevisionStream<'a> {
    type Item = Result<Revision, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rev) = self.buffer.next() {
                return Some(Ok(rev));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.pull() {
                self.exhausted = true;
                return Some(Err(e));
            }
            if self.buffer.len() == 0 && self.continuation.is_none() {
                self.exhausted = true;
            }
        }
    }
}

/// Lazy sequence of [`RecentChange`].
pub struct RecentChangesStream<'a> {
    client: &'a ApiClient,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    buffer: std::vec::IntoIter<RecentChange>,
    continuation: Option<HashMap<String, String>>,
    exhausted: bool,
}

impl<'a> RecentChangesStream<'a> {
    fn pull(&mut self) -> Result<(), ApiError> {
        let Some(continuation) = self.continuation.take() else {
            self.exhausted = true;
            return Ok(());
        };

        let mut params = vec![
            ("action".to_string(), "query".to_string()),
            ("list".to_string(), "recentchanges".to_string()),
            ("rctype".to_string(), "new|edit".to_string()),
            ("rcprop".to_string(), "title|ids|timestamp".to_string()),
            ("rclimit".to_string(), "max".to_string()),
            ("rcdir".to_string(), "newer".to_string()),
            ("rcstart".to_string(), self.since.to_rfc3339()),
            ("rcend".to_string(), self.until.to_rfc3339()),
        ];
        params.extend(continuation_params(&continuation));
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let body = self.client.get(params)?;
        let items = body
            .pointer("/query/recentchanges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut changes = Vec::with_capacity(items.len());
        for item in items {
            let wire: RecentChangeWire =
                serde_json::from_value(item).map_err(|e| ApiError::Parse(e.to_string()))?;
            let kind = match wire.kind.as_str() {
                "new" => RecentChangeKind::New,
                _ => RecentChangeKind::Edit,
            };
            changes.push(RecentChange {
                page_id: wire.pageid,
                kind,
                timestamp: wire.timestamp,
                last_revision_id: wire.revid,
            });
        }

        self.continuation = next_continuation(&body);
        self.buffer = changes.into_iter();
        Ok(())
    }
}

impl<'a> Iterator for RecentChangesStream<'a> {
    type Item = Result<RecentChange, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(c) = self.buffer.next() {
                return Some(Ok(c));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.pull() {
                self.exhausted = true;
                return Some(Err(e));
            }
            if self.buffer.len() == 0 && self.continuation.is_none() {
                self.exhausted = true;
            }
        }
    }
}

/// Lazy sequence of [`LogEvent`] for a single `le_type`.
pub struct LogEventStream<'a> {
    client: &'a ApiClient,
    le_type: String,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    buffer: std::vec::IntoIter<LogEvent>,
    continuation: Option<HashMap<String, String>>,
    exhausted: bool,
}

impl<'a> LogEventStream<'a> {
    fn pull(&mut self) -> Result<(), ApiError> {
        let Some(continuation) = self.continuation.take() else {
            self.exhausted = true;
            return Ok(());
        };

        let mut params = vec![
            ("action".to_string(), "query".to_string()),
            ("list".to_string(), "logevents".to_string()),
            ("letype".to_string(), self.le_type.clone()),
            ("leprop".to_string(), "ids|title|timestamp|details".to_string()),
            ("lelimit".to_string(), "max".to_string()),
            ("ledir".to_string(), "newer".to_string()),
            ("lestart".to_string(), self.since.to_rfc3339()),
            ("leend".to_string(), self.until.to_rfc3339()),
        ];
        params.extend(continuation_params(&continuation));
        let params: Vec<(&str, String)> = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();

        let body = self.client.get(params)?;
        let items = body
            .pointer("/query/logevents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            let wire: LogEventWire =
                serde_json::from_value(item).map_err(|e| ApiError::Parse(e.to_string()))?;
            let event = match wire.kind.as_str() {
                "move" => {
                    let new_title = wire
                        .params
                        .as_ref()
                        .and_then(|p| p.get("target_title"))
                        .and_then(Value::as_str)
                        .unwrap_or(&wire.title)
                        .to_string();
                    let new_namespace = wire
                        .params
                        .as_ref()
                        .and_then(|p| p.get("target_ns"))
                        .and_then(Value::as_i64)
                        .map(|ns| ns as i32);
                    LogEvent::Move {
                        page_id: wire.pageid,
                        old_title: wire.title,
                        new_title,
                        new_namespace,
                        timestamp: wire.timestamp,
                    }
                }
                _ => LogEvent::Delete {
                    page_id: wire.pageid,
                    title: wire.title,
                    timestamp: wire.timestamp,
                },
            };
            events.push(event);
        }

        self.continuation = next_continuation(&body);
        self.buffer = events.into_iter();
        Ok(())
    }
}

impl<'a> Iterator for LogEventStream<'a> {
    type Item = Result<LogEvent, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.buffer.next() {
                return Some(Ok(e));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.pull() {
                self.exhausted = true;
                return Some(Err(e));
            }
            if self.buffer.len() == 0 && self.continuation.is_none() {
                self.exhausted = true;
            }
        }
    }
}
