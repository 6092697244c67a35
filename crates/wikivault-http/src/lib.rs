//! The HTTP Client (spec §4.2): a `reqwest::blocking` session with connection
//! reuse, a configurable total timeout per request, and a fixed user-agent
//! identifying the archiver and a contact URL.
//!
//! This client never retries — that is the Retry Engine's job
//! (`wikivault-retry`), which wraps calls made through this session.

use std::time::Duration;

/// Default per-request timeout, per spec §4.2.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A reusable HTTP session for talking to a MediaWiki installation.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::blocking::Client,
    user_agent: String,
}

impl HttpSession {
    /// Build a session with the given timeout and user-agent. The
    /// user-agent should identify the archiver and a contact URL/email, per
    /// MediaWiki API etiquette (spec §6.1).
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Result<Self, reqwest::Error> {
        let user_agent = user_agent.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(&user_agent)
            .build()?;
        Ok(Self { client, user_agent })
    }

    /// Build a session using the default 30s timeout.
    pub fn with_default_timeout(user_agent: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::new(DEFAULT_TIMEOUT, user_agent)
    }

    pub fn client(&self) -> &reqwest::blocking::Client {
        &self.client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_custom_timeout_and_user_agent() {
        let session =
            HttpSession::new(Duration::from_secs(5), "wikivault/0.1 (https://example.org)")
                .expect("session builds");
        assert_eq!(session.user_agent(), "wikivault/0.1 (https://example.org)");
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(30));
    }

    #[test]
    fn session_reuses_underlying_client_handle() {
        let session = HttpSession::with_default_timeout("wikivault-test/0.1").unwrap();
        let a: *const _ = session.client();
        let b: *const _ = session.client();
        assert_eq!(a, b);
    }

    #[test]
    fn user_agent_is_sent_on_the_wire() {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("server");
        let addr = format!("http://{}", server.server_addr());
        let handle = std::thread::spawn(move || {
            let req = server.recv().expect("request");
            let ua = req
                .headers()
                .iter()
                .find(|h| h.field.equiv("User-Agent"))
                .map(|h| h.value.as_str().to_string());
            assert_eq!(ua.as_deref(), Some("wikivault-test/0.1 (https://example.org)"));
            req.respond(tiny_http::Response::empty(tiny_http::StatusCode(200)))
                .expect("respond");
        });

        let session =
            HttpSession::new(Duration::from_secs(5), "wikivault-test/0.1 (https://example.org)")
                .unwrap();
        session.client().get(&addr).send().expect("request sent");
        handle.join().expect("join");
    }
}
