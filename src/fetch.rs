//! Page retrieval. The crawler only needs `fetch(url) -> bytes`; this module
//! provides that over HTTP and over the local filesystem, and lets any
//! closure of the right shape stand in (tests use in-memory page maps).

use std::io::Read;
use std::time::Duration;

use crate::error::{CovcrawlError, Result};

/// Default per-request timeout for `HttpFetcher`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a single page body.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Retrieves the raw bytes behind a URL.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> Result<Vec<u8>>,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self(url)
    }
}

fn fetch_error(url: &str, reason: impl ToString) -> CovcrawlError {
    CovcrawlError::Fetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Blocking HTTP(S) fetcher with a per-request timeout.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("covcrawl/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = match self.agent.get(url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => {
                return Err(fetch_error(url, format!("HTTP {}", code)))
            }
            Err(e) => return Err(fetch_error(url, e)),
        };
        let mut body = Vec::new();
        resp.into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| fetch_error(url, e))?;
        Ok(body)
    }
}

/// Reads pages from disk. Accepts plain paths and `file://` URLs.
pub struct FileFetcher;

impl Fetch for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path).map_err(|e| fetch_error(url, e))
    }
}

/// Whether `location` must be fetched over the network.
#[must_use]
pub fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// HTTP for `http(s)://` locations, the filesystem for everything else.
pub fn fetcher_for(location: &str, timeout: Duration) -> Box<dyn Fetch> {
    if is_remote(location) {
        Box::new(HttpFetcher::new(timeout))
    } else {
        Box::new(FileFetcher)
    }
}
