//! Thin HTTP layer shared by adapters
//!
//! [`HttpFetcher`] turns raw responses into the error taxonomy the pipeline
//! understands: connection-level failures become [`Error::Transient`] (retried
//! by [`crate::retry::with_retry`]), while a non-2xx status or an error page
//! served in place of data becomes [`Error::PermanentMiss`].

use regex::Regex;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// `href` attribute values, without fragment or query
const HREF_PATTERN: &str = r#"(?i)href\s*=\s*["']([^"'#?]+)[^"']*["']"#;

/// Async HTTP client with payload classification
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client from the shared HTTP settings
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::config("http", format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// The underlying client, for adapters with unusual request needs
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch a binary payload
    ///
    /// # Errors
    ///
    /// - [`Error::Transient`] on timeout, connect or mid-body failures
    /// - [`Error::PermanentMiss`] on a non-2xx status or an HTML/404 page
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(url).await?;
        let body = response.bytes().await.map_err(|e| classify(url, e))?;

        if let Some(reason) = error_page_reason(&body) {
            return Err(Error::miss(url, reason));
        }
        Ok(body.to_vec())
    }

    /// Fetch a text document (directory index, ASCII table)
    ///
    /// A body mentioning `404 not found` in any case is a permanent miss.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(url).await?;
        let text = response.text().await.map_err(|e| classify(url, e))?;

        if text.to_ascii_lowercase().contains("404 not found") {
            return Err(Error::miss(url, "404 page served with success status"));
        }
        Ok(text)
    }

    /// Fetch a directory index and return the links whose file name matches `pattern`
    pub async fn list(&self, index_url: &str, pattern: &Regex) -> Result<Vec<Url>> {
        let base = Url::parse(index_url).map_err(|e| {
            Error::config("index_url", format!("invalid index URL {index_url}: {e}"))
        })?;
        let html = self.get_text(index_url).await?;
        extract_links(&base, &html, pattern)
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::miss(url, format!("HTTP {}", status.as_u16())));
        }
        Ok(response)
    }
}

/// Map a client error onto the retryable / non-retryable split
fn classify(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transient(format!("timeout fetching {url}"))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        Error::Transient(format!("connection failed for {url}: {e}"))
    } else {
        Error::Network(e)
    }
}

/// Why `payload` looks like an error page rather than data, if it does
pub fn error_page_reason(payload: &[u8]) -> Option<&'static str> {
    let head = payload.trim_ascii_start();
    let prefix = &head[..head.len().min(16)];
    let lowered = prefix.to_ascii_lowercase();
    if lowered.starts_with(b"<html") || lowered.starts_with(b"<!doctype html") {
        return Some("HTML page instead of data");
    }
    if contains(payload, b"404 Not Found") {
        return Some("404 page served with success status");
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Collect absolute links from an HTML index whose last path segment matches `pattern`
///
/// Links are resolved against `base` (which should end in `/` for a
/// directory), deduplicated, and returned in document order.
pub fn extract_links(base: &Url, html: &str, pattern: &Regex) -> Result<Vec<Url>> {
    let href = Regex::new(HREF_PATTERN)?;

    let mut links: Vec<Url> = Vec::new();
    for capture in href.captures_iter(html) {
        let raw = &capture[1];
        let name = raw.trim_end_matches('/').rsplit('/').next().unwrap_or(raw);
        if !pattern.is_match(name) {
            continue;
        }
        match base.join(raw) {
            Ok(url) if !links.contains(&url) => links.push(url),
            Ok(_) => {}
            Err(e) => tracing::debug!(href = raw, error = %e, "Skipping unresolvable link"),
        }
    }
    Ok(links)
}
