use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::{FailureReason, FetchFailure};

/// A fetched HTML page. Parsing happens later, off the await path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub body: String,
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page, FetchFailure>;
}

/// Sequential HTTP fetcher with browser headers and bounded retries.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_attempts: u32,
    backoff_step: Duration,
    slow_warn: Duration,
}

impl HttpFetcher {
    pub fn new(cfg: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(browser_headers())
            .timeout(cfg.request_timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            max_attempts: cfg.max_attempts.max(1),
            backoff_step: cfg.backoff_step(),
            slow_warn: Duration::from_secs(10),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Page, FailureReason> {
        let resp = self.client.get(url).send().await.map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FailureReason::Status(status.as_u16()));
        }
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("html") {
            return Err(FailureReason::NotHtml(content_type));
        }
        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(|e| FailureReason::Body(e.to_string()))?;
        Ok(Page { url: final_url, body })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchFailure> {
        let fail = |reason| FetchFailure { url: url.to_string(), reason };
        match url::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => return Err(fail(FailureReason::InvalidUrl)),
        }

        let mut attempt = 1;
        loop {
            debug!(url, attempt, max = self.max_attempts, "fetching");
            let start = Instant::now();
            let res = self.fetch_once(url).await;
            if start.elapsed() > self.slow_warn {
                warn!(url, elapsed = ?start.elapsed(), "slow response");
            }
            match res {
                Ok(page) => return Ok(page),
                Err(reason) if reason.is_transient() && attempt < self.max_attempts => {
                    let wait = backoff_delay(self.backoff_step, attempt);
                    info!(url, attempt, %reason, wait = ?wait, "transient failure, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(reason) => {
                    warn!(url, attempt, %reason, "giving up");
                    return Err(fail(reason));
                }
            }
        }
    }
}

/// Wait before retry number `attempt + 1`: step, 2×step, 3×step, ...
pub fn backoff_delay(step: Duration, attempt: u32) -> Duration {
    step * attempt
}

fn classify(e: reqwest::Error) -> FailureReason {
    if e.is_timeout() {
        FailureReason::Timeout
    } else if let Some(status) = e.status() {
        FailureReason::Status(status.as_u16())
    } else if e.is_builder() {
        FailureReason::InvalidUrl
    } else {
        FailureReason::Connect(e.to_string())
    }
}

fn browser_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    h.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    h.insert(header::DNT, HeaderValue::from_static("1"));
    h.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let step = Duration::from_secs(2);
        let waits: Vec<_> = (1..=3).map(|a| backoff_delay(step, a)).collect();
        assert_eq!(waits, vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(6)]);
    }

    #[test]
    fn only_transient_reasons_retry() {
        assert!(FailureReason::Timeout.is_transient());
        assert!(FailureReason::Status(503).is_transient());
        assert!(FailureReason::Connect("reset".into()).is_transient());
        assert!(!FailureReason::Status(404).is_transient());
        assert!(!FailureReason::NotHtml("application/zip".into()).is_transient());
        assert!(!FailureReason::InvalidUrl.is_transient());
    }

    #[tokio::test]
    async fn rejects_non_http_urls_without_network() {
        let fetcher = HttpFetcher::new(&ScraperConfig::default()).unwrap();
        let err = fetcher.fetch("ftp://example.org/file").await.unwrap_err();
        assert_eq!(err.reason, FailureReason::InvalidUrl);
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert_eq!(err.reason, FailureReason::InvalidUrl);
    }
}
