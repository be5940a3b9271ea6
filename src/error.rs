use thiserror::Error;

/// Why a page could not be fetched. Only the transient kinds are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("invalid url")]
    InvalidUrl,
    #[error("timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("non-HTML content type: {0}")]
    NotHtml(String),
    #[error("failed to read body: {0}")]
    Body(String),
}

impl FailureReason {
    pub fn is_transient(&self) -> bool {
        match self {
            FailureReason::Timeout | FailureReason::Connect(_) | FailureReason::Body(_) => true,
            FailureReason::Status(code) => *code >= 500,
            FailureReason::InvalidUrl | FailureReason::NotHtml(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed for {url}: {reason}")]
pub struct FetchFailure {
    pub url: String,
    pub reason: FailureReason,
}

/// A page that was extracted but cannot be catalogued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected: {reason}")]
pub struct Rejected {
    pub reason: String,
}

impl Rejected {
    pub fn no_external_id() -> Self { Rejected { reason: "no external id".to_string() } }
}

/// Hard failures that stop a run before it starts.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("catalog store unavailable: {0:#}")]
    Store(anyhow::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}
