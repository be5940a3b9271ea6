use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ScraperConfig;
use crate::error::CrawlError;
use crate::extract::Extractor;
use crate::fetch::Fetch;
use crate::identity::resolve;
use crate::record::UpsertOutcome;
use crate::storage::CatalogStore;
use crate::walker::{ListingWalker, StopReason};

/// Where a run currently is. Transitions are logged at debug level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Walking(usize),
    FetchingDetail(String),
    Extracting,
    Resolving,
    Upserting,
    Aggregating,
    Done,
}

/// Counters for one run, logged at the end and returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub pages: usize,
    pub attempted: usize,
    pub added: usize,
    pub updated: usize,
    /// Pages without a resolvable external id.
    pub rejected: usize,
    /// Pages without a title (not content pages).
    pub skipped: usize,
    pub fetch_failures: usize,
    pub store_failures: usize,
    pub seasons_recomputed: u64,
    pub cancelled: bool,
    pub stop_reason: Option<StopReason>,
}

/// What one detail page amounted to, as far as early stopping cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detail {
    Added,
    Known,
    /// Not a catalogable release (no title or no external id).
    Ignored,
    Failed,
}

/// Sequential crawl: listing page, then each detail page in order, then one
/// aggregate pass over the whole catalog.
pub struct Crawler {
    config: ScraperConfig,
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn CatalogStore>,
    extractor: Extractor,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(config: ScraperConfig, fetcher: Arc<dyn Fetch>, store: Arc<dyn CatalogStore>) -> Result<Self> {
        let extractor = Extractor::new(&config.base_url)?;
        Ok(Self { config, fetcher, store, extractor, cancel: CancellationToken::new() })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the run between detail pages.
    pub fn cancel_token(&self) -> CancellationToken { self.cancel.clone() }

    pub async fn run(&self) -> Result<CrawlStats, CrawlError> {
        let mut phase = CrawlPhase::Idle;
        self.store.ping().await.map_err(CrawlError::Store)?;
        let mut walker = ListingWalker::new(&self.config)
            .map_err(|e| CrawlError::Config(format!("{e:#}")))?
            .with_cancellation(self.cancel.clone());
        let mut stats = CrawlStats::default();
        info!(
            listing = %self.config.listing_url(),
            max_pages = self.config.max_pages,
            delay_ms = self.config.request_delay_ms,
            "crawl starting"
        );

        'walk: loop {
            if self.cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            let Some(page) = walker.next_page(self.fetcher.as_ref()).await else {
                stats.cancelled = self.cancel.is_cancelled();
                break;
            };
            enter(&mut phase, CrawlPhase::Walking(page.number));

            let (mut new_on_page, mut failed_on_page) = (0, 0);
            let total = page.detail_urls.len();
            for (i, url) in page.detail_urls.iter().enumerate() {
                if i > 0 && !self.pause(self.config.detail_delay()).await {
                    stats.cancelled = true;
                }
                if stats.cancelled || self.cancel.is_cancelled() {
                    stats.cancelled = true;
                    info!(page = page.number, done = i, total, "crawl cancelled");
                    stats.pages = walker.pages();
                    break 'walk;
                }
                debug!(page = page.number, item = i + 1, total, url = %url, "processing detail page");
                match self.process_detail(url, &mut phase, &mut stats).await {
                    Detail::Added => new_on_page += 1,
                    Detail::Failed => failed_on_page += 1,
                    Detail::Known | Detail::Ignored => {}
                }
            }

            info!(page = page.number, entries = total, new = new_on_page, failed = failed_on_page, "listing page done");
            walker.page_done(new_on_page, failed_on_page);
            stats.pages = walker.pages();
        }
        stats.stop_reason = walker.stop_reason();
        if stats.stop_reason == Some(StopReason::FetchFailed) {
            stats.fetch_failures += 1;
        }

        enter(&mut phase, CrawlPhase::Aggregating);
        match self.store.recompute_total_seasons().await {
            Ok(n) => {
                stats.seasons_recomputed = n;
                info!(records = n, "series season counts recomputed");
            }
            Err(e) => {
                stats.store_failures += 1;
                error!(error = ?e, "recomputing season counts failed");
            }
        }
        enter(&mut phase, CrawlPhase::Done);

        info!(
            pages = stats.pages,
            attempted = stats.attempted,
            added = stats.added,
            updated = stats.updated,
            rejected = stats.rejected,
            skipped = stats.skipped,
            fetch_failures = stats.fetch_failures,
            store_failures = stats.store_failures,
            cancelled = stats.cancelled,
            "crawl finished"
        );
        Ok(stats)
    }

    /// Fetch, extract, resolve and store one detail page.
    async fn process_detail(&self, url: &str, phase: &mut CrawlPhase, stats: &mut CrawlStats) -> Detail {
        stats.attempted += 1;
        enter(phase, CrawlPhase::FetchingDetail(url.to_string()));
        let page = match self.fetcher.fetch(url).await {
            Ok(p) => p,
            Err(e) => {
                stats.fetch_failures += 1;
                warn!(url = %url, reason = %e.reason, "skipping detail page");
                return Detail::Failed;
            }
        };

        enter(phase, CrawlPhase::Extracting);
        let Some(partial) = self.extractor.extract(&page.body, &page.url) else {
            stats.skipped += 1;
            debug!(url = %url, "no title; not a content page");
            return Detail::Ignored;
        };

        enter(phase, CrawlPhase::Resolving);
        let record = match resolve(partial, Utc::now()) {
            Ok(r) => r,
            Err(rejected) => {
                stats.rejected += 1;
                info!(url = %url, reason = %rejected.reason, "record rejected");
                return Detail::Ignored;
            }
        };

        enter(phase, CrawlPhase::Upserting);
        match self.store.upsert(&record).await {
            Ok(UpsertOutcome::Inserted) => {
                stats.added += 1;
                info!(unique_id = %record.unique_id, title = %record.title, "added");
                Detail::Added
            }
            Ok(UpsertOutcome::Updated) => {
                stats.updated += 1;
                debug!(unique_id = %record.unique_id, "updated");
                Detail::Known
            }
            Err(e) => {
                stats.store_failures += 1;
                error!(unique_id = %record.unique_id, error = ?e, "store write failed");
                Detail::Failed
            }
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

fn enter(phase: &mut CrawlPhase, next: CrawlPhase) {
    debug!(from = ?phase, to = ?next, "crawl phase");
    *phase = next;
}
