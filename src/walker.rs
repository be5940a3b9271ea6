use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ScraperConfig;
use crate::extract::cascade::absolutize;
use crate::extract::selectors;
use crate::fetch::Fetch;

const ENTRY_SELECTORS: &[&str] = &["article.loop-entry", ".post-item", ".movie-item", "article"];
const LINK_SELECTORS: &[&str] =
    &["h2.entry-title a", ".entry-title a", ".post-title a", ".movie-title a", "a[href]"];
const NEXT_SELECTORS: &[&str] =
    &["a.next.page-numbers", ".next-page a", ".pagination .next", r#"a[rel="next"]"#];

/// Detail links and the pagination link found on one listing page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    pub detail_urls: Vec<String>,
    pub next_url: Option<String>,
}

pub struct ListingParser {
    entries: Vec<Selector>,
    links: Vec<Selector>,
    next: Vec<Selector>,
}

impl ListingParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            entries: selectors(ENTRY_SELECTORS)?,
            links: selectors(LINK_SELECTORS)?,
            next: selectors(NEXT_SELECTORS)?,
        })
    }

    pub fn parse(&self, html: &str, page_url: &Url) -> Listing {
        let doc = Html::parse_document(html);

        let entries = self
            .entries
            .iter()
            .map(|sel| doc.select(sel).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let mut detail_urls: Vec<String> = Vec::new();
        for entry in entries {
            let href = self
                .links
                .iter()
                .find_map(|sel| entry.select(sel).find_map(|a| a.value().attr("href")));
            if let Some(url) = href.and_then(|h| absolutize(page_url, h)) {
                if !detail_urls.contains(&url) {
                    detail_urls.push(url);
                }
            }
        }

        let next_url = self
            .next
            .iter()
            .find_map(|sel| doc.select(sel).find_map(|a| a.value().attr("href")))
            .and_then(|h| absolutize(page_url, h));

        Listing { detail_urls, next_url }
    }
}

/// Why the walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NoEntries,
    NoNextPage,
    PageLimit,
    NothingNew,
    FetchFailed,
}

/// One listing page handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub number: usize,
    pub url: String,
    pub detail_urls: Vec<String>,
}

/// Follows "next page" links from the listing root, newest first.
///
/// After processing each page the caller reports how many previously unseen
/// records it produced, and how many entries failed, via
/// [`ListingWalker::page_done`]. A page past the first `early_stop_after`
/// whose entries were all already catalogued ends the walk.
pub struct ListingWalker {
    parser: ListingParser,
    next_url: Option<String>,
    pages: usize,
    max_pages: usize,
    early_stop_after: usize,
    listing_delay: Duration,
    cancel: CancellationToken,
    stopped: Option<StopReason>,
}

impl ListingWalker {
    pub fn new(cfg: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            parser: ListingParser::new()?,
            next_url: Some(cfg.listing_url()),
            pages: 0,
            max_pages: cfg.max_pages,
            early_stop_after: cfg.early_stop_after,
            listing_delay: cfg.listing_delay(),
            cancel: CancellationToken::new(),
            stopped: None,
        })
    }

    /// Token that cuts the delay between listing pages short.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn pages(&self) -> usize { self.pages }

    pub fn stop_reason(&self) -> Option<StopReason> { self.stopped }

    fn stop(&mut self, reason: StopReason) {
        if self.stopped.is_none() {
            info!(pages = self.pages, reason = ?reason, "listing walk finished");
            self.stopped = Some(reason);
        }
    }

    /// Fetch the next listing page, or `None` once the walk is over.
    pub async fn next_page(&mut self, fetcher: &dyn Fetch) -> Option<ListingPage> {
        if self.stopped.is_some() {
            return None;
        }
        if self.pages >= self.max_pages {
            self.stop(StopReason::PageLimit);
            return None;
        }
        let Some(url) = self.next_url.take() else {
            self.stop(StopReason::NoNextPage);
            return None;
        };
        let cancelled = if self.pages > 0 && !self.listing_delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => true,
                _ = tokio::time::sleep(self.listing_delay) => false,
            }
        } else {
            self.cancel.is_cancelled()
        };
        if cancelled {
            self.next_url = Some(url);
            return None;
        }

        let number = self.pages + 1;
        info!(page = number, max_pages = self.max_pages, url = %url, "walking listing page");
        let page = match fetcher.fetch(&url).await {
            Ok(p) => p,
            Err(e) => {
                warn!(page = number, url = %url, error = %e, "listing page unavailable");
                self.stop(StopReason::FetchFailed);
                return None;
            }
        };
        let Ok(page_url) = Url::parse(&page.url) else {
            self.stop(StopReason::FetchFailed);
            return None;
        };
        let listing = self.parser.parse(&page.body, &page_url);
        self.pages = number;
        debug!(page = number, entries = listing.detail_urls.len(), next = ?listing.next_url, "parsed listing");

        if listing.detail_urls.is_empty() {
            warn!(page = number, "listing page has no entries");
            self.stop(StopReason::NoEntries);
            return None;
        }
        self.next_url = listing.next_url;
        Some(ListingPage { number, url, detail_urls: listing.detail_urls })
    }

    /// Report how the last page went. Failed entries might have been new, so
    /// a page with failures never counts as "nothing new".
    pub fn page_done(&mut self, new_records: usize, failures: usize) {
        if new_records == 0 && failures == 0 && self.pages > self.early_stop_after {
            info!(page = self.pages, "page added nothing new; assuming older pages are known");
            self.stop(StopReason::NothingNew);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{FailureReason, FetchFailure};
    use crate::fetch::Page;

    /// Serves canned bodies; everything else is a 404.
    #[derive(Default)]
    pub(crate) struct FixtureFetcher {
        pages: HashMap<String, String>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl FixtureFetcher {
        pub(crate) fn with(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }
    }

    #[async_trait]
    impl Fetch for FixtureFetcher {
        async fn fetch(&self, url: &str) -> Result<Page, FetchFailure> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(Page { url: url.to_string(), body: body.clone() }),
                None => Err(FetchFailure { url: url.to_string(), reason: FailureReason::Status(404) }),
            }
        }
    }

    pub(crate) fn listing_html(links: &[&str], next: Option<&str>) -> String {
        let entries: String = links
            .iter()
            .map(|l| format!(r#"<article class="loop-entry"><h2 class="entry-title"><a href="{l}">x</a></h2></article>"#))
            .collect();
        let next = next
            .map(|n| format!(r#"<a class="next page-numbers" href="{n}">Next</a>"#))
            .unwrap_or_default();
        format!("<html><body>{entries}<nav>{next}</nav></body></html>")
    }

    fn config(max_pages: usize, early_stop_after: usize) -> ScraperConfig {
        ScraperConfig {
            base_url: "https://subs.test".into(),
            listing_path: "/releases/".into(),
            max_pages,
            early_stop_after,
            request_delay_ms: 0,
            ..ScraperConfig::default()
        }
    }

    #[test]
    fn parses_entries_and_next_link() {
        let parser = ListingParser::new().unwrap();
        let base = Url::parse("https://subs.test/releases/").unwrap();
        let html = listing_html(&["/a/", "https://subs.test/b/", "/a/"], Some("/releases/page/2/"));
        let listing = parser.parse(&html, &base);
        assert_eq!(listing.detail_urls, ["https://subs.test/a/", "https://subs.test/b/"]);
        assert_eq!(listing.next_url.as_deref(), Some("https://subs.test/releases/page/2/"));
    }

    #[test]
    fn falls_back_to_generic_entries() {
        let parser = ListingParser::new().unwrap();
        let base = Url::parse("https://subs.test/releases/").unwrap();
        let html = r##"<div class="post-item"><a href="#">skip</a></div>
            <div class="post-item"><span class="post-title"><a href="/c/">C</a></span></div>
            <a rel="next" href="/releases/page/2/">older</a>"##;
        let listing = parser.parse(html, &base);
        assert_eq!(listing.detail_urls, ["https://subs.test/c/"]);
        assert!(listing.next_url.is_some());
    }

    #[tokio::test]
    async fn walks_until_next_link_is_missing() {
        let fetcher = FixtureFetcher::default()
            .with("https://subs.test/releases/", listing_html(&["/a/"], Some("/releases/page/2/")))
            .with("https://subs.test/releases/page/2/", listing_html(&["/b/"], None));
        let mut walker = ListingWalker::new(&config(10, 3)).unwrap();

        let first = walker.next_page(&fetcher).await.unwrap();
        assert_eq!(first.number, 1);
        walker.page_done(1, 0);
        let second = walker.next_page(&fetcher).await.unwrap();
        assert_eq!(second.detail_urls, ["https://subs.test/b/"]);
        walker.page_done(1, 0);
        assert!(walker.next_page(&fetcher).await.is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::NoNextPage));
        assert_eq!(walker.pages(), 2);
    }

    #[tokio::test]
    async fn stops_at_page_limit() {
        let fetcher = FixtureFetcher::default()
            .with("https://subs.test/releases/", listing_html(&["/a/"], Some("/releases/page/2/")));
        let mut walker = ListingWalker::new(&config(1, 3)).unwrap();
        assert!(walker.next_page(&fetcher).await.is_some());
        walker.page_done(1, 0);
        assert!(walker.next_page(&fetcher).await.is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::PageLimit));
        assert_eq!(fetcher.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_listing_stops_the_walk() {
        let fetcher = FixtureFetcher::default()
            .with("https://subs.test/releases/", "<html><body><p>nothing</p></body></html>");
        let mut walker = ListingWalker::new(&config(5, 3)).unwrap();
        assert!(walker.next_page(&fetcher).await.is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::NoEntries));
    }

    #[tokio::test]
    async fn nothing_new_only_stops_after_warmup_pages() {
        let mut fetcher = FixtureFetcher::default();
        for n in 1..=4 {
            let url = if n == 1 {
                "https://subs.test/releases/".to_string()
            } else {
                format!("https://subs.test/releases/page/{n}/")
            };
            let next = format!("/releases/page/{}/", n + 1);
            fetcher = fetcher.with(&url, listing_html(&["/a/"], Some(&next)));
        }
        let mut walker = ListingWalker::new(&config(10, 2)).unwrap();
        for _ in 0..3 {
            assert!(walker.next_page(&fetcher).await.is_some());
            walker.page_done(0, 0);
        }
        assert_eq!(walker.stop_reason(), Some(StopReason::NothingNew));
        assert_eq!(walker.pages(), 3);
        assert!(walker.next_page(&fetcher).await.is_none());
    }

    #[tokio::test]
    async fn failures_keep_a_quiet_page_from_stopping_the_walk() {
        let fetcher = FixtureFetcher::default()
            .with("https://subs.test/releases/", listing_html(&["/a/"], Some("/releases/page/2/")))
            .with("https://subs.test/releases/page/2/", listing_html(&["/b/"], None));
        let mut walker = ListingWalker::new(&config(10, 0)).unwrap();
        assert!(walker.next_page(&fetcher).await.is_some());
        walker.page_done(0, 1);
        assert_eq!(walker.stop_reason(), None);
        assert!(walker.next_page(&fetcher).await.is_some());
    }

    #[tokio::test]
    async fn cancellation_cuts_the_listing_delay_short() {
        let fetcher = FixtureFetcher::default()
            .with("https://subs.test/releases/", listing_html(&["/a/"], Some("/releases/page/2/")))
            .with("https://subs.test/releases/page/2/", listing_html(&["/b/"], None));
        let cancel = CancellationToken::new();
        let cfg = ScraperConfig { request_delay_ms: 60_000, ..config(10, 3) };
        let mut walker = ListingWalker::new(&cfg).unwrap().with_cancellation(cancel.clone());
        assert!(walker.next_page(&fetcher).await.is_some());
        walker.page_done(1, 0);

        let trigger = cancel.clone();
        tokio::spawn(async move { trigger.cancel() });
        assert!(walker.next_page(&fetcher).await.is_none());
        assert_eq!(walker.stop_reason(), None);
        assert_eq!(fetcher.requests.lock().unwrap().len(), 1);
    }
}
