#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use subtitle_catalog::prelude::*;

pub const BASE: &str = "https://subs.test";
pub const LISTING: &str = "https://subs.test/releases/";

/// In-memory site: canned bodies by URL, 404 for everything else.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, String>>,
    hits: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn hits(&self) -> Vec<String> { self.hits.lock().unwrap().clone() }
}

#[async_trait]
impl Fetch for FakeSite {
    async fn fetch(&self, url: &str) -> Result<Page, FetchFailure> {
        self.hits.lock().unwrap().push(url.to_string());
        match self.pages.lock().unwrap().get(url) {
            Some(body) => Ok(Page { url: url.to_string(), body: body.clone() }),
            None => Err(FetchFailure { url: url.to_string(), reason: FailureReason::Status(404) }),
        }
    }
}

pub fn config(database: &str) -> ScraperConfig {
    ScraperConfig {
        base_url: BASE.into(),
        listing_path: "/releases/".into(),
        max_pages: 5,
        request_delay_ms: 0,
        database: database.into(),
        ..ScraperConfig::default()
    }
}

pub fn listing(paths: &[&str], next: Option<&str>) -> String {
    let mut html = String::from("<html><body>");
    for p in paths {
        html.push_str(&format!(
            r#"<article class="loop-entry"><h2 class="entry-title"><a href="{p}">{p}</a></h2></article>"#
        ));
    }
    if let Some(n) = next {
        html.push_str(&format!(r#"<a class="next page-numbers" href="{n}">Next</a>"#));
    }
    html.push_str("</body></html>");
    html
}

pub fn detail(title: &str, imdb_id: Option<&str>) -> String {
    let imdb = imdb_id
        .map(|id| format!(r#"<a id="imdb-button" href="https://www.imdb.com/title/{id}/">IMDb</a>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
        <h1 id="release-title">{title}</h1>
        <div id="synopsis"><p>Synopsis of {title}.</p></div>
        <table id="release-details-table"><tbody>
          <tr><td>Language:</td><td>Malayalam</td></tr>
          <tr><td>പരിഭാഷ:</td><td><a href="/tag/ann/">Ann</a></td></tr>
        </tbody></table>
        {imdb}
        <a id="download-button" href="/wrapper/" data-downloadurl="/files/sub.zip">Download</a>
        </body></html>"#
    )
}

/// Both backends, each in its own scratch directory.
pub async fn stores() -> Vec<(tempfile::TempDir, Arc<dyn CatalogStore>, String)> {
    let mut out = Vec::new();
    let json_dir = tempfile::tempdir().unwrap();
    let json = json_dir.path().join("db.json").display().to_string();
    out.push((json_dir, subtitle_catalog::open_store(&json).await.unwrap(), json));

    let sql_dir = tempfile::tempdir().unwrap();
    let sql = format!("sqlite://{}", sql_dir.path().join("catalog.db").display());
    out.push((sql_dir, subtitle_catalog::open_store(&sql).await.unwrap(), sql));
    out
}

pub async fn crawl(site: &Arc<FakeSite>, store: &Arc<dyn CatalogStore>, database: &str) -> CrawlStats {
    let catalog = Catalog::with_store(config(database), store.clone());
    catalog.crawler_with(site.clone()).unwrap().run().await.unwrap()
}

/// Records with the per-run timestamp blanked, for run-to-run comparison.
pub async fn snapshot(store: &Arc<dyn CatalogStore>) -> Vec<ContentRecord> {
    let mut all = store.all_records().await.unwrap();
    all.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
    for r in &mut all {
        r.scraped_at = Default::default();
    }
    all
}
