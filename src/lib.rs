pub mod config;
pub mod crawl;
pub mod dao;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod identity;
pub mod jsonstore;
pub mod record;
pub mod storage;
pub mod types;
pub mod walker;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::ScraperConfig;
    pub use crate::crawl::{CrawlStats, Crawler};
    pub use crate::error::{CrawlError, FailureReason, FetchFailure, Rejected};
    pub use crate::fetch::{Fetch, HttpFetcher, Page};
    pub use crate::record::{ContentRecord, FieldValue, UpsertOutcome};
    pub use crate::storage::CatalogStore;
    pub use crate::Catalog;
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::ScraperConfig;
use crate::crawl::{CrawlStats, Crawler};
use crate::db::Database;
use crate::error::CrawlError;
use crate::fetch::{Fetch, HttpFetcher};
use crate::jsonstore::JsonStore;
use crate::record::ContentRecord;
use crate::storage::CatalogStore;

/// Open the backend named by `database`: `sqlite:` URLs use the relational
/// store, anything else is a JSON file path.
pub async fn open_store(database: &str) -> Result<Arc<dyn CatalogStore>> {
    if database.starts_with("sqlite:") {
        let db = Database::open(database).await?;
        Ok(Arc::new(db))
    } else {
        let store = JsonStore::open(database)
            .await
            .with_context(|| format!("opening json catalog {database}"))?;
        Ok(Arc::new(store))
    }
}

/// Async library entry point. Owns the configuration and the catalog store.
pub struct Catalog {
    config: ScraperConfig,
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub async fn open(config: ScraperConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let store = open_store(&config.database).await.map_err(CrawlError::Store)?;
        Ok(Self { config, store })
    }

    /// Wrap an already opened store.
    pub fn with_store(config: ScraperConfig, store: Arc<dyn CatalogStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ScraperConfig { &self.config }

    pub fn store(&self) -> &Arc<dyn CatalogStore> { &self.store }

    /// Crawler over the live site, sharing this catalog's store.
    pub fn crawler(&self) -> Result<Crawler, CrawlError> {
        let fetcher = HttpFetcher::new(&self.config).map_err(|e| CrawlError::Config(format!("{e:#}")))?;
        self.crawler_with(Arc::new(fetcher))
    }

    pub fn crawler_with(&self, fetcher: Arc<dyn Fetch>) -> Result<Crawler, CrawlError> {
        Crawler::new(self.config.clone(), fetcher, self.store.clone())
            .map_err(|e| CrawlError::Config(format!("{e:#}")))
    }

    /// Run one crawl against the live site.
    pub async fn crawl(&self, cancel: CancellationToken) -> Result<CrawlStats, CrawlError> {
        self.crawler()?.with_cancellation(cancel).run().await
    }

    pub async fn get(&self, unique_id: &str) -> Result<Option<ContentRecord>> {
        self.store.get(unique_id).await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ContentRecord>> {
        self.store.search(query, limit).await
    }

    pub async fn seasons(&self, series_name: &str) -> Result<Vec<ContentRecord>> {
        self.store.seasons(series_name).await
    }

    /// Recompute series season counts outside of a crawl.
    pub async fn aggregate(&self) -> Result<u64> {
        self.store.recompute_total_seasons().await
    }
}
