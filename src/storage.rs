use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;

use crate::record::{normalize_series_name, ContentRecord, UpsertOutcome};

/// Persistence seam for the catalog. Implemented over a relational table
/// ([`crate::db::Database`]) and a JSON document ([`crate::jsonstore::JsonStore`]).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Cheap reachability check run before a crawl starts.
    async fn ping(&self) -> Result<()>;

    /// Insert, or overwrite the scraped fields of the record with the same
    /// `unique_id`. Repeating the same call leaves the catalog unchanged.
    async fn upsert(&self, record: &ContentRecord) -> Result<UpsertOutcome>;

    async fn get(&self, unique_id: &str) -> Result<Option<ContentRecord>>;

    async fn all_records(&self) -> Result<Vec<ContentRecord>>;

    /// Members of a series, by normalized name, ordered by season.
    async fn all_series_members(&self, series_key: &str) -> Result<Vec<ContentRecord>>;

    /// Write the distinct-season count of every series onto its members.
    /// Returns the number of records touched.
    async fn recompute_total_seasons(&self) -> Result<u64>;

    async fn count(&self) -> Result<usize> {
        Ok(self.all_records().await?.len())
    }

    /// Case-insensitive substring match over titles and series names.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ContentRecord>> {
        let needle = clean_query(query);
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<ContentRecord> = self
            .all_records()
            .await?
            .into_iter()
            .filter(|r| {
                clean_query(&r.title).contains(&needle)
                    || r.series_name.as_deref().is_some_and(|s| clean_query(s).contains(&needle))
            })
            .collect();
        hits.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.unique_id.cmp(&b.unique_id)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// All seasons catalogued for a series name, in any casing or spacing.
    async fn seasons(&self, series_name: &str) -> Result<Vec<ContentRecord>> {
        self.all_series_members(&normalize_series_name(series_name)).await
    }
}

/// Lowercase, dots to spaces, whitespace collapsed.
pub fn clean_query(s: &str) -> String {
    normalize_series_name(&s.replace('.', " "))
}

/// Distinct season counts per normalized series name.
pub fn season_counts<'a, I>(records: I) -> BTreeMap<String, u32>
where
    I: IntoIterator<Item = &'a ContentRecord>,
{
    let mut seasons: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    for r in records {
        if let Some(key) = r.series_key() {
            let set = seasons.entry(key).or_default();
            if let Some(n) = r.season_number {
                set.insert(n);
            }
        }
    }
    seasons.into_iter().map(|(k, v)| (k, v.len() as u32)).collect()
}

pub fn sort_by_season(records: &mut [ContentRecord]) {
    records.sort_by(|a, b| {
        a.season_number
            .unwrap_or(0)
            .cmp(&b.season_number.unwrap_or(0))
            .then_with(|| a.unique_id.cmp(&b.unique_id))
    });
}
