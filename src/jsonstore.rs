use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::record::{ContentRecord, UpsertOutcome};
use crate::storage::{season_counts, sort_by_season, CatalogStore};
use crate::types::StoredRecord;

/// Catalog kept as one JSON object keyed by `unique_id`.
///
/// Every mutation rewrites the whole file, so only one process may crawl
/// into a given file at a time.
pub struct JsonStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, ContentRecord>>,
}

impl JsonStore {
    /// Load `path` (missing file means an empty catalog) and keep a
    /// `<path>.backup` copy of whatever was there.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let backup = sibling(&path, "backup");
                tokio::fs::write(&backup, &raw)
                    .await
                    .with_context(|| format!("writing backup {}", backup.display()))?;
                parse_document(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        info!(path = %path.display(), records = records.len(), "opened json catalog");
        Ok(Self { path, records: Mutex::new(records) })
    }

    pub fn path(&self) -> &Path { &self.path }

    async fn persist(&self, records: &BTreeMap<String, ContentRecord>) -> Result<()> {
        let body = serde_json::to_string_pretty(records)?;
        let tmp = sibling(&self.path, "tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn parse_document(raw: &str) -> Result<BTreeMap<String, ContentRecord>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let doc: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    let mut out = BTreeMap::new();
    for (key, value) in doc {
        let stored: StoredRecord = match serde_json::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "dropping unreadable catalog entry");
                continue;
            }
        };
        match stored.into_record(&key) {
            Some(rec) => {
                out.insert(rec.unique_id.clone(), rec);
            }
            None => warn!(key = %key, "dropping catalog entry without external id"),
        }
    }
    Ok(out)
}

#[async_trait]
impl CatalogStore for JsonStore {
    async fn ping(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let meta = tokio::fs::metadata(dir)
            .await
            .with_context(|| format!("catalog directory {} is not reachable", dir.display()))?;
        anyhow::ensure!(meta.is_dir(), "{} is not a directory", dir.display());
        Ok(())
    }

    async fn upsert(&self, record: &ContentRecord) -> Result<UpsertOutcome> {
        let mut records = self.records.lock().await;
        let (next, outcome) = match records.get(&record.unique_id) {
            Some(previous) => (record.clone().merged_over(previous), UpsertOutcome::Updated),
            None => (record.clone(), UpsertOutcome::Inserted),
        };
        // The map only changes once the file does.
        let previous = records.insert(next.unique_id.clone(), next);
        if let Err(e) = self.persist(&records).await {
            match previous {
                Some(old) => records.insert(old.unique_id.clone(), old),
                None => records.remove(&record.unique_id),
            };
            return Err(e);
        }
        Ok(outcome)
    }

    async fn get(&self, unique_id: &str) -> Result<Option<ContentRecord>> {
        Ok(self.records.lock().await.get(unique_id).cloned())
    }

    async fn all_records(&self) -> Result<Vec<ContentRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn all_series_members(&self, series_key: &str) -> Result<Vec<ContentRecord>> {
        let mut members: Vec<ContentRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.series_key().as_deref() == Some(series_key))
            .cloned()
            .collect();
        sort_by_season(&mut members);
        Ok(members)
    }

    async fn recompute_total_seasons(&self) -> Result<u64> {
        let mut records = self.records.lock().await;
        let counts = season_counts(records.values());
        let mut next = records.clone();
        let mut touched = 0;
        for rec in next.values_mut() {
            if let Some(n) = rec.series_key().and_then(|k| counts.get(&k).copied()) {
                rec.total_seasons = Some(n);
                touched += 1;
            }
        }
        self.persist(&next).await?;
        *records = next;
        Ok(touched)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample;
    use crate::record::FieldValue;

    fn season(id: &str, name: &str, n: u32) -> ContentRecord {
        let mut r = sample(id);
        r.is_series = true;
        r.series_name = Some(name.to_string());
        r.season_number = Some(n);
        r
    }

    #[tokio::test]
    async fn missing_file_is_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        store.ping().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!dir.path().join("db.json.backup").exists());
    }

    #[tokio::test]
    async fn upserts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = JsonStore::open(&path).await.unwrap();
        let mut rec = sample("tt1");
        rec.genre = FieldValue::text("Drama");
        assert_eq!(store.upsert(&rec).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&rec).await.unwrap(), UpsertOutcome::Updated);
        assert!(!dir.path().join("db.json.tmp").exists());

        let reopened = JsonStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("tt1").await.unwrap(), Some(rec));
        assert!(dir.path().join("db.json.backup").exists());
    }

    #[tokio::test]
    async fn legacy_document_is_read_and_rewritten_canonically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let legacy = r#"{
            "tt9999999": {
                "title": "Example Movie (2021)",
                "imdbURL": "https://www.imdb.com/title/tt9999999/",
                "srtURL": "https://example.org/?wpdmdl=7",
                "sourceUrl": "https://example.org/example-movie/"
            },
            "junk": { "title": "No identity" }
        }"#;
        std::fs::write(&path, legacy).unwrap();

        let store = JsonStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let rec = store.get("tt9999999").await.unwrap().unwrap();
        assert_eq!(rec.download_url.as_deref(), Some("https://example.org/?wpdmdl=7"));
        assert_eq!(std::fs::read_to_string(dir.path().join("db.json.backup")).unwrap(), legacy);

        store.upsert(&rec).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"download_url\""));
        assert!(!raw.contains("srtURL"));
    }

    #[tokio::test]
    async fn failed_write_leaves_catalog_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let store = JsonStore::open(sub.join("db.json")).await.unwrap();
        let kept = sample("tt1-S1");
        store.upsert(&kept).await.unwrap();
        std::fs::remove_dir_all(&sub).unwrap();

        assert!(store.upsert(&sample("tt9999999")).await.is_err());
        assert_eq!(store.get("tt9999999").await.unwrap(), None);
        let mut changed = kept.clone();
        changed.genre = FieldValue::text("Drama");
        assert!(store.upsert(&changed).await.is_err());
        assert_eq!(store.get("tt1-S1").await.unwrap(), Some(kept));
        assert!(store.recompute_total_seasons().await.is_err());

        std::fs::create_dir(&sub).unwrap();
        assert_eq!(store.upsert(&sample("tt9999999")).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recompute_writes_counts_onto_members() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        store.upsert(&season("tt1-S2", "Drama Show", 2)).await.unwrap();
        store.upsert(&season("tt1-S1", "drama show", 1)).await.unwrap();
        store.upsert(&sample("tt5")).await.unwrap();

        assert_eq!(store.recompute_total_seasons().await.unwrap(), 2);
        let seasons = store.seasons("Drama  Show").await.unwrap();
        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[0].season_number, Some(1));
        assert!(seasons.iter().all(|r| r.total_seasons == Some(2)));
        assert_eq!(store.get("tt5").await.unwrap().unwrap().total_seasons, None);
    }
}
