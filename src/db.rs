use anyhow::{Context, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::{any::AnyConnectOptions, migrate::Migrator, AnyPool, ConnectOptions};
use std::str::FromStr;
use std::sync::Once;
use tracing::warn;

use crate::dao;
use crate::record::{ContentRecord, UpsertOutcome};
use crate::storage::CatalogStore;

// Ensure drivers are installed exactly once for sqlx::any
static INSTALL_DRIVERS: Once = Once::new();

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Relational catalog behind an `sqlx` Any pool (SQLite in practice).
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Connect and bring the schema up to date.
    pub async fn open(database_url: &str) -> Result<Self> {
        let db = Self::connect(database_url).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let url = with_create_mode(database_url);
        let opts = AnyConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database URL: {url}"))?;
        // Quiet by default; callers can enable SQLX_LOG if they want
        let opts = opts.disable_statement_logging();

        // An in-memory SQLite database exists per connection.
        let max = if url.contains(":memory:") { 1 } else { 5 };
        let pool = AnyPoolOptions::new()
            .max_connections(max)
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        match MIGRATOR.run(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                let looks_modified = msg.contains("was previously applied but has been modified");
                let duplicate_version = msg.contains("UNIQUE constraint failed: _sqlx_migrations.version");
                if looks_modified || duplicate_version {
                    warn!(error = %msg, "migration ledger out of sync; resetting it");
                    sqlx::query("DELETE FROM _sqlx_migrations")
                        .execute(&self.pool)
                        .await
                        .context("resetting migration ledger")?;
                    MIGRATOR.run(&self.pool).await.context("running migrations after ledger reset")
                } else {
                    Err(e).context("running migrations")
                }
            }
        }
    }

    pub fn pool(&self) -> &AnyPool { &self.pool }
}

/// SQLite refuses to create a missing file unless asked to.
fn with_create_mode(url: &str) -> String {
    if url.starts_with("sqlite:") && !url.contains(":memory:") && !url.contains("mode=") {
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{url}{sep}mode=rwc")
    } else {
        url.to_string()
    }
}

#[async_trait::async_trait]
impl CatalogStore for Database {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("database ping")?;
        Ok(())
    }

    async fn upsert(&self, record: &ContentRecord) -> Result<UpsertOutcome> {
        dao::upsert_record(&self.pool, record)
            .await
            .with_context(|| format!("upserting {}", record.unique_id))
    }

    async fn get(&self, unique_id: &str) -> Result<Option<ContentRecord>> {
        dao::get_record(&self.pool, unique_id).await
    }

    async fn all_records(&self) -> Result<Vec<ContentRecord>> {
        dao::list_records(&self.pool).await
    }

    async fn all_series_members(&self, series_key: &str) -> Result<Vec<ContentRecord>> {
        dao::list_series_members(&self.pool, series_key).await
    }

    async fn recompute_total_seasons(&self) -> Result<u64> {
        dao::recompute_total_seasons(&self.pool).await
    }

    async fn count(&self) -> Result<usize> {
        Ok(dao::count_records(&self.pool).await? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample;
    use crate::record::{Field, FieldValue, NO_SYNOPSIS};

    async fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let db = Database::open(&url).await.unwrap();
        (dir, db)
    }

    fn season(id: &str, name: &str, n: u32) -> ContentRecord {
        let mut r = sample(id);
        r.is_series = true;
        r.series_name = Some(name.to_string());
        r.season_number = Some(n);
        r
    }

    #[test]
    fn create_mode_is_added_once() {
        assert_eq!(with_create_mode("sqlite://a.db"), "sqlite://a.db?mode=rwc");
        assert_eq!(with_create_mode("sqlite://a.db?mode=ro"), "sqlite://a.db?mode=ro");
        assert_eq!(with_create_mode("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn tampered_migration_ledger_is_reset() {
        let (_dir, db) = temp_db().await;
        db.upsert(&sample("tt1")).await.unwrap();
        sqlx::query("UPDATE _sqlx_migrations SET checksum = X'00'")
            .execute(db.pool())
            .await
            .unwrap();

        db.run_migrations().await.unwrap();
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_reports_insert_then_update() {
        let (_dir, db) = temp_db().await;
        db.ping().await.unwrap();
        let mut rec = sample("tt1");
        rec.director = FieldValue::linked("Jane Doe", Some("https://example.org/d/jane/".into()));
        rec.poster_url = Some("https://example.org/p.jpg".into());
        rec.synopsis = "A story.".into();

        assert_eq!(db.upsert(&rec).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(db.upsert(&rec).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(db.count().await.unwrap(), 1);
        assert_eq!(db.get("tt1").await.unwrap(), Some(rec));
        assert_eq!(db.get("tt404").await.unwrap(), None);
    }

    #[tokio::test]
    async fn placeholders_do_not_clobber_stored_values() {
        let (_dir, db) = temp_db().await;
        let mut first = sample("tt1");
        first.genre = FieldValue::text("Drama");
        first.synopsis = "A story.".into();
        first.download_url = Some("https://example.org/?wpdmdl=1".into());
        db.upsert(&first).await.unwrap();

        let mut second = sample("tt1");
        second.title = "Example Movie (2021) [Updated]".into();
        db.upsert(&second).await.unwrap();

        let got = db.get("tt1").await.unwrap().unwrap();
        assert_eq!(got.title, "Example Movie (2021) [Updated]");
        assert_eq!(got.genre, FieldValue::text("Drama"));
        assert_eq!(got.synopsis, "A story.");
        assert_eq!(got.download_url.as_deref(), Some("https://example.org/?wpdmdl=1"));
        assert_eq!(got.director, Field::Director.default_value());
        assert_ne!(got.synopsis, NO_SYNOPSIS);
    }

    #[tokio::test]
    async fn recompute_counts_distinct_seasons_per_series() {
        let (_dir, db) = temp_db().await;
        db.upsert(&season("tt1-S1", "Drama Show", 1)).await.unwrap();
        db.upsert(&season("tt1-S2", "drama  show", 2)).await.unwrap();
        db.upsert(&season("tt9-S2", "Drama Show", 2)).await.unwrap();
        db.upsert(&sample("tt5")).await.unwrap();

        assert_eq!(db.recompute_total_seasons().await.unwrap(), 3);
        for id in ["tt1-S1", "tt1-S2", "tt9-S2"] {
            assert_eq!(db.get(id).await.unwrap().unwrap().total_seasons, Some(2));
        }
        assert_eq!(db.get("tt5").await.unwrap().unwrap().total_seasons, None);

        // Re-scraping a season keeps the aggregate until the next pass.
        db.upsert(&season("tt1-S1", "Drama Show", 1)).await.unwrap();
        assert_eq!(db.get("tt1-S1").await.unwrap().unwrap().total_seasons, Some(2));

        let seasons = db.seasons("DRAMA SHOW").await.unwrap();
        let ids: Vec<_> = seasons.iter().map(|r| r.unique_id.as_str()).collect();
        assert_eq!(ids, ["tt1-S1", "tt1-S2", "tt9-S2"]);
    }

    #[tokio::test]
    async fn null_integer_columns_read_back_as_none() {
        let (_dir, db) = temp_db().await;
        let mut rec = sample("tt9999999");
        rec.year = None;
        db.upsert(&rec).await.unwrap();

        let got = db.get("tt9999999").await.unwrap().unwrap();
        assert_eq!((got.year, got.season_number, got.total_seasons), (None, None, None));
        assert_eq!(db.all_records().await.unwrap(), vec![rec]);
    }

    #[tokio::test]
    async fn search_matches_title_and_series() {
        let (_dir, db) = temp_db().await;
        db.upsert(&season("tt1-S2", "Drama Show", 2)).await.unwrap();
        db.upsert(&sample("tt5")).await.unwrap();

        let hits = db.search("drama.show", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unique_id, "tt1-S2");
        assert_eq!(db.search("example", 10).await.unwrap().len(), 2);
        assert_eq!(db.search("example", 1).await.unwrap().len(), 1);
        assert!(db.search("   ", 10).await.unwrap().is_empty());
    }
}
