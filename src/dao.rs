use anyhow::{Context, Result};
use sqlx::{any::AnyRow, AnyPool, Row};

use crate::record::{ContentRecord, Field, FieldValue, UpsertOutcome, NO_SYNOPSIS};
use crate::types::parse_timestamp;

// The Any driver cannot decode a NULL into Option<_>, so nullable integers
// come back as -1 and nullable text as ''.
const SELECT_COLUMNS: &str = "SELECT unique_id, external_id, title,
        COALESCE(year, -1) AS year, is_series, COALESCE(season_number, -1) AS season_number,
        COALESCE(series_name, '') AS series_name, COALESCE(total_seasons, -1) AS total_seasons,
        COALESCE(director, '') AS director, COALESCE(genre, '') AS genre,
        COALESCE(language, '') AS language, COALESCE(translator, '') AS translator,
        COALESCE(certification, '') AS certification, COALESCE(rating, '') AS rating,
        COALESCE(release_tag, '') AS release_tag, COALESCE(poster_url, '') AS poster_url,
        COALESCE(poster_credit, '') AS poster_credit, COALESCE(synopsis, '') AS synopsis,
        COALESCE(download_url, '') AS download_url, source_url, scraped_at
     FROM catalog";

/// Placeholders are stored as NULL so that COALESCE keeps an earlier real value.
fn field_json(value: &FieldValue) -> Result<Option<String>> {
    if value.is_placeholder() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(value)?))
}

fn field_from_json(raw: &str, field: Field) -> FieldValue {
    if raw.is_empty() {
        return field.default_value();
    }
    serde_json::from_str(raw).unwrap_or_else(|_| FieldValue::text(raw))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn record_from_row(row: &AnyRow) -> Result<ContentRecord> {
    let text = |col: &str| -> Result<String> {
        row.try_get::<String, _>(col).with_context(|| format!("decoding column {col}"))
    };
    let field = |f: Field| -> Result<FieldValue> { Ok(field_from_json(&text(f.column())?, f)) };
    let int = |col: &str| -> Result<Option<i64>> {
        let n = row.try_get::<i64, _>(col).with_context(|| format!("decoding column {col}"))?;
        Ok((n >= 0).then_some(n))
    };

    let scraped_at = text("scraped_at")?;
    Ok(ContentRecord {
        unique_id: text("unique_id")?,
        external_id: text("external_id")?,
        title: text("title")?,
        year: int("year")?.map(|y| y as i32),
        is_series: int("is_series")?.unwrap_or(0) != 0,
        season_number: int("season_number")?.map(|n| n as u32),
        series_name: non_empty(text("series_name")?),
        total_seasons: int("total_seasons")?.map(|n| n as u32),
        director: field(Field::Director)?,
        genre: field(Field::Genre)?,
        language: field(Field::Language)?,
        translator: field(Field::Translator)?,
        certification: field(Field::Certification)?,
        rating: field(Field::Rating)?,
        release_tag: field(Field::ReleaseTag)?,
        poster_url: non_empty(text("poster_url")?),
        poster_credit: field(Field::PosterCredit)?,
        synopsis: non_empty(text("synopsis")?).unwrap_or_else(|| NO_SYNOPSIS.to_string()),
        download_url: non_empty(text("download_url")?),
        source_url: text("source_url")?,
        scraped_at: parse_timestamp(&scraped_at)
            .with_context(|| format!("bad scraped_at timestamp: {scraped_at}"))?,
    })
}

/// Insert or refresh one record. Scraped columns are overwritten, but a NULL
/// (placeholder or missing) never replaces a stored value, and
/// `total_seasons` is left to [`recompute_total_seasons`].
pub async fn upsert_record(pool: &AnyPool, r: &ContentRecord) -> Result<UpsertOutcome> {
    let mut tx = pool.begin().await?;
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog WHERE unique_id = ?")
        .bind(&r.unique_id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO catalog(
            unique_id, external_id, title, year, is_series, season_number, series_name, series_key,
            director, genre, language, translator, certification, rating, release_tag,
            poster_url, poster_credit, synopsis, download_url, source_url, scraped_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(unique_id) DO UPDATE SET
           external_id=excluded.external_id, title=excluded.title,
           year=COALESCE(excluded.year, catalog.year),
           is_series=excluded.is_series, season_number=excluded.season_number,
           series_name=excluded.series_name, series_key=excluded.series_key,
           director=COALESCE(excluded.director, catalog.director),
           genre=COALESCE(excluded.genre, catalog.genre),
           language=COALESCE(excluded.language, catalog.language),
           translator=COALESCE(excluded.translator, catalog.translator),
           certification=COALESCE(excluded.certification, catalog.certification),
           rating=COALESCE(excluded.rating, catalog.rating),
           release_tag=COALESCE(excluded.release_tag, catalog.release_tag),
           poster_url=COALESCE(excluded.poster_url, catalog.poster_url),
           poster_credit=COALESCE(excluded.poster_credit, catalog.poster_credit),
           synopsis=COALESCE(excluded.synopsis, catalog.synopsis),
           download_url=COALESCE(excluded.download_url, catalog.download_url),
           source_url=excluded.source_url, scraped_at=excluded.scraped_at,
           updated_at=CURRENT_TIMESTAMP",
    )
    .bind(&r.unique_id)
    .bind(&r.external_id)
    .bind(&r.title)
    .bind(r.year.map(i64::from))
    .bind(i64::from(r.is_series))
    .bind(r.season_number.map(i64::from))
    .bind(&r.series_name)
    .bind(r.series_key())
    .bind(field_json(&r.director)?)
    .bind(field_json(&r.genre)?)
    .bind(field_json(&r.language)?)
    .bind(field_json(&r.translator)?)
    .bind(field_json(&r.certification)?)
    .bind(field_json(&r.rating)?)
    .bind(field_json(&r.release_tag)?)
    .bind(&r.poster_url)
    .bind(field_json(&r.poster_credit)?)
    .bind(Some(r.synopsis.as_str()).filter(|s| *s != NO_SYNOPSIS))
    .bind(&r.download_url)
    .bind(&r.source_url)
    .bind(r.scraped_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(if existing > 0 { UpsertOutcome::Updated } else { UpsertOutcome::Inserted })
}

pub async fn get_record(pool: &AnyPool, unique_id: &str) -> Result<Option<ContentRecord>> {
    let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE unique_id = ? LIMIT 1"))
        .bind(unique_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

pub async fn list_records(pool: &AnyPool) -> Result<Vec<ContentRecord>> {
    let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY unique_id"))
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

pub async fn list_series_members(pool: &AnyPool, series_key: &str) -> Result<Vec<ContentRecord>> {
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE series_key = ? ORDER BY COALESCE(season_number, 0), unique_id"
    ))
    .bind(series_key)
    .fetch_all(pool)
    .await?;
    rows.iter().map(record_from_row).collect()
}

pub async fn count_records(pool: &AnyPool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog").fetch_one(pool).await?;
    Ok(n)
}

/// Set every series member's `total_seasons` to the number of distinct
/// seasons catalogued under its series key.
pub async fn recompute_total_seasons(pool: &AnyPool) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE catalog SET total_seasons = (
            SELECT COUNT(DISTINCT c2.season_number) FROM catalog c2
            WHERE c2.series_key = catalog.series_key AND c2.season_number IS NOT NULL
         )
         WHERE series_key IS NOT NULL",
    )
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}
