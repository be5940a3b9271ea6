//! On-disk shape of the JSON catalog. Older files used per-site key names
//! (`posterMalayalam`, `srtURL`, ...); they are accepted here and nowhere else.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::identity::{external_id_from, unique_id_from};
use crate::record::{ContentRecord, Field, FieldValue, NO_SYNOPSIS};

/// Translator credits were once stored as a list.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub(crate) enum Credits {
    One(FieldValue),
    Many(Vec<FieldValue>),
}

impl Credits {
    fn into_value(self) -> Option<FieldValue> {
        match self {
            Credits::One(v) => Some(v),
            Credits::Many(mut list) => match list.len() {
                0 => None,
                1 => list.pop(),
                _ => Some(FieldValue::text(
                    list.iter().map(FieldValue::name).collect::<Vec<_>>().join(", "),
                )),
            },
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub(crate) struct StoredRecord {
    pub unique_id: Option<String>,
    pub external_id: Option<String>,
    #[serde(alias = "imdbURL")]
    pub imdb_url: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    #[serde(alias = "isSeries")]
    pub is_series: Option<bool>,
    pub season_number: Option<u32>,
    pub series_name: Option<String>,
    pub total_seasons: Option<u32>,
    pub director: Option<FieldValue>,
    pub genre: Option<FieldValue>,
    pub language: Option<FieldValue>,
    #[serde(alias = "translatedBy")]
    pub translator: Option<Credits>,
    pub certification: Option<FieldValue>,
    pub rating: Option<FieldValue>,
    #[serde(alias = "msoneReleaseNumber")]
    pub release_tag: Option<FieldValue>,
    #[serde(alias = "posterMalayalam")]
    pub poster_url: Option<String>,
    pub poster_credit: Option<FieldValue>,
    #[serde(alias = "descriptionMalayalam")]
    pub synopsis: Option<String>,
    #[serde(alias = "srtURL")]
    pub download_url: Option<String>,
    #[serde(alias = "sourceUrl")]
    pub source_url: Option<String>,
    #[serde(alias = "scrapedAt")]
    pub scraped_at: Option<String>,
}

impl StoredRecord {
    /// Canonical record for a document entry stored under `key`. Entries with
    /// no recoverable external id are dropped.
    pub(crate) fn into_record(self, key: &str) -> Option<ContentRecord> {
        let external_id = self
            .external_id
            .filter(|s| !s.is_empty())
            .or_else(|| self.imdb_url.as_deref().and_then(external_id_from))
            .or_else(|| external_id_from(key))?;
        let is_series = self.is_series.unwrap_or(false);
        let season_number = if is_series { self.season_number.or(Some(1)) } else { None };
        let unique_id = self
            .unique_id
            .unwrap_or_else(|| unique_id_from(&external_id, is_series, season_number));
        let or_default = |v: Option<FieldValue>, f: Field| v.unwrap_or_else(|| f.default_value());

        Some(ContentRecord {
            unique_id,
            external_id,
            title: self.title.unwrap_or_default(),
            year: self.year,
            is_series,
            season_number,
            series_name: self.series_name,
            total_seasons: self.total_seasons,
            director: or_default(self.director, Field::Director),
            genre: or_default(self.genre, Field::Genre),
            language: or_default(self.language, Field::Language),
            translator: or_default(self.translator.and_then(Credits::into_value), Field::Translator),
            certification: or_default(self.certification, Field::Certification),
            rating: or_default(self.rating, Field::Rating),
            release_tag: or_default(self.release_tag, Field::ReleaseTag),
            poster_url: self.poster_url,
            poster_credit: or_default(self.poster_credit, Field::PosterCredit),
            synopsis: self.synopsis.unwrap_or_else(|| NO_SYNOPSIS.to_string()),
            download_url: self.download_url,
            source_url: self.source_url.unwrap_or_default(),
            scraped_at: self.scraped_at.as_deref().and_then(parse_timestamp).unwrap_or_default(),
        })
    }
}

/// RFC 3339, or the older `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok().map(|n| n.and_utc()))
}
