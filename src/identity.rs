use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::Rejected;
use crate::record::{ContentRecord, Field, PartialRecord, NO_SYNOPSIS};

static EXTERNAL_ID: OnceLock<Option<Regex>> = OnceLock::new();

/// IMDb-style title id (`tt` followed by digits) inside a URL or text.
pub fn external_id_from(imdb_url: &str) -> Option<String> {
    let re = EXTERNAL_ID.get_or_init(|| Regex::new(r"tt\d+").ok()).as_ref()?;
    re.find(imdb_url).map(|m| m.as_str().to_string())
}

/// Catalog key: the external id, suffixed with `-S<n>` for series seasons.
pub fn unique_id_from(external_id: &str, is_series: bool, season_number: Option<u32>) -> String {
    match (is_series, season_number) {
        (true, Some(season)) => format!("{external_id}-S{season}"),
        (true, None) => format!("{external_id}-S1"),
        (false, _) => external_id.to_string(),
    }
}

/// Turn an extracted page into a catalog record. Pure: the same partial
/// record always yields the same `unique_id`.
pub fn resolve(partial: PartialRecord, scraped_at: DateTime<Utc>) -> Result<ContentRecord, Rejected> {
    let external_id = partial
        .imdb_url
        .as_deref()
        .and_then(external_id_from)
        .ok_or_else(Rejected::no_external_id)?;
    let unique_id = unique_id_from(&external_id, partial.is_series, partial.season_number);
    let field = |f: Field| partial.field(f).cloned().unwrap_or_else(|| f.default_value());

    Ok(ContentRecord {
        unique_id,
        external_id,
        year: partial.year,
        is_series: partial.is_series,
        season_number: if partial.is_series { partial.season_number.or(Some(1)) } else { None },
        series_name: if partial.is_series { partial.series_name.clone() } else { None },
        total_seasons: None,
        director: field(Field::Director),
        genre: field(Field::Genre),
        language: field(Field::Language),
        translator: field(Field::Translator),
        certification: field(Field::Certification),
        rating: field(Field::Rating),
        release_tag: field(Field::ReleaseTag),
        poster_credit: field(Field::PosterCredit),
        poster_url: partial.poster_url.clone(),
        synopsis: partial.synopsis.clone().unwrap_or_else(|| NO_SYNOPSIS.to_string()),
        download_url: partial.download_url.clone(),
        source_url: partial.source_url.clone(),
        title: partial.title,
        scraped_at,
    })
}
