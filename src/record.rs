use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for a translator the page does not credit.
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for any other descriptive field whose cascade came up empty.
pub const NOT_AVAILABLE: &str = "N/A";
/// Placeholder synopsis.
pub const NO_SYNOPSIS: &str = "No description available";

/// A descriptive value: either a credit that links somewhere or bare text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Linked { name: String, url: Option<String> },
    Text(String),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self { FieldValue::Text(s.into()) }

    pub fn linked(name: impl Into<String>, url: Option<String>) -> Self {
        FieldValue::Linked { name: name.into(), url }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldValue::Linked { name, .. } => name,
            FieldValue::Text(s) => s,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            FieldValue::Linked { url, .. } => url.as_deref(),
            FieldValue::Text(_) => None,
        }
    }

    /// True when this value is one of the "cascade exhausted" markers.
    pub fn is_placeholder(&self) -> bool {
        self.url().is_none() && matches!(self.name(), UNKNOWN | NOT_AVAILABLE)
    }
}

/// The descriptive fields that run through an extraction cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Director,
    Genre,
    Language,
    Translator,
    Certification,
    Rating,
    ReleaseTag,
    PosterCredit,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Director,
        Field::Genre,
        Field::Language,
        Field::Translator,
        Field::Certification,
        Field::Rating,
        Field::ReleaseTag,
        Field::PosterCredit,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Field::Director => "director",
            Field::Genre => "genre",
            Field::Language => "language",
            Field::Translator => "translator",
            Field::Certification => "certification",
            Field::Rating => "rating",
            Field::ReleaseTag => "release_tag",
            Field::PosterCredit => "poster_credit",
        }
    }

    pub fn default_value(self) -> FieldValue {
        match self {
            Field::Translator => FieldValue::text(UNKNOWN),
            _ => FieldValue::text(NOT_AVAILABLE),
        }
    }
}

/// What the extractor pulls out of one detail page, before identity is known.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialRecord {
    pub title: String,
    pub year: Option<i32>,
    pub is_series: bool,
    pub season_number: Option<u32>,
    pub series_name: Option<String>,
    pub imdb_url: Option<String>,
    pub director: Option<FieldValue>,
    pub genre: Option<FieldValue>,
    pub language: Option<FieldValue>,
    pub translator: Option<FieldValue>,
    pub certification: Option<FieldValue>,
    pub rating: Option<FieldValue>,
    pub release_tag: Option<FieldValue>,
    pub poster_credit: Option<FieldValue>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub download_url: Option<String>,
    pub source_url: String,
}

impl PartialRecord {
    pub fn field(&self, field: Field) -> Option<&FieldValue> {
        match field {
            Field::Director => self.director.as_ref(),
            Field::Genre => self.genre.as_ref(),
            Field::Language => self.language.as_ref(),
            Field::Translator => self.translator.as_ref(),
            Field::Certification => self.certification.as_ref(),
            Field::Rating => self.rating.as_ref(),
            Field::ReleaseTag => self.release_tag.as_ref(),
            Field::PosterCredit => self.poster_credit.as_ref(),
        }
    }

    pub fn set_field(&mut self, field: Field, value: FieldValue) {
        let slot = match field {
            Field::Director => &mut self.director,
            Field::Genre => &mut self.genre,
            Field::Language => &mut self.language,
            Field::Translator => &mut self.translator,
            Field::Certification => &mut self.certification,
            Field::Rating => &mut self.rating,
            Field::ReleaseTag => &mut self.release_tag,
            Field::PosterCredit => &mut self.poster_credit,
        };
        *slot = Some(value);
    }
}

/// One catalogued release. This is the shape consumers read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub unique_id: String,
    pub external_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub is_series: bool,
    pub season_number: Option<u32>,
    pub series_name: Option<String>,
    pub total_seasons: Option<u32>,
    pub director: FieldValue,
    pub genre: FieldValue,
    pub language: FieldValue,
    pub translator: FieldValue,
    pub certification: FieldValue,
    pub rating: FieldValue,
    pub release_tag: FieldValue,
    pub poster_url: Option<String>,
    pub poster_credit: FieldValue,
    pub synopsis: String,
    pub download_url: Option<String>,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn field(&self, field: Field) -> &FieldValue {
        match field {
            Field::Director => &self.director,
            Field::Genre => &self.genre,
            Field::Language => &self.language,
            Field::Translator => &self.translator,
            Field::Certification => &self.certification,
            Field::Rating => &self.rating,
            Field::ReleaseTag => &self.release_tag,
            Field::PosterCredit => &self.poster_credit,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut FieldValue {
        match field {
            Field::Director => &mut self.director,
            Field::Genre => &mut self.genre,
            Field::Language => &mut self.language,
            Field::Translator => &mut self.translator,
            Field::Certification => &mut self.certification,
            Field::Rating => &mut self.rating,
            Field::ReleaseTag => &mut self.release_tag,
            Field::PosterCredit => &mut self.poster_credit,
        }
    }

    /// Normalized grouping key for the series this record belongs to.
    pub fn series_key(&self) -> Option<String> {
        self.series_name.as_deref().map(normalize_series_name).filter(|k| !k.is_empty())
    }

    /// Apply a fresh scrape on top of the stored version of the same record.
    ///
    /// Scraped fields are overwritten, except that a placeholder or a missing
    /// optional value never replaces a real value from an earlier scrape.
    /// `total_seasons` belongs to the aggregate pass and is carried over.
    pub fn merged_over(mut self, previous: &ContentRecord) -> ContentRecord {
        for field in Field::ALL {
            if self.field(field).is_placeholder() && !previous.field(field).is_placeholder() {
                *self.field_mut(field) = previous.field(field).clone();
            }
        }
        if self.synopsis == NO_SYNOPSIS && previous.synopsis != NO_SYNOPSIS {
            self.synopsis = previous.synopsis.clone();
        }
        if self.year.is_none() { self.year = previous.year; }
        if self.poster_url.is_none() { self.poster_url = previous.poster_url.clone(); }
        if self.download_url.is_none() { self.download_url = previous.download_url.clone(); }
        self.total_seasons = previous.total_seasons;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Lowercase, collapse inner whitespace, trim.
pub fn normalize_series_name(name: &str) -> String {
    let t = name.trim().to_lowercase();
    let mut o = String::with_capacity(t.len());
    let mut s = false;
    for c in t.chars() {
        if c.is_whitespace() {
            if !s { o.push(' '); s = true; }
        } else {
            o.push(c); s = false;
        }
    }
    o
}
