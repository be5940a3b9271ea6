//! Detail-page extraction.
//!
//! Every field is found by an ordered [`Cascade`] of strategies: the details
//! table, a dedicated selector, a free-text pattern, a keyword vocabulary and
//! finally the field's placeholder. A page without a title is not a release
//! page and yields `None`.

pub mod cascade;
pub mod season;
pub mod table;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::trace;
use url::Url;

use crate::record::{Field, PartialRecord, NO_SYNOPSIS};
use cascade::{absolutize, collapse_ws, Cascade, PageView, Strategy};
use season::SeasonDetector;
use table::TableParser;

const TITLE_SELECTORS: &[&str] = &["h1#release-title", "h1.entry-title", ".post-title h1", "h1"];
const POSTER_SELECTORS: &[&str] = &[
    "figure#release-poster img",
    ".post-thumbnail img",
    ".entry-content img",
    r#"img[src*="poster"]"#,
];
const SYNOPSIS_SELECTORS: &[&str] = &["div#synopsis", ".entry-content", ".post-content", ".synopsis"];
const IMDB_SELECTORS: &[&str] = &["a#imdb-button", r#"a[href*="imdb.com"]"#, r#"a[title*="IMDb"]"#];
const DOWNLOAD_SELECTORS: &[&str] = &[
    "a#download-button",
    "a[data-downloadurl]",
    ".download-link a",
    r#"a[href*="download"]"#,
];
const META_SELECTORS: &str = ".entry-meta, .post-categories, .tags-links, .cat-links, #release-meta";
const RELEASE_TYPE_SELECTOR: &str = "a#release-type-button";

const IMDB_TEXT_PATTERN: &str = r"(?i)(?:https?://)?(?:www\.|m\.)?imdb\.com/title/(tt\d+)";
const WPDM_PATTERN: &str = r"wpdmdl=(\d+)";

const SYNOPSIS_LIMIT: usize = 2000;

const GENRES: &[&str] = &[
    "Action", "Adventure", "Animation", "Biography", "Comedy", "Crime", "Documentary", "Drama",
    "Family", "Fantasy", "History", "Horror", "Musical", "Mystery", "Romance", "Sci-Fi",
    "Sport", "Thriller", "War", "Western",
];
const LANGUAGES: &[&str] = &[
    "English", "Korean", "Japanese", "Chinese", "Mandarin", "Hindi", "Tamil", "Telugu", "Kannada",
    "Bengali", "Spanish", "French", "German", "Italian", "Turkish", "Thai", "Indonesian",
    "Portuguese", "Russian", "Persian",
];
const CERTIFICATIONS: &[&str] = &[
    "NC-17", "PG-13", "TV-MA", "TV-14", "TV-PG", "TV-Y7", "U/A 16+", "U/A 13+", "U/A 7+", "U/A",
];

/// Compiled selectors, patterns and per-field cascades. Build once per run.
pub struct Extractor {
    base: Url,
    title: Vec<Selector>,
    poster: Vec<Selector>,
    synopsis: Vec<Selector>,
    imdb: Vec<Selector>,
    download: Vec<Selector>,
    meta: Selector,
    release_type: Selector,
    table: TableParser,
    imdb_text: Regex,
    wpdm: Regex,
    seasons: SeasonDetector,
    cascades: Vec<Cascade>,
}

impl Extractor {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid base url: {base_url}"))?;
        Ok(Self {
            base,
            title: selectors(TITLE_SELECTORS)?,
            poster: selectors(POSTER_SELECTORS)?,
            synopsis: selectors(SYNOPSIS_SELECTORS)?,
            imdb: selectors(IMDB_SELECTORS)?,
            download: selectors(DOWNLOAD_SELECTORS)?,
            meta: selector(META_SELECTORS)?,
            release_type: selector(RELEASE_TYPE_SELECTOR)?,
            table: TableParser::new()?,
            imdb_text: Regex::new(IMDB_TEXT_PATTERN)?,
            wpdm: Regex::new(WPDM_PATTERN)?,
            seasons: SeasonDetector::new()?,
            cascades: field_cascades()?,
        })
    }

    pub fn base(&self) -> &Url { &self.base }

    /// Extract a partial record from a detail page, or `None` when the page
    /// carries no title.
    pub fn extract(&self, html: &str, source_url: &str) -> Option<PartialRecord> {
        let doc = Html::parse_document(html);
        let title = self
            .title
            .iter()
            .find_map(|s| doc.select(s).map(|el| collapse_ws(&el.text().collect::<String>())).find(|t| !t.is_empty()))?;

        let table = self.table.parse(&doc, &self.base);
        let mut meta_text = table.text();
        for el in doc.select(&self.meta) {
            meta_text.push('\n');
            meta_text.push_str(&collapse_ws(&el.text().collect::<String>()));
        }
        let view = PageView { doc: &doc, base: &self.base, table, text: visible_text(&doc), meta_text };

        let type_hint = doc
            .select(&self.release_type)
            .any(|el| el.text().collect::<String>().to_lowercase().contains("series"));
        let season = self.seasons.detect(&title, type_hint);

        let mut rec = PartialRecord {
            year: self.seasons.year(&title),
            is_series: season.is_series,
            season_number: season.season_number,
            series_name: season.series_name,
            imdb_url: self.imdb_url(&doc, &view.text),
            poster_url: self.poster_url(&doc),
            synopsis: Some(self.synopsis(&doc)),
            download_url: self.download_url(&doc, &view.text),
            source_url: source_url.to_string(),
            title,
            ..PartialRecord::default()
        };
        for cascade in &self.cascades {
            let (value, via) = cascade.run(&view);
            trace!(field = cascade.field.column(), via = via.unwrap_or("default"), "field resolved");
            rec.set_field(cascade.field, value);
        }
        Some(rec)
    }

    fn imdb_url(&self, doc: &Html, text: &str) -> Option<String> {
        let from_links = self.imdb.iter().find_map(|s| {
            doc.select(s)
                .filter_map(|el| el.value().attr("href"))
                .map(str::trim)
                .find(|h| h.contains("imdb.com") || h.starts_with("/title/"))
                .map(|h| {
                    if h.starts_with('/') {
                        format!("https://www.imdb.com{h}")
                    } else {
                        h.to_string()
                    }
                })
        });
        from_links.or_else(|| {
            self.imdb_text
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|id| format!("https://www.imdb.com/title/{}/", id.as_str()))
        })
    }

    fn poster_url(&self, doc: &Html) -> Option<String> {
        self.poster.iter().find_map(|s| {
            doc.select(s).find_map(|img| {
                let v = img.value();
                v.attr("src")
                    .filter(|src| !src.trim().is_empty() && !src.starts_with("data:"))
                    .or_else(|| v.attr("data-src"))
                    .and_then(|src| absolutize(&self.base, src))
            })
        })
    }

    fn synopsis(&self, doc: &Html) -> String {
        let found = self.synopsis.iter().find_map(|s| {
            doc.select(s)
                .map(|el| collapse_ws(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
        });
        match found {
            Some(text) => truncate_chars(&text, SYNOPSIS_LIMIT),
            None => NO_SYNOPSIS.to_string(),
        }
    }

    /// The data attribute wins over the visible href, which may only point at
    /// a wrapper page.
    fn download_url(&self, doc: &Html, text: &str) -> Option<String> {
        let from_links = self.download.iter().find_map(|s| {
            doc.select(s).find_map(|el| {
                let v = el.value();
                v.attr("data-downloadurl")
                    .and_then(|u| absolutize(&self.base, u))
                    .or_else(|| v.attr("href").and_then(|u| absolutize(&self.base, u)))
            })
        });
        from_links.or_else(|| {
            let id = self.wpdm.captures(text)?.get(1)?.as_str().to_string();
            let mut u = self.base.clone();
            u.set_path("/");
            u.set_query(Some(&format!("wpdmdl={id}")));
            Some(u.to_string())
        })
    }
}

fn field_cascades() -> Result<Vec<Cascade>> {
    let pattern = |p: &str| -> Result<Strategy> { Ok(Strategy::Pattern(Regex::new(p)?)) };
    let css = |s: &str| -> Result<Strategy> { Ok(Strategy::Selector(selector(s)?)) };
    Ok(vec![
        Cascade {
            field: Field::Director,
            strategies: vec![
                Strategy::Table(&["director", "directors", "directed by", "direction", "സംവിധാനം"]),
                css(".director a, .director")?,
                pattern(r"(?im)(?:\bdirectors?\s*[:\-]|^\s*directed\s+by\s*[:\-]?)\s*([^\n|]+)")?,
                pattern(r"സംവിധാനം\s*[:\-]\s*([^\n|]+)")?,
            ],
        },
        Cascade {
            field: Field::Genre,
            strategies: vec![
                Strategy::Table(&["genre", "genres", "ജോണർ", "ജോണര്‍", "വിഭാഗം"]),
                css(".genre a, .genres")?,
                pattern(r"(?i)\bgenres?\s*[:\-]\s*([^\n|]+)")?,
                Strategy::Keywords(GENRES),
            ],
        },
        Cascade {
            field: Field::Language,
            strategies: vec![
                Strategy::Table(&["language", "languages", "ഭാഷ"]),
                pattern(r"(?i)\blanguages?\s*[:\-]\s*([^\n|]+)")?,
                Strategy::Keywords(LANGUAGES),
            ],
        },
        Cascade {
            field: Field::Translator,
            strategies: vec![
                Strategy::Table(&[
                    "translator", "translators", "translated by", "translation", "subtitle by",
                    "പരിഭാഷ", "പരിഭാഷകർ", "പരിഭാഷകര്‍",
                ]),
                css(".translator-info a")?,
                css(r#"a[href*="/tag/"]"#)?,
                pattern(r"(?im)(?:\btranslated\s+by\s*[:\-]|^\s*translated\s+by)\s*([^\n|]+)")?,
            ],
        },
        Cascade {
            field: Field::Certification,
            strategies: vec![
                Strategy::Table(&["certification", "certificate", "rated", "censor", "സർട്ടിഫിക്കറ്റ്"]),
                pattern(r"(?i)\brated\s+(NC-17|PG-13|TV-MA|TV-14|TV-PG|U/A(?:\s*\d+\+)?|PG|G|R|UA|U|A)(?:[^\w+/]|$)")?,
                Strategy::Keywords(CERTIFICATIONS),
            ],
        },
        Cascade {
            field: Field::Rating,
            strategies: vec![
                Strategy::Table(&["imdb rating", "rating", "imdb", "റേറ്റിംഗ്"]),
                css("#imdb-rating, .imdb-rating")?,
                pattern(r"(?i)\bimdb\s*(?:rating)?\s*[:\-]?\s*(\d{1,2}(?:\.\d)?)\s*/\s*10")?,
                pattern(r"(?i)\brating\s*[:\-]\s*(\d{1,2}(?:\.\d)?)")?,
            ],
        },
        Cascade {
            field: Field::ReleaseTag,
            strategies: vec![
                Strategy::Table(&["release", "release no", "release no.", "release number", "msone release", "റിലീസ് നമ്പർ", "റിലീസ്"]),
                css("h4#release-number")?,
                pattern(r"(?i)\brelease\s*(?:no\.?|number|#)\s*[:\-]?\s*(\d+)")?,
            ],
        },
        Cascade {
            field: Field::PosterCredit,
            strategies: vec![
                Strategy::Table(&["poster", "poster design", "poster by", "പോസ്റ്റർ"]),
                css("figure#release-poster figcaption, .poster-credit")?,
                pattern(r"(?im)(?:\bposter\s*(?:design(?:ed)?\s*)?by\s*[:\-]|^\s*poster\s*(?:design(?:ed)?\s*)?by)\s*([^\n|]+)")?,
            ],
        },
    ])
}

/// Visible text, one text node per line, skipping script and style content.
pub(crate) fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        let line = text.trim();
        if !hidden && !line.is_empty() {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {css:?}: {e}"))
}

pub(crate) fn selectors(list: &[&str]) -> Result<Vec<Selector>> {
    list.iter().map(|s| selector(s)).collect()
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
