use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::extract::table::DetailsTable;
use crate::record::{Field, FieldValue};

/// Everything a strategy may look at, computed once per page.
pub struct PageView<'a> {
    pub doc: &'a Html,
    pub base: &'a Url,
    pub table: DetailsTable,
    /// Visible text of the whole page, one text node per line.
    pub text: String,
    /// Visible text of the metadata regions only (details table, post meta).
    pub meta_text: String,
}

/// One way of finding a field's value.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Row of the details table whose normalized label is one of these.
    Table(&'static [&'static str]),
    /// First element matching a dedicated selector.
    Selector(Selector),
    /// First capture of a label-like phrase in the visible text.
    Pattern(Regex),
    /// First vocabulary term present as a whole word in the metadata text.
    Keywords(&'static [&'static str]),
}

impl Strategy {
    pub fn apply(&self, view: &PageView<'_>) -> Option<FieldValue> {
        match self {
            Strategy::Table(labels) => view.table.lookup(labels),
            Strategy::Selector(sel) => view
                .doc
                .select(sel)
                .find_map(|el| element_value(el, view.base)),
            Strategy::Pattern(re) => re
                .captures(&view.text)
                .and_then(|c| c.get(1))
                .map(|m| clean_capture(m.as_str()))
                .filter(|s| !s.is_empty())
                .map(FieldValue::Text),
            Strategy::Keywords(words) => words
                .iter()
                .find(|w| contains_word(&view.meta_text, w))
                .map(|w| FieldValue::text(*w)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Table(_) => "table",
            Strategy::Selector(_) => "selector",
            Strategy::Pattern(_) => "pattern",
            Strategy::Keywords(_) => "keywords",
        }
    }
}

/// Ordered strategies for one field; the first hit wins, otherwise the
/// field's placeholder.
#[derive(Debug, Clone)]
pub struct Cascade {
    pub field: Field,
    pub strategies: Vec<Strategy>,
}

impl Cascade {
    pub fn run(&self, view: &PageView<'_>) -> (FieldValue, Option<&'static str>) {
        for s in &self.strategies {
            if let Some(v) = s.apply(view) {
                return (v, Some(s.kind()));
            }
        }
        (self.field.default_value(), None)
    }
}

/// Text of an element as a field value. A single link inside (or the element
/// itself being a link) supplies the name and keeps its target; otherwise a
/// leading `Label:` is dropped.
pub fn element_value(el: ElementRef<'_>, base: &Url) -> Option<FieldValue> {
    let text = collapse_ws(&el.text().collect::<String>());
    if text.is_empty() {
        return None;
    }
    let link = if el.value().name() == "a" {
        Some(el)
    } else {
        let mut links = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "a" && e.value().attr("href").is_some());
        match (links.next(), links.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    };
    if let Some(a) = link {
        let name = collapse_ws(&a.text().collect::<String>());
        if let Some(url) = a.value().attr("href").and_then(|h| absolutize(base, h)) {
            let name = if name.is_empty() { strip_label(&text).to_string() } else { name };
            return Some(FieldValue::linked(name, Some(url)));
        }
    }
    Some(FieldValue::text(strip_label(&text)))
}

/// `"Poster: PD"` -> `"PD"`. Only short alphabetic labels count.
fn strip_label(text: &str) -> &str {
    match text.split_once(':') {
        Some((label, rest))
            if !rest.trim().is_empty()
                && !label.trim().is_empty()
                && label.split_whitespace().count() <= 3
                && label.chars().all(|c| c.is_alphabetic() || c.is_whitespace()) =>
        {
            rest.trim()
        }
        _ => text,
    }
}

/// Resolve `href` against the site base. Empty, fragment and script links yield `None`.
pub fn absolutize(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_capture(s: &str) -> String {
    collapse_ws(s)
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '-' | '|'))
        .trim()
        .to_string()
}

/// Case-insensitive whole-word search. Word edges are any non-alphanumeric char.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let hay = haystack.to_lowercase();
    let needle = word.to_lowercase();
    let mut from = 0;
    while let Some(pos) = hay[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = hay[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = hay[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = start + needle.chars().next().map_or(1, char::len_utf8);
    }
    false
}
