use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::extract::cascade::{absolutize, collapse_ws};
use crate::extract::selector;
use crate::record::FieldValue;

/// One label/value row of a release details table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub label: String,
    pub text: String,
    pub links: Vec<(String, Option<String>)>,
}

/// Label/value rows of the page's details table, labels normalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailsTable {
    pub rows: Vec<Row>,
}

/// Compiled selectors for reading a details table.
pub struct TableParser {
    dedicated: Selector,
    any_table: Selector,
    row: Selector,
    cell: Selector,
    anchor: Selector,
}

impl TableParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dedicated: selector("table#release-details-table")?,
            any_table: selector("table")?,
            row: selector("tr")?,
            cell: selector("td, th")?,
            anchor: selector("a")?,
        })
    }

    /// Prefer the dedicated details table; otherwise take the first table
    /// that has any two-cell rows.
    pub fn parse(&self, doc: &Html, base: &Url) -> DetailsTable {
        if let Some(t) = doc.select(&self.dedicated).next() {
            return DetailsTable { rows: self.rows(t, base) };
        }
        doc.select(&self.any_table)
            .map(|t| self.rows(t, base))
            .find(|rows| !rows.is_empty())
            .map(|rows| DetailsTable { rows })
            .unwrap_or_default()
    }

    fn rows(&self, table: ElementRef<'_>, base: &Url) -> Vec<Row> {
        table
            .select(&self.row)
            .filter_map(|row| {
                let cells: Vec<ElementRef<'_>> = row.select(&self.cell).collect();
                if cells.len() < 2 {
                    return None;
                }
                let label = normalize_label(&cells[0].text().collect::<String>());
                if label.is_empty() {
                    return None;
                }
                let value = cells[1];
                let links = value
                    .select(&self.anchor)
                    .filter_map(|a| {
                        let name = collapse_ws(&a.text().collect::<String>());
                        if name.is_empty() {
                            return None;
                        }
                        let url = a.value().attr("href").and_then(|h| absolutize(base, h));
                        Some((name, url))
                    })
                    .collect();
                Some(Row { label, text: collapse_ws(&value.text().collect::<String>()), links })
            })
            .collect()
    }
}

impl DetailsTable {
    /// Value of the first row whose label is one of `labels`. A single link
    /// keeps its target; several links collapse to their joined names.
    pub fn lookup(&self, labels: &[&str]) -> Option<FieldValue> {
        let row = self.rows.iter().find(|r| labels.iter().any(|l| r.label == *l))?;
        match row.links.as_slice() {
            [] if row.text.is_empty() => None,
            [] => Some(FieldValue::text(row.text.clone())),
            [(name, url)] => Some(FieldValue::linked(name.clone(), url.clone())),
            many => Some(FieldValue::text(
                many.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", "),
            )),
        }
    }

    pub fn text(&self) -> String {
        self.rows
            .iter()
            .map(|r| format!("{}: {}", r.label, r.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lowercase, trim, drop trailing colons.
pub fn normalize_label(raw: &str) -> String {
    collapse_ws(raw)
        .to_lowercase()
        .trim_end_matches(|c: char| c == ':' || c == '：' || c.is_whitespace())
        .trim()
        .to_string()
}
