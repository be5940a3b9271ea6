use regex::Regex;

/// Series facts derived from a release title.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeasonInfo {
    pub is_series: bool,
    pub season_number: Option<u32>,
    pub series_name: Option<String>,
}

/// Season-clause patterns, tried in order. Group 1 is the season number.
const SEASON_PATTERNS: &[&str] = &[
    r"(?i)\bseason\s*[-:#.]?\s*(\d{1,2})\b",
    r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\s+season\b",
    r"സീസ(?:ൺ|ണ്‍|ണ്)\s*[-:#.]?\s*(\d{1,2})",
    r"(\d{1,2})\s*-?ാം\s*സീസ(?:ൺ|ണ്‍|ണ്)",
    r"सीज़?न\s*[-:#.]?\s*(\d{1,2})",
    r"சீசன்\s*[-:#.]?\s*(\d{1,2})",
    r"\bS(\d{1,2})(?:E\d{1,3})?\b",
];

const SERIES_KEYWORDS: &str =
    r"(?i)\b(?:web\s*series|mini[\s-]?series|tv\s*series|series)\b|സീരീസ്|സീരിസ്";

const YEAR_PATTERN: &str = r"\((\d{4})\)";

pub struct SeasonDetector {
    seasons: Vec<Regex>,
    keyword: Regex,
    year: Regex,
}

impl SeasonDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            seasons: SEASON_PATTERNS.iter().map(|p| Regex::new(p)).collect::<Result<_, _>>()?,
            keyword: Regex::new(SERIES_KEYWORDS)?,
            year: Regex::new(YEAR_PATTERN)?,
        })
    }

    /// `type_hint` is set when the page itself labels the release a series.
    pub fn detect(&self, title: &str, type_hint: bool) -> SeasonInfo {
        for re in &self.seasons {
            let Some(caps) = re.captures(title) else { continue };
            let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else { continue };
            let Ok(season) = num.as_str().parse::<u32>() else { continue };
            let prefix = trim_separators(&title[..whole.start()]);
            let series_name = if prefix.is_empty() {
                trim_separators(&title[whole.end()..])
            } else {
                prefix
            };
            return SeasonInfo {
                is_series: true,
                season_number: Some(season),
                series_name: Some(series_name).filter(|s| !s.is_empty()).or_else(|| Some(title.trim().to_string())),
            };
        }
        if type_hint || self.keyword.is_match(title) {
            return SeasonInfo {
                is_series: true,
                season_number: Some(1),
                series_name: Some(title.trim().to_string()),
            };
        }
        SeasonInfo::default()
    }

    pub fn year(&self, title: &str) -> Option<i32> {
        self.year.captures(title)?.get(1)?.as_str().parse().ok()
    }
}

fn trim_separators(s: &str) -> String {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '–' | '—' | ':' | '|' | ',' | '(' | '['))
        .to_string()
}
