use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CrawlError;

pub const DEFAULT_BASE_URL: &str = "https://malayalamsubtitles.org";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Crawl settings. Every key is optional in the TOML file; environment
/// variables (`SUBCAT_*`) win over the file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub listing_path: String,
    pub max_pages: usize,
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
    pub early_stop_after: usize,
    pub database: String,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            listing_path: "/releases/".to_string(),
            max_pages: 3,
            request_delay_ms: 1000,
            request_timeout_secs: 30,
            max_attempts: 3,
            backoff_step_ms: 2000,
            early_stop_after: 3,
            database: "db.json".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScraperConfig {
    /// Defaults, then the optional TOML file, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, CrawlError> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("SUBCAT_CONFIG").map(Into::into));
        let mut cfg = match file {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| CrawlError::Config(format!("reading {}: {e}", path.display())))?;
                toml::from_str(&text)
                    .map_err(|e| CrawlError::Config(format!("parsing {}: {e}", path.display())))?
            }
            None => ScraperConfig::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply `SUBCAT_*` overrides from any key lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CrawlError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup("SUBCAT_ENVIRONMENT").is_some_and(|v| v.eq_ignore_ascii_case("production")) {
            self.max_pages = 10;
        }
        if let Some(v) = lookup("SUBCAT_BASE_URL") { self.base_url = v; }
        if let Some(v) = lookup("SUBCAT_LISTING_PATH") { self.listing_path = v; }
        if let Some(v) = lookup("SUBCAT_DATABASE") { self.database = v; }
        if let Some(v) = lookup("SUBCAT_USER_AGENT") { self.user_agent = v; }
        parse_into(&lookup, "SUBCAT_MAX_PAGES", &mut self.max_pages)?;
        parse_into(&lookup, "SUBCAT_DELAY_MS", &mut self.request_delay_ms)?;
        parse_into(&lookup, "SUBCAT_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        parse_into(&lookup, "SUBCAT_MAX_ATTEMPTS", &mut self.max_attempts)?;
        parse_into(&lookup, "SUBCAT_BACKOFF_MS", &mut self.backoff_step_ms)?;
        parse_into(&lookup, "SUBCAT_EARLY_STOP_AFTER", &mut self.early_stop_after)?;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| CrawlError::Config(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CrawlError::Config(format!("base_url must be http(s): {}", self.base_url)));
        }
        if self.max_attempts == 0 {
            return Err(CrawlError::Config("max_attempts must be at least 1".into()));
        }
        if self.database.trim().is_empty() {
            return Err(CrawlError::Config("database must not be empty".into()));
        }
        Ok(())
    }

    pub fn listing_url(&self) -> String {
        match url::Url::parse(&self.base_url).and_then(|b| b.join(&self.listing_path)) {
            Ok(u) => u.to_string(),
            Err(_) => format!("{}{}", self.base_url.trim_end_matches('/'), self.listing_path),
        }
    }

    pub fn detail_delay(&self) -> Duration { Duration::from_millis(self.request_delay_ms) }
    pub fn listing_delay(&self) -> Duration { Duration::from_millis(self.request_delay_ms * 2) }
    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
    pub fn backoff_step(&self) -> Duration { Duration::from_millis(self.backoff_step_ms) }
}

fn parse_into<T, F>(lookup: &F, key: &str, slot: &mut T) -> Result<(), CrawlError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| CrawlError::Config(format!("{key}={raw:?}: {e}")))?;
    }
    Ok(())
}
