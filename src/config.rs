use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Process-wide configuration, constructed once at startup and passed by
/// reference into the scheduler, pipeline, and importer.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scraper: ScraperConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// First listing page; later pages append `p=<n>`.
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Delay between pages within one worker's batch.
    pub page_delay_ms: u64,
    /// Delay after each per-event venue detail fetch.
    pub detail_delay_ms: u64,
    /// Parallelism ceiling; unset means available hardware concurrency.
    pub max_workers: Option<usize>,
    /// Page count of a full scan when no `--pages` limit is given.
    pub full_scan_pages: u32,
    pub fetch_details: bool,
    pub events_file: String,
    pub checkpoint_file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.mainepublic.org/community-calendar?f0=&from=&to=&q=".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            timeout_seconds: 10,
            page_delay_ms: 50,
            detail_delay_ms: 200,
            max_workers: None,
            full_scan_pages: 400,
            fetch_details: true,
            events_file: "maine_events.json".to_string(),
            checkpoint_file: "scraper_progress.json".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "meetup_mapper.db".to_string(),
        }
    }
}

impl Config {
    /// Loads the TOML config file, falling back to defaults when it does not
    /// exist so the CLI works out of the box.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
