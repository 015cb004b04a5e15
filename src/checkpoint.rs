use crate::error::{Result, ScraperError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable record of how far a crawl has progressed. Advisory only: resuming
/// is a convenience, while exactly-once ingestion comes from dedup keys and
/// the importer's existence checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
    pub last_page: u32,
    pub last_event_url: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the last known checkpoint. A missing file just means a first
    /// run, so it yields the zero-value default rather than an error.
    pub fn load(&self) -> Result<CrawlCheckpoint> {
        if !self.path.exists() {
            return Ok(CrawlCheckpoint::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ScraperError::Checkpoint(format!("failed to read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ScraperError::Checkpoint(format!("corrupt checkpoint {}: {e}", self.path.display()))
        })
    }

    /// Overwrites the checkpoint after a completed page. The write goes to a
    /// temp file first and is renamed into place, so a crash mid-write cannot
    /// leave a torn checkpoint behind.
    pub fn save(&self, page: u32, last_event_url: Option<&str>) -> Result<()> {
        let checkpoint = CrawlCheckpoint {
            last_page: page,
            last_event_url: last_event_url.map(str::to_string),
            last_run: Some(Utc::now()),
        };

        let json = serde_json::to_string_pretty(&checkpoint).map_err(|e| {
            ScraperError::Checkpoint(format!("failed to serialize checkpoint: {e}"))
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| {
            ScraperError::Checkpoint(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ScraperError::Checkpoint(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(page, "checkpoint saved");
        Ok(())
    }
}
