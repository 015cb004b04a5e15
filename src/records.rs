use crate::error::Result;
use crate::types::CandidateRecord;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The persisted record collection: a JSON array of candidate records on
/// disk. It is the hand-off artifact between the crawl and the importer and
/// can be consumed independently of either.
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the full collection; a missing file is an empty collection.
    pub fn load(&self) -> Result<Vec<CandidateRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let records: Vec<CandidateRecord> = serde_json::from_str(&content)?;
        Ok(records)
    }

    /// Replaces the collection wholesale (full/bounded scans).
    pub fn replace(&self, records: &[CandidateRecord]) -> Result<()> {
        self.write(records)?;
        info!(count = records.len(), path = %self.path.display(), "saved event collection");
        Ok(())
    }

    /// Appends records whose URL is not already present (update runs).
    /// Returns how many were actually added.
    pub fn append_new(&self, records: &[CandidateRecord]) -> Result<usize> {
        let mut existing = self.load()?;
        let known_urls: HashSet<String> = existing
            .iter()
            .filter_map(|r| r.url.clone())
            .collect();

        let mut appended = 0;
        for record in records {
            let duplicate = record
                .url
                .as_deref()
                .is_some_and(|u| known_urls.contains(u));
            if !duplicate {
                existing.push(record.clone());
                appended += 1;
            } else {
                debug!(url = ?record.url, "already in collection, not appending");
            }
        }

        self.write(&existing)?;
        info!(
            appended,
            total = existing.len(),
            path = %self.path.display(),
            "updated event collection"
        );
        Ok(appended)
    }

    fn write(&self, records: &[CandidateRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
