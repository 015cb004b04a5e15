use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::dedup::record_key;
use crate::error::Result;
use crate::records::RecordStore;
use crate::scheduler::{default_ceiling, scrape_pages};
use crate::types::{CandidateRecord, PageSource};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Pages scanned per step of the incremental mode.
const UPDATE_WINDOW_PAGES: u32 = 10;
/// Consecutive already-known records before the incremental scan stops.
const UPDATE_STOP_THRESHOLD: u32 = 20;

/// Result of a complete scrape run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScrapeReport {
    pub pages_scanned: u32,
    pub failed_pages: usize,
    pub new_records: usize,
    pub duplicates_dropped: usize,
    /// Records in the on-disk collection after the run.
    pub collection_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    Stopped,
}

/// State machine for the incremental crawl: keep scanning windows of pages
/// until a long unbroken run of already-known records shows the crawl has
/// caught up, or a window comes back empty (source exhausted).
///
/// The stop heuristic assumes the source lists events in a stable, mostly
/// monotonic order. If the upstream listing is re-sorted between runs this
/// can stop early and miss genuinely new records placed deeper in the new
/// order.
pub struct UpdateScan {
    known_urls: HashSet<String>,
    seen_keys: HashSet<String>,
    consecutive_duplicates: u32,
    state: ScanState,
    new_records: Vec<CandidateRecord>,
}

impl UpdateScan {
    pub fn new(known_urls: HashSet<String>) -> Self {
        Self {
            known_urls,
            seen_keys: HashSet::new(),
            consecutive_duplicates: 0,
            state: ScanState::Scanning,
            new_records: Vec::new(),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn known_count(&self) -> usize {
        self.known_urls.len()
    }

    /// Feeds one scanned window of records through the duplicate counter.
    /// A record is a duplicate when its URL was ingested by an earlier run or
    /// its dedup key was already seen during this scan; anything else resets
    /// the counter and is kept.
    pub fn absorb(&mut self, window: Vec<CandidateRecord>) {
        if window.is_empty() {
            info!("window yielded no records; source exhausted");
            self.state = ScanState::Stopped;
            return;
        }

        for record in window {
            let key = record_key(&record);
            let already_known = record
                .url
                .as_deref()
                .is_some_and(|u| self.known_urls.contains(u))
                || self.seen_keys.contains(&key);

            if already_known {
                self.consecutive_duplicates += 1;
            } else {
                self.seen_keys.insert(key);
                self.consecutive_duplicates = 0;
                self.new_records.push(record);
            }
        }

        if self.consecutive_duplicates >= UPDATE_STOP_THRESHOLD {
            info!(
                consecutive = self.consecutive_duplicates,
                "reached known content; stopping incremental scan"
            );
            self.state = ScanState::Stopped;
        }
    }

    /// The strictly-new records collected before the scan stopped.
    pub fn into_new_records(self) -> Vec<CandidateRecord> {
        self.new_records
    }
}

/// Drives a record source through one of the crawl modes and maintains the
/// on-disk collection and checkpoint.
pub struct Pipeline<'a> {
    source: Arc<dyn PageSource>,
    config: &'a Config,
    checkpoints: CheckpointStore,
    records: RecordStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: Arc<dyn PageSource>, config: &'a Config) -> Self {
        Self {
            source,
            checkpoints: CheckpointStore::new(&config.scraper.checkpoint_file),
            records: RecordStore::new(&config.scraper.events_file),
            config,
        }
    }

    fn page_delay(&self) -> Duration {
        Duration::from_millis(self.config.scraper.page_delay_ms)
    }

    fn ceiling(&self) -> usize {
        self.config.scraper.max_workers.unwrap_or_else(default_ceiling)
    }

    /// Full or bounded scan of pages `[1, pages]`. Replaces the on-disk
    /// collection with the deduplicated result.
    #[instrument(skip(self))]
    pub async fn run_scan(&self, pages: u32) -> Result<ScrapeReport> {
        let previous = self.checkpoints.load()?;
        if let Some(last_run) = previous.last_run {
            info!(%last_run, last_page = previous.last_page, "previous run found");
        }

        let outcome = scrape_pages(
            Arc::clone(&self.source),
            1,
            pages.max(1),
            self.page_delay(),
            self.ceiling(),
            &self.checkpoints,
        )
        .await?;

        self.records.replace(&outcome.records)?;

        Ok(ScrapeReport {
            pages_scanned: pages.max(1),
            failed_pages: outcome.failed_pages.len(),
            new_records: outcome.records.len(),
            duplicates_dropped: outcome.duplicates,
            collection_size: outcome.records.len(),
        })
    }

    /// Incremental scan: windows of pages until the update state machine
    /// stops, then append only the strictly-new records to the collection.
    #[instrument(skip(self))]
    pub async fn run_update(&self) -> Result<ScrapeReport> {
        let existing = self.records.load()?;
        let known_urls: HashSet<String> =
            existing.iter().filter_map(|r| r.url.clone()).collect();

        let mut scan = UpdateScan::new(known_urls);
        info!(known = scan.known_count(), "update mode");

        let mut page = 1u32;
        let mut pages_scanned = 0u32;
        let mut failed_pages = 0usize;
        let mut duplicates = 0usize;

        while scan.is_scanning() {
            let window_end = page + UPDATE_WINDOW_PAGES - 1;
            info!(from = page, to = window_end, "checking window");

            let outcome = scrape_pages(
                Arc::clone(&self.source),
                page,
                window_end,
                self.page_delay(),
                self.ceiling(),
                &self.checkpoints,
            )
            .await?;

            pages_scanned += UPDATE_WINDOW_PAGES;
            failed_pages += outcome.failed_pages.len();
            duplicates += outcome.duplicates;

            scan.absorb(outcome.records);
            page += UPDATE_WINDOW_PAGES;
        }

        let new_records = scan.into_new_records();
        let appended = self.records.append_new(&new_records)?;
        let collection_size = self.records.load()?.len();

        Ok(ScrapeReport {
            pages_scanned,
            failed_pages,
            new_records: appended,
            duplicates_dropped: duplicates,
            collection_size,
        })
    }
}
