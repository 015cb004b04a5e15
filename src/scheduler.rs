//! Work scheduler: partitions a page range into batches, sizes the worker
//! pool from the job size, and drives the batches through a bounded pool.
//!
//! Page work is dominated by network latency, not CPU, so the worker count
//! scales toward the ceiling as jobs grow while small jobs skip the pool
//! overhead. Network completion order is arbitrary, but results are applied
//! to the dedup set and checkpoint strictly in ascending page order, so
//! checkpoint progress is monotonic and the record order handed downstream
//! is page-then-listing order.

use crate::checkpoint::CheckpointStore;
use crate::dedup::record_key;
use crate::error::Result;
use crate::types::{CandidateRecord, PageSource};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Worker-pool shape chosen for one page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPlan {
    pub workers: usize,
    /// Pages processed sequentially by one worker.
    pub batch_size: u32,
}

/// The default parallelism ceiling: available hardware concurrency, with the
/// same fallback the original deployment assumed.
pub fn default_ceiling() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

/// Job-size-tiered sizing policy.
pub fn plan_pool(page_count: u32, ceiling: usize) -> PoolPlan {
    let ceiling = ceiling.max(1);

    if page_count <= 5 {
        PoolPlan {
            workers: (page_count as usize).clamp(1, ceiling),
            batch_size: 1,
        }
    } else if page_count <= 20 {
        PoolPlan {
            workers: ceiling.min((page_count / 2 + 1) as usize),
            batch_size: 2,
        }
    } else if page_count <= 50 {
        let workers = ceiling.min(10);
        PoolPlan {
            workers,
            batch_size: (page_count / workers as u32).max(3),
        }
    } else {
        let workers = ceiling.min(12);
        PoolPlan {
            workers,
            batch_size: (page_count / workers as u32).max(5),
        }
    }
}

/// What a scan of one contiguous page range produced.
#[derive(Debug, Default)]
pub struct PageRangeOutcome {
    /// Unique records in page-then-listing order.
    pub records: Vec<CandidateRecord>,
    /// Cross-page duplicates dropped by the dedup key.
    pub duplicates: usize,
    /// Pages that failed to fetch or parse; they contributed no records.
    pub failed_pages: Vec<u32>,
}

/// Owns the dedup set and checkpoint writer. Workers never touch either:
/// everything funnels through this single collector, applied page-ascending.
struct Collector<'a> {
    checkpoints: &'a CheckpointStore,
    seen: HashSet<String>,
    kept: Vec<CandidateRecord>,
    duplicates: usize,
    failed_pages: Vec<u32>,
    last_url: Option<String>,
}

impl Collector<'_> {
    fn apply(&mut self, page: u32, outcome: Option<Vec<CandidateRecord>>) -> Result<()> {
        match outcome {
            Some(records) => {
                let mut kept_here = 0usize;
                for record in records {
                    if self.seen.insert(record_key(&record)) {
                        if let Some(url) = record.url.clone() {
                            self.last_url = Some(url);
                        }
                        self.kept.push(record);
                        kept_here += 1;
                    } else {
                        self.duplicates += 1;
                    }
                }
                debug!(page, kept = kept_here, "page applied");
                self.checkpoints.save(page, self.last_url.as_deref())?;
            }
            None => self.failed_pages.push(page),
        }
        Ok(())
    }
}

/// Scans the inclusive page range `[start_page, end_page]` through a bounded
/// worker pool. A failed page is logged and skipped; checkpoint write
/// failures are the only errors that abort the scan.
pub async fn scrape_pages(
    source: Arc<dyn PageSource>,
    start_page: u32,
    end_page: u32,
    page_delay: Duration,
    ceiling: usize,
    checkpoints: &CheckpointStore,
) -> Result<PageRangeOutcome> {
    let page_count = end_page.saturating_sub(start_page) + 1;
    let plan = plan_pool(page_count, ceiling);
    info!(
        pages = page_count,
        workers = plan.workers,
        batch_size = plan.batch_size,
        "scrape plan"
    );

    let semaphore = Arc::new(Semaphore::new(plan.workers));
    let mut tasks: JoinSet<Vec<(u32, Option<Vec<CandidateRecord>>)>> = JoinSet::new();

    let mut batch_start = start_page;
    while batch_start <= end_page {
        let batch_end = batch_start.saturating_add(plan.batch_size - 1).min(end_page);
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);

        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Vec::new(),
            };

            let mut results = Vec::new();
            for page in batch_start..=batch_end {
                match source.scrape_page(page).await {
                    Ok(records) => {
                        debug!(page, count = records.len(), "page scraped");
                        results.push((page, Some(records)));
                    }
                    Err(e) => {
                        warn!(page, error = %e, "page failed; it contributes no records");
                        results.push((page, None));
                    }
                }
                // per-worker politeness delay between pages in a batch
                sleep(page_delay).await;
            }
            results
        });

        batch_start = match batch_end.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    let mut pending: BTreeMap<u32, Option<Vec<CandidateRecord>>> = BTreeMap::new();
    let mut next_page = start_page;
    let mut collector = Collector {
        checkpoints,
        seen: HashSet::new(),
        kept: Vec::new(),
        duplicates: 0,
        failed_pages: Vec::new(),
        last_url: None,
    };

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(batch_results) => {
                for (page, outcome) in batch_results {
                    pending.insert(page, outcome);
                }
            }
            Err(e) => warn!(error = %e, "batch task did not complete"),
        }

        // Apply the contiguous prefix; anything past a still-running page
        // stays buffered so dedup/checkpoint state only advances in order.
        while let Some(outcome) = pending.remove(&next_page) {
            collector.apply(next_page, outcome)?;
            next_page += 1;
        }
    }

    // A panicked batch leaves a gap; drain what is left in page order.
    for (page, outcome) in std::mem::take(&mut pending) {
        collector.apply(page, outcome)?;
    }

    Ok(PageRangeOutcome {
        records: collector.kept,
        duplicates: collector.duplicates,
        failed_pages: collector.failed_pages,
    })
}
