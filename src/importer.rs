use crate::error::Result;
use crate::storage::Storage;
use crate::types::{CandidateRecord, VenueInfo};
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A row of the normalized `location` table. Identity is the natural key
/// (venue name, zip-code-or-empty); the surrogate id is store-assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub location_id: Option<i64>,
    pub venue_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
}

/// A row of the normalized `event` table. This pipeline identifies events by
/// (name, date) and never assigns an organizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_id: Option<i64>,
    pub event_name: String,
    pub event_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub organizer_id: Option<i64>,
    pub location_id: Option<i64>,
}

/// What happened to one record during a merge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// Name or date missing/unparseable.
    SkippedMissingFields,
    /// An event with the same (name, date) already exists.
    SkippedDuplicate,
}

/// Aggregate counters reported after a merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Merges deduplicated candidate records into the relational store: resolve
/// or lazily create the location, skip or insert the event. Records are
/// processed sequentially: the work is store round-trips, and the
/// look-up-then-insert pattern must not race itself.
pub struct Importer {
    storage: Arc<dyn Storage>,
    skip_duplicates: bool,
}

impl Importer {
    /// `skip_duplicates` is the caller's policy switch: when false, an event
    /// may be inserted even if a row with the same (name, date) exists.
    pub fn new(storage: Arc<dyn Storage>, skip_duplicates: bool) -> Self {
        Self {
            storage,
            skip_duplicates,
        }
    }

    /// Runs the whole batch, committing once at the end. A bad record is
    /// counted and skipped; only store-connection-class failures (begin or
    /// commit) abort the run.
    #[instrument(skip(self, records))]
    pub async fn run(&self, records: &[CandidateRecord]) -> Result<ImportSummary> {
        let mut summary = ImportSummary {
            total: records.len(),
            ..Default::default()
        };

        self.storage.begin().await?;

        for (index, record) in records.iter().enumerate() {
            match self.import_record(record).await {
                Ok(RecordOutcome::Inserted) => {
                    summary.inserted += 1;
                    if summary.inserted % 10 == 0 {
                        info!(
                            "imported {} of {} records",
                            summary.inserted, summary.total
                        );
                    }
                }
                Ok(RecordOutcome::SkippedMissingFields) => {
                    summary.skipped += 1;
                    debug!(index, "skipping record with missing name or date");
                }
                Ok(RecordOutcome::SkippedDuplicate) => {
                    summary.skipped += 1;
                    debug!(index, title = ?record.title, "skipping duplicate event");
                }
                Err(e) => {
                    summary.errors += 1;
                    warn!(index, title = ?record.title, error = %e, "record failed; continuing");
                }
            }
        }

        self.storage.commit().await?;
        info!(?summary, "import finished");
        Ok(summary)
    }

    async fn import_record(&self, record: &CandidateRecord) -> Result<RecordOutcome> {
        let name = record
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let date = record.date.as_deref().and_then(parse_event_date);

        let (Some(name), Some(date)) = (name, date) else {
            return Ok(RecordOutcome::SkippedMissingFields);
        };

        if self.skip_duplicates && self.storage.event_exists(name, date).await? {
            return Ok(RecordOutcome::SkippedDuplicate);
        }

        let location_id = self.resolve_location(record).await;

        let mut event = Event {
            event_id: None,
            event_name: name.to_string(),
            event_date: date,
            start_time: record.start_time.as_deref().and_then(parse_event_time),
            end_time: record.end_time.as_deref().and_then(parse_event_time),
            organizer_id: None,
            location_id,
        };
        self.storage.create_event(&mut event).await?;

        Ok(RecordOutcome::Inserted)
    }

    /// Resolves the record's venue to a location id, creating the row on
    /// first sight. Any failure costs the event its location reference, not
    /// the event itself.
    async fn resolve_location(&self, record: &CandidateRecord) -> Option<i64> {
        let venue = record.venue.as_ref()?;
        let venue_name = venue
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())?;

        match self.get_or_create_location(venue_name, venue).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(venue = venue_name, error = %e, "location resolution failed; event gets no location");
                None
            }
        }
    }

    async fn get_or_create_location(&self, venue_name: &str, venue: &VenueInfo) -> Result<i64> {
        if let Some(existing) = self
            .storage
            .get_location_id(venue_name, venue.zip_code.as_deref())
            .await?
        {
            debug!(venue = venue_name, location_id = existing, "using existing location");
            return Ok(existing);
        }

        let mut location = Location {
            location_id: None,
            venue_name: venue_name.to_string(),
            address: venue.street.clone(),
            city: venue.city.clone(),
            zip_code: venue.zip_code.clone(),
        };
        self.storage.create_location(&mut location).await?;
        let id = location.location_id.expect("storage assigns an id on create");

        info!(venue = venue_name, location_id = id, "created location");
        Ok(id)
    }
}

/// `MM-DD-YYYY` → calendar date. Anything unparseable is `None`.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%m-%d-%Y").ok()
}

/// `hh:mm AM/PM` → 24-hour time. Anything unparseable is `None`.
pub fn parse_event_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%I:%M %p").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn full_record() -> CandidateRecord {
        CandidateRecord {
            title: Some("Book Fair".to_string()),
            date: Some("11-20-2025".to_string()),
            start_time: Some("10:00 AM".to_string()),
            end_time: Some("02:30 PM".to_string()),
            url: Some("https://x/e/book-fair".to_string()),
            venue: Some(VenueInfo {
                name: Some("Town Hall".to_string()),
                street: Some("1 Municipal Way".to_string()),
                city: Some("Portland".to_string()),
                zip_code: Some("04101".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn date_normalization() {
        assert_eq!(
            parse_event_date("11-20-2025"),
            NaiveDate::from_ymd_opt(2025, 11, 20)
        );
        // an impossible date becomes None instead of raising
        assert_eq!(parse_event_date("13-40-2025"), None);
        assert_eq!(parse_event_date("soon"), None);
    }

    #[test]
    fn time_normalization() {
        assert_eq!(
            parse_event_time("02:30 PM"),
            NaiveTime::from_hms_opt(14, 30, 0)
        );
        assert_eq!(
            parse_event_time("12:00 AM"),
            NaiveTime::from_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_event_time("late"), None);
    }

    #[tokio::test]
    async fn inserts_event_and_creates_location_once() {
        let storage = Arc::new(InMemoryStorage::new());
        let importer = Importer::new(storage.clone(), true);

        let summary = importer.run(&[full_record()]).await.unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(storage.event_count(), 1);
        assert_eq!(storage.location_count(), 1);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let storage = Arc::new(InMemoryStorage::new());
        let importer = Importer::new(storage.clone(), true);

        importer.run(&[full_record()]).await.unwrap();
        let second = importer.run(&[full_record()]).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(storage.event_count(), 1);
        assert_eq!(storage.location_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_policy_is_caller_supplied() {
        let storage = Arc::new(InMemoryStorage::new());
        let importer = Importer::new(storage.clone(), false);

        importer.run(&[full_record()]).await.unwrap();
        importer.run(&[full_record()]).await.unwrap();

        // duplicates allowed: two event rows, but still one location
        assert_eq!(storage.event_count(), 2);
        assert_eq!(storage.location_count(), 1);
    }

    #[tokio::test]
    async fn missing_name_or_date_is_skipped() {
        let storage = Arc::new(InMemoryStorage::new());
        let importer = Importer::new(storage.clone(), true);

        let nameless = CandidateRecord {
            date: Some("11-20-2025".to_string()),
            ..Default::default()
        };
        let dateless = CandidateRecord {
            title: Some("Mystery".to_string()),
            date: Some("13-40-2025".to_string()), // unparseable counts as missing
            ..Default::default()
        };

        let summary = importer.run(&[nameless, dateless]).await.unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.inserted, 0);
        assert_eq!(storage.event_count(), 0);
    }

    #[tokio::test]
    async fn record_without_venue_gets_null_location() {
        let storage = Arc::new(InMemoryStorage::new());
        let importer = Importer::new(storage.clone(), true);

        let mut record = full_record();
        record.venue = None;

        importer.run(&[record]).await.unwrap();
        assert_eq!(storage.event_count(), 1);
        assert_eq!(storage.location_count(), 0);
        assert!(storage.events()[0].location_id.is_none());
    }

    #[tokio::test]
    async fn unparseable_times_become_null_but_the_event_lands() {
        let storage = Arc::new(InMemoryStorage::new());
        let importer = Importer::new(storage.clone(), true);

        let mut record = full_record();
        record.start_time = Some("whenever".to_string());
        record.end_time = None;

        let summary = importer.run(&[record]).await.unwrap();
        assert_eq!(summary.inserted, 1);
        let event = &storage.events()[0];
        assert!(event.start_time.is_none());
        assert!(event.end_time.is_none());
    }
}
