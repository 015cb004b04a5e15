use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Venue details scraped from an event's detail page. Everything is optional;
/// the source omits fields freely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueInfo {
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

impl VenueInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.street.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip_code.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.website.is_none()
    }
}

/// One candidate event as extracted from a listing page. Dates stay in the
/// source's `MM-DD-YYYY` textual form and times in `hh:mm AM/PM`; the
/// importer normalizes both when loading the relational store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub recurring: bool,
    pub frequency_notes: Option<String>,
    pub url: Option<String>,
    pub venue: Option<VenueInfo>,
}

impl CandidateRecord {
    /// A record carrying neither a title nor a date is noise and is dropped
    /// before it reaches the dedup stage.
    pub fn is_retainable(&self) -> bool {
        let has_title = self.title.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_date = self.date.as_deref().is_some_and(|d| !d.trim().is_empty());
        has_title || has_date
    }
}

/// A paginated source of candidate event records. The crawl scheduler and the
/// update mode only ever talk to this seam, so they can be exercised without
/// the network.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches and extracts one listing page (1-based page number).
    async fn scrape_page(&self, page: u32) -> Result<Vec<CandidateRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_requires_title_or_date() {
        let empty = CandidateRecord::default();
        assert!(!empty.is_retainable());

        let titled = CandidateRecord {
            title: Some("Book Fair".to_string()),
            ..Default::default()
        };
        assert!(titled.is_retainable());

        let dated = CandidateRecord {
            date: Some("11-20-2025".to_string()),
            ..Default::default()
        };
        assert!(dated.is_retainable());

        let blank_title = CandidateRecord {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!blank_title.is_retainable());
    }

    #[test]
    fn venue_info_emptiness() {
        assert!(VenueInfo::default().is_empty());
        let named = VenueInfo {
            name: Some("Town Hall".to_string()),
            ..Default::default()
        };
        assert!(!named.is_empty());
    }
}
