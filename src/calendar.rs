use crate::config::ScraperConfig;
use crate::error::Result;
use crate::extract::{extract_listing, extract_venue_details};
use crate::fetch::fetch_page;
use crate::types::{CandidateRecord, PageSource};
use chrono::Local;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// The Maine Public community calendar as a paginated record source: listing
/// fetch + extraction, plus one venue detail fetch per event when enabled.
pub struct CalendarSource {
    client: Client,
    config: ScraperConfig,
    origin: String,
}

impl CalendarSource {
    pub fn new(client: Client, config: ScraperConfig) -> Self {
        let origin = site_origin(&config.base_url);
        Self {
            client,
            config,
            origin,
        }
    }

    /// Page 1 is the bare base URL; later pages carry the `p` query parameter.
    fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            self.config.base_url.clone()
        } else if self.config.base_url.contains('?') {
            format!("{}&p={page}", self.config.base_url)
        } else {
            format!("{}?p={page}", self.config.base_url)
        }
    }

    /// Venue details live on each event's own page. A failed detail fetch
    /// costs the record its venue, never the record itself.
    async fn attach_venue_details(&self, records: &mut [CandidateRecord]) {
        for record in records.iter_mut() {
            let Some(url) = record.url.clone() else {
                continue;
            };

            match fetch_page(&self.client, &url).await {
                Ok(body) => {
                    let venue = extract_venue_details(&body);
                    if !venue.is_empty() {
                        record.venue = Some(venue);
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "venue detail fetch failed");
                }
            }

            sleep(Duration::from_millis(self.config.detail_delay_ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl PageSource for CalendarSource {
    #[instrument(skip(self))]
    async fn scrape_page(&self, page: u32) -> Result<Vec<CandidateRecord>> {
        let url = self.page_url(page);
        let body = fetch_page(&self.client, &url).await?;

        let today = Local::now().date_naive();
        let mut records = extract_listing(&body, &self.origin, today);
        debug!(page, count = records.len(), "extracted listing records");

        if self.config.fetch_details {
            self.attach_venue_details(&mut records).await;
        }

        Ok(records)
    }
}

/// `https://host/path?query` → `https://host`, for absolutizing relative
/// event links.
fn site_origin(base_url: &str) -> String {
    let after_scheme = base_url.find("://").map(|i| i + 3).unwrap_or(0);
    match base_url[after_scheme..].find('/') {
        Some(i) => base_url[..after_scheme + i].to_string(),
        None => base_url.to_string(),
    }
}
