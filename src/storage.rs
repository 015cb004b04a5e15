use crate::error::Result;
use crate::importer::{Event, Location};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Mutex;
use tracing::debug;

/// Storage seam for the normalized location/event tables. The merge engine
/// only ever performs natural-key SELECTs and INSERTs against these two
/// tables; rows are never updated or deleted by this pipeline.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens the run's unit of work. The importer holds it for the whole
    /// batch and commits once at the end.
    async fn begin(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;

    /// Looks up a location by its natural key (venue name, zip-or-empty).
    async fn get_location_id(
        &self,
        venue_name: &str,
        zip_code: Option<&str>,
    ) -> Result<Option<i64>>;
    /// Inserts a location and assigns its surrogate id.
    async fn create_location(&self, location: &mut Location) -> Result<()>;

    /// True when an event with this (name, date) already exists.
    async fn event_exists(&self, event_name: &str, event_date: NaiveDate) -> Result<bool>;
    /// Inserts an event row and assigns its surrogate id.
    async fn create_event(&self, event: &mut Event) -> Result<()>;
}

/// In-memory storage implementation for development/testing.
pub struct InMemoryStorage {
    locations: Mutex<Vec<Location>>,
    events: Mutex<Vec<Event>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            locations: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn location_count(&self) -> usize {
        self.locations.lock().unwrap().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn locations(&self) -> Vec<Location> {
        self.locations.lock().unwrap().clone()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn get_location_id(
        &self,
        venue_name: &str,
        zip_code: Option<&str>,
    ) -> Result<Option<i64>> {
        let locations = self.locations.lock().unwrap();
        let id = locations
            .iter()
            .find(|l| {
                l.venue_name == venue_name
                    && l.zip_code.as_deref().unwrap_or("") == zip_code.unwrap_or("")
            })
            .and_then(|l| l.location_id);
        Ok(id)
    }

    async fn create_location(&self, location: &mut Location) -> Result<()> {
        let mut locations = self.locations.lock().unwrap();
        let id = locations.len() as i64 + 1;
        location.location_id = Some(id);
        locations.push(location.clone());

        debug!(venue = %location.venue_name, id, "created location");
        Ok(())
    }

    async fn event_exists(&self, event_name: &str, event_date: NaiveDate) -> Result<bool> {
        let events = self.events.lock().unwrap();
        Ok(events
            .iter()
            .any(|e| e.event_name == event_name && e.event_date == event_date))
    }

    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let id = events.len() as i64 + 1;
        event.event_id = Some(id);
        events.push(event.clone());

        debug!(name = %event.event_name, id, "created event");
        Ok(())
    }
}
