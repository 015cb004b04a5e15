use crate::error::{Result, ScraperError};
use crate::importer::{Event, Location};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const SCHEMA: &str = r#"
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS location (
        location_id INTEGER PRIMARY KEY AUTOINCREMENT,
        venue_name  TEXT NOT NULL,
        address     TEXT,
        city        TEXT,
        zip_code    TEXT
    );
    CREATE TABLE IF NOT EXISTS event (
        event_id     INTEGER PRIMARY KEY AUTOINCREMENT,
        event_name   TEXT NOT NULL,
        event_date   TEXT NOT NULL,
        start_time   TEXT,
        end_time     TEXT,
        organizer_id INTEGER,
        location_id  INTEGER REFERENCES location(location_id)
    );
"#;

/// SQLite-backed storage for the normalized location/event tables. Dates are
/// stored as ISO `YYYY-MM-DD` text and times as `HH:MM:SS`.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (and if needed initializes) the database. Failure here is fatal
    /// to the run: without a reachable store there is nothing to merge into.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| ScraperError::Database {
            message: format!("failed to open database at {}: {e}", path.display()),
        })?;
        conn.execute_batch(SCHEMA)?;

        info!("opened event database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ScraperError::Database {
            message: format!("failed to open in-memory database: {e}"),
        })?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn location_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM location", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn event_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn time_to_sql(time: Option<NaiveTime>) -> Option<String> {
    time.map(|t| t.format("%H:%M:%S").to_string())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn begin(&self) -> Result<()> {
        self.conn.lock().unwrap().execute_batch("BEGIN")?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.conn.lock().unwrap().execute_batch("COMMIT")?;
        Ok(())
    }

    async fn get_location_id(
        &self,
        venue_name: &str,
        zip_code: Option<&str>,
    ) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT location_id FROM location
                 WHERE venue_name = ?1 AND COALESCE(zip_code, '') = COALESCE(?2, '')",
                params![venue_name, zip_code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    async fn create_location(&self, location: &mut Location) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO location (venue_name, address, city, zip_code)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                location.venue_name,
                location.address,
                location.city,
                location.zip_code
            ],
        )?;
        location.location_id = Some(conn.last_insert_rowid());
        Ok(())
    }

    async fn event_exists(&self, event_name: &str, event_date: NaiveDate) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let id: Option<i64> = conn
            .query_row(
                "SELECT event_id FROM event WHERE event_name = ?1 AND event_date = ?2",
                params![event_name, date_to_sql(event_date)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.is_some())
    }

    async fn create_event(&self, event: &mut Event) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO event (event_name, event_date, start_time, end_time, organizer_id, location_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.event_name,
                date_to_sql(event.event_date),
                time_to_sql(event.start_time),
                time_to_sql(event.end_time),
                event.organizer_id,
                event.location_id
            ],
        )?;
        event.event_id = Some(conn.last_insert_rowid());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn location_natural_key_treats_missing_zip_as_empty() {
        let storage = SqliteStorage::open_in_memory().unwrap();

        let mut location = Location {
            location_id: None,
            venue_name: "Grange Hall".to_string(),
            address: None,
            city: None,
            zip_code: None,
        };
        storage.create_location(&mut location).await.unwrap();
        let id = location.location_id.unwrap();

        assert_eq!(
            storage.get_location_id("Grange Hall", None).await.unwrap(),
            Some(id)
        );
        assert_eq!(
            storage.get_location_id("Grange Hall", Some("")).await.unwrap(),
            Some(id)
        );
        assert_eq!(
            storage
                .get_location_id("Grange Hall", Some("04101"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn event_round_trip_and_existence_check() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();

        assert!(!storage.event_exists("Book Fair", date).await.unwrap());

        let mut event = Event {
            event_id: None,
            event_name: "Book Fair".to_string(),
            event_date: date,
            start_time: NaiveTime::from_hms_opt(10, 0, 0),
            end_time: None,
            organizer_id: None,
            location_id: None,
        };
        storage.create_event(&mut event).await.unwrap();

        assert!(event.event_id.is_some());
        assert!(storage.event_exists("Book Fair", date).await.unwrap());
        assert_eq!(storage.event_count().unwrap(), 1);
    }
}
