use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("fetch of {url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("database error: {message}")]
    Database { message: String },
}

pub type Result<T> = std::result::Result<T, ScraperError>;
