use crate::config::ScraperConfig;
use crate::error::{Result, ScraperError};
use reqwest::Client;
use std::time::Duration;

/// Builds the HTTP client used for every fetch in a run: fixed identity
/// header and a bounded timeout.
pub fn build_http_client(config: &ScraperConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;
    Ok(client)
}

/// Fetches one page's raw document. There are no retries: any failure
/// (timeout, connection error, non-2xx status) is reported to the caller,
/// which decides what the page is worth.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}
