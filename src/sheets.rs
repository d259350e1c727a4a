//! Remote tabular data source
//!
//! The expert roster lives in a Google Sheet. Rows are fetched through the
//! Sheets v4 `values` endpoint and returned as-is: header row first, no
//! column parsing.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Ordered rows, header row first
pub type Rows = Vec<Vec<String>>;

/// Errors from the remote data source
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("Sheets API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request failed")]
    Transport(#[source] reqwest::Error),

    #[error("data source returned no rows")]
    Empty,
}

impl From<reqwest::Error> for DataSourceError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest renders the request URL in its message; keep it out of logs
        DataSourceError::Transport(e.without_url())
    }
}

/// Anything that can produce a fresh tabular snapshot
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Stable identity of the source (stored alongside cached snapshots)
    fn identity(&self) -> String;

    /// Fetch the full table
    async fn fetch(&self) -> Result<Rows, DataSourceError>;
}

/// Sheets API values response
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets backed data source
#[derive(Clone)]
pub struct GoogleSheetsSource {
    client: Client,
    api_url: String,
    sheet_id: String,
    range: String,
    api_key: String,
}

impl GoogleSheetsSource {
    pub fn new(sheet_id: &str, range: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: SHEETS_API_URL.to_string(),
            sheet_id: sheet_id.to_string(),
            range: range.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(&config.sheet_id, &config.sheet_range, &config.google_api_key)
    }

    /// Override the API base (testing)
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    fn values_url(&self) -> String {
        format!("{}/{}/values/{}", self.api_url, self.sheet_id, self.range)
    }
}

#[async_trait]
impl DataSource for GoogleSheetsSource {
    fn identity(&self) -> String {
        format!("sheets:{}!{}", self.sheet_id, self.range)
    }

    async fn fetch(&self) -> Result<Rows, DataSourceError> {
        debug!("Fetching sheet {} range {}", self.sheet_id, self.range);

        let response = self
            .client
            .get(self.values_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DataSourceError::Api { status, body });
        }

        let range: ValueRange = response.json().await?;
        let rows = normalize_rows(range.values);

        if rows.is_empty() {
            return Err(DataSourceError::Empty);
        }

        debug!("Fetched {} rows from sheet", rows.len());
        Ok(rows)
    }
}

/// Render every cell as text, keeping row order and ragged row lengths
fn normalize_rows(values: Vec<Vec<serde_json::Value>>) -> Rows {
    values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}
