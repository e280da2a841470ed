//! HTTP direct transport.
//!
//! Fetches single records from the hosted backend's REST surface,
//! authenticated with the caller's session bearer token. This is the
//! profile loader's fallback path when the primary store lookup times out
//! or errors, so it must stay dependency-light: one GET, no retries.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use advisorly_session::{DirectTransport, TransportError};

/// REST record fetcher over `reqwest`.
pub struct HttpDirectTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpDirectTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Attach the backend's public API key, sent alongside the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn record_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }
}

#[async_trait]
impl DirectTransport for HttpDirectTransport {
    async fn get_record(
        &self,
        table: &str,
        id: &str,
        bearer: &str,
    ) -> Result<Option<Value>, TransportError> {
        let url = self.record_url(table);
        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("id", format!("eq.{id}")),
                ("select", "*".to_string()),
                ("limit", "1".to_string()),
            ])
            .bearer_auth(bearer)
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        // The REST surface answers row filters with an array.
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))?;
        if rows.is_empty() {
            debug!(table, id, "no matching record");
        }
        Ok(rows.into_iter().next())
    }
}
