//! Client for a remote devmon instance.
//!
//! Payloads are decoded through the schema tables, so a monitor that omits a
//! required field is reported as an error rather than a half-filled record.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{decode, DecodeError, DeviceInfo, PingResult, Schema};
use crate::probe::normalize_url;

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid payload: {0}")]
    Decode(#[from] DecodeError),
}

/// Typed access to a monitor's JSON API.
#[derive(Debug, Clone)]
pub struct MonitorClient {
    base_url: String,
    http: reqwest::Client,
}

impl MonitorClient {
    /// Create a client for the monitor at `base_url` ("10.5.34.12:10000" or a full URL).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_url(base_url).trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Latest device information.
    pub async fn device_info(&self) -> Result<DeviceInfo, ClientError> {
        self.get_record("/api/device").await
    }

    /// Latest ping result.
    pub async fn ping_result(&self) -> Result<PingResult, ClientError> {
        self.get_record("/api/ping").await
    }

    /// Ask the monitor to sweep now and return the fresh result.
    pub async fn refresh_ping(&self) -> Result<PingResult, ClientError> {
        self.get_record("/api/ping?refresh=true").await
    }

    /// The monitor's hostname.
    pub async fn hostname(&self) -> Result<String, ClientError> {
        let body = self.get_text("/hostname").await?;
        Ok(serde_json::from_str(&body).map_err(DecodeError::from)?)
    }

    async fn get_record<T: Schema + DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let body = self.get_text(path).await?;
        Ok(decode(&body)?)
    }

    async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
