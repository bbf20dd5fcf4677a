//! HTTP probe implementation.

use super::ProbeError;
use std::time::{Duration, Instant};

/// Prefix `http://` when the address carries no scheme.
pub fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Run an HTTP probe against the given address.
///
/// Returns the time to fetch the full body. Any response counts as
/// reachable, whatever its status code.
pub async fn run_http_probe(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let url = normalize_url(address);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    let start = Instant::now();

    let response = client.get(&url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProbeError::Timeout(timeout)
        } else {
            ProbeError::Network(e.to_string())
        }
    })?;

    // Read the full body to measure complete transfer time
    let _body = response
        .bytes()
        .await
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    Ok(start.elapsed())
}
