//! Health checks for the services running on this device.

use serde_json::Value;

use crate::config::ServiceConfig;
use crate::models::Status;

/// Status code reported when a service doesn't answer at all.
pub const UNREACHABLE: &str = "unreachable";

fn service_url(service: &ServiceConfig, path: &str) -> String {
    format!("http://{}:{}{}", service.host, service.port, path)
}

/// Check one service through its `/health` and `/version` endpoints.
pub async fn check_service(client: &reqwest::Client, service: &ServiceConfig) -> Status {
    let mut status = Status {
        name: service.name.clone(),
        bin: service.bin.clone(),
        ..Default::default()
    };

    tracing::debug!("Checking {} on port {}", service.name, service.port);

    let response = match client.get(service_url(service, "/health")).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Service {} not responding: {}", service.name, e);
            status.statuscode = UNREACHABLE.to_string();
            return status;
        }
    };

    status.statuscode = response.status().as_u16().to_string();
    match response.text().await {
        Ok(body) => status.info = health_info(&body),
        Err(e) => tracing::warn!("Failed to read health of {}: {}", service.name, e),
    }

    status.version = fetch_version(client, service).await.unwrap_or_default();
    status
}

/// Check every configured service, keeping configuration order.
pub async fn check_services(client: &reqwest::Client, services: &[ServiceConfig]) -> Vec<Status> {
    let mut statuses = Vec::with_capacity(services.len());
    for service in services {
        statuses.push(check_service(client, service).await);
    }
    statuses
}

async fn fetch_version(client: &reqwest::Client, service: &ServiceConfig) -> Option<String> {
    let response = client.get(service_url(service, "/version")).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body = response.text().await.ok()?;
    Some(body.trim().trim_matches('"').to_string())
}

/// JSON health bodies are kept as-is; plain text is wrapped in a string.
fn health_info(body: &str) -> Option<Value> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}
