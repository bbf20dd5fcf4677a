//! HTTP request handlers.

use super::AppState;
use crate::models::{DevicePingResult, Status};
use crate::monitor::{device_id, hostname, internet_connectivity, outbound_ip, ROUTE_PROBE_ADDRESS};
use crate::scheduler::Snapshot;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

// ============================================================================
// Templates
// ============================================================================

const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");

/// Dashboard templates, autoescaped by their `.html` names.
fn dashboard_templates() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("layout.html", LAYOUT_TEMPLATE),
        ("dashboard.html", DASHBOARD_TEMPLATE),
    ])?;
    Ok(tera)
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn handle_dashboard(State(state): State<AppState>) -> Response {
    let snapshot = state.scheduler.snapshot().await;
    let title = match &snapshot.device {
        Some(device) => device.id.clone(),
        None => device_id(state.scheduler.config()).await,
    };

    let page = dashboard_templates().and_then(|tera| render_dashboard(&tera, &title, &snapshot));
    match page {
        Ok(page) => Html(page).into_response(),
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: tera::Error) -> Response {
    tracing::error!("Failed to render dashboard: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}

#[derive(Serialize)]
struct DeviceView<'a> {
    hostname: &'a str,
    id: &'a str,
    ip: &'a str,
    internet: bool,
}

#[derive(Serialize)]
struct StatusView<'a> {
    class: &'static str,
    name: &'a str,
    bin: &'a str,
    statuscode: &'a str,
    version: &'a str,
}

impl<'a> From<&'a Status> for StatusView<'a> {
    fn from(s: &'a Status) -> Self {
        Self {
            class: if s.statuscode == "200" { "ok" } else { "bad" },
            name: &s.name,
            bin: &s.bin,
            statuscode: &s.statuscode,
            version: &s.version,
        }
    }
}

#[derive(Serialize)]
struct PingView<'a> {
    class: &'static str,
    device_id: &'a str,
    address: &'a str,
    ip: &'a str,
    received: u32,
    sent: u32,
    loss: String,
    round_trip: &'a str,
    error: &'a str,
}

impl<'a> From<&'a DevicePingResult> for PingView<'a> {
    fn from(r: &'a DevicePingResult) -> Self {
        Self {
            class: if r.is_success() { "ok" } else { "bad" },
            device_id: &r.device_id,
            address: &r.address,
            ip: &r.ip,
            received: r.packets_received,
            sent: r.packets_sent,
            loss: format!("{:.0}", r.packet_loss),
            round_trip: &r.average_round_trip,
            error: &r.error,
        }
    }
}

fn render_dashboard(tera: &Tera, title: &str, snapshot: &Snapshot) -> tera::Result<String> {
    let device = snapshot.device.clone().unwrap_or_default();
    let ping = snapshot.ping.clone().unwrap_or_default();

    let services: Vec<StatusView> = device.status.iter().map(StatusView::from).collect();
    let pings: Vec<PingView> = ping
        .successful
        .iter()
        .chain(ping.unsuccessful.iter())
        .map(PingView::from)
        .collect();

    let mut ctx = Context::new();
    ctx.insert("title", title);
    ctx.insert(
        "device",
        &DeviceView {
            hostname: &device.hostname,
            id: &device.id,
            ip: &device.ip,
            internet: device.internet_connectivity,
        },
    );
    ctx.insert("device_updated", &format_time(snapshot.device_updated));
    ctx.insert("ping_updated", &format_time(snapshot.ping_updated));
    ctx.insert("services", &services);
    ctx.insert("pings", &pings);

    tera.render("dashboard.html", &ctx)
}

fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn handle_get_device(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> impl IntoResponse {
    let info = if query.refresh {
        state.scheduler.refresh_device().await
    } else {
        state.scheduler.device().await
    };
    Json(info)
}

pub async fn handle_get_ping(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> impl IntoResponse {
    let result = if query.refresh {
        state.scheduler.refresh_ping().await
    } else {
        state.scheduler.ping_result().await
    };
    Json(result)
}

pub async fn handle_get_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.snapshot().await)
}

pub async fn handle_get_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.running_jobs().await)
}

// ============================================================================
// Plain endpoints
// ============================================================================

pub async fn handle_hostname(State(state): State<AppState>) -> impl IntoResponse {
    Json(hostname(state.scheduler.config()).await)
}

pub async fn handle_ip() -> impl IntoResponse {
    let ip = outbound_ip(ROUTE_PROBE_ADDRESS).map(|ip| ip.to_string()).unwrap_or_default();
    Json(ip)
}

pub async fn handle_network(State(state): State<AppState>) -> impl IntoResponse {
    Json(internet_connectivity(state.scheduler.config()).await)
}

pub async fn handle_health() -> impl IntoResponse {
    Json("healthy")
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <rect x="15" y="20" width="70" height="45" rx="6" fill="#4a90d9"/>
        <rect x="40" y="65" width="20" height="10" fill="#4a90d9"/>
        <rect x="28" y="75" width="44" height="6" rx="3" fill="#4a90d9"/>
        <path d="M25 45 L38 45 L45 32 L55 55 L62 45 L75 45" stroke="white" stroke-width="4" fill="none"/>
    </svg>"##;

    ([(axum::http::header::CONTENT_TYPE, "image/svg+xml")], svg)
}
