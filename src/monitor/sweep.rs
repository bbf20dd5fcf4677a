//! Ping sweeps across the configured peer devices.

use std::future::Future;
use std::time::Duration;

use crate::config::{PingSettings, PingTarget};
use crate::models::{DevicePingResult, PingResult};
use crate::probe::{ping_statistics, resolve_address};

/// Ping one device and describe the outcome.
pub async fn ping_device(target: &PingTarget, settings: &PingSettings) -> DevicePingResult {
    let mut result = DevicePingResult {
        device_id: target.id.clone(),
        address: target.address.clone(),
        packets_sent: settings.count,
        packet_loss: 100.0,
        average_round_trip: format_round_trip(None),
        ..Default::default()
    };

    match ping_statistics(&target.address, settings).await {
        Ok(stats) => {
            result.ip = stats.ip.to_string();
            result.packets_sent = stats.sent;
            result.packets_received = stats.received;
            result.packet_loss = stats.loss_percent();
            result.average_round_trip = format_round_trip(stats.average);
            if stats.received == 0 {
                result.error = "no response".to_string();
            }
        }
        Err(e) => {
            // Still report the address when only the echo itself failed
            if let Ok(ip) = resolve_address(&target.address).await {
                result.ip = ip.to_string();
            }
            result.error = e.to_string();
        }
    }

    if result.is_success() {
        tracing::debug!(
            "Ping {} ({}): {}/{} received, avg {}",
            result.device_id,
            result.address,
            result.packets_received,
            result.packets_sent,
            result.average_round_trip
        );
    } else {
        tracing::warn!(
            "Ping {} ({}) failed: {}",
            result.device_id,
            result.address,
            result.error
        );
    }

    result
}

/// Ping every target concurrently.
///
/// Each partition of the result keeps the configured target order.
pub async fn ping_sweep(targets: &[PingTarget], settings: &PingSettings) -> PingResult {
    let settings = *settings;
    sweep_with(targets, move |target| async move { ping_device(&target, &settings).await }).await
}

/// Run `ping` for every target on its own task and gather the outcomes.
///
/// A task that dies still yields an unsuccessful result carrying the reason.
async fn sweep_with<F, Fut>(targets: &[PingTarget], ping: F) -> PingResult
where
    F: Fn(PingTarget) -> Fut,
    Fut: Future<Output = DevicePingResult> + Send + 'static,
{
    let handles: Vec<_> = targets
        .iter()
        .map(|target| tokio::spawn(ping(target.clone())))
        .collect();

    let mut result = PingResult::default();
    for (target, handle) in targets.iter().zip(handles) {
        match handle.await {
            Ok(r) => result.push(r),
            Err(e) => {
                tracing::error!("Ping task for {} failed: {}", target.id, e);
                result.push(DevicePingResult {
                    device_id: target.id.clone(),
                    address: target.address.clone(),
                    error: format!("ping task failed: {}", e),
                    packet_loss: 100.0,
                    average_round_trip: format_round_trip(None),
                    ..Default::default()
                });
            }
        }
    }

    tracing::info!(
        "Ping sweep finished: {} successful, {} unsuccessful",
        result.successful.len(),
        result.unsuccessful.len()
    );
    result
}

/// Format a mean round trip the way the dashboard displays it ("1.234ms").
///
/// Precision is capped at microseconds; no reply at all renders as "0s".
pub fn format_round_trip(average: Option<Duration>) -> String {
    let Some(d) = average else {
        return "0s".to_string();
    };
    let micros = d.as_micros();
    if micros == 0 {
        return "0s".to_string();
    }
    let trimmed = |value: f64| {
        let s = format!("{:.3}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    if micros < 1_000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", trimmed(micros as f64 / 1_000.0))
    } else {
        format!("{}s", trimmed(micros as f64 / 1_000_000.0))
    }
}
