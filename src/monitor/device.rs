//! Identity and connectivity of the local device.

use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use tokio::process::Command;

use super::check_services;
use crate::config::ServerConfig;
use crate::models::DeviceInfo;
use crate::probe::probe_once;

const KERNEL_HOSTNAME: &str = "/proc/sys/kernel/hostname";
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(2);
/// Public address used only to pick the outbound route.
pub const ROUTE_PROBE_ADDRESS: &str = "8.8.8.8";

/// Resolve this device's hostname.
///
/// The configured override wins, then the kernel's hostname, then the
/// `hostname` command.
pub async fn hostname(config: &ServerConfig) -> String {
    if let Some(name) = &config.hostname {
        return name.clone();
    }

    if let Ok(name) = tokio::fs::read_to_string(KERNEL_HOSTNAME).await {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    match Command::new("hostname").output().await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => {
            tracing::warn!("hostname exited with {}", output.status);
            String::new()
        }
        Err(e) => {
            tracing::warn!("Failed to run hostname: {}", e);
            String::new()
        }
    }
}

/// Identifier reported for this device, defaulting to its hostname.
pub async fn device_id(config: &ServerConfig) -> String {
    match &config.system_id {
        Some(id) => id.clone(),
        None => hostname(config).await,
    }
}

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends no packets; it only selects a route.
pub fn outbound_ip(probe_address: &str) -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect((probe_address, 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Whether the configured connectivity probe gets through.
pub async fn internet_connectivity(config: &ServerConfig) -> bool {
    let address = &config.connectivity_address;
    match probe_once(config.connectivity_probe, address, CONNECTIVITY_TIMEOUT).await {
        Ok(elapsed) => {
            tracing::debug!(
                "Connectivity {} to {} answered in {:?}",
                config.connectivity_probe,
                address,
                elapsed
            );
            true
        }
        Err(e) => {
            tracing::warn!(
                "Connectivity {} to {} failed: {}",
                config.connectivity_probe,
                address,
                e
            );
            false
        }
    }
}

/// Gather the full `DeviceInfo` for this host.
pub async fn device_info(config: &ServerConfig, client: &reqwest::Client) -> DeviceInfo {
    let hostname = hostname(config).await;
    let id = config.system_id.clone().unwrap_or_else(|| hostname.clone());
    let ip = outbound_ip(ROUTE_PROBE_ADDRESS)
        .map(|ip| ip.to_string())
        .unwrap_or_default();

    let (internet_connectivity, status) = tokio::join!(
        internet_connectivity(config),
        check_services(client, &config.services)
    );

    DeviceInfo {
        hostname,
        id,
        internet_connectivity,
        ip,
        status,
    }
}

/// Split a system id such as `ITB-1101-CP1` into building and room.
pub fn split_system_id(id: &str) -> Option<(&str, &str)> {
    let mut parts = id.splitn(3, '-');
    let building = parts.next().filter(|s| !s.is_empty())?;
    let room = parts.next().filter(|s| !s.is_empty())?;
    Some((building, room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeKind;

    #[test]
    fn test_split_system_id() {
        assert_eq!(split_system_id("ITB-1101-CP1"), Some(("ITB", "1101")));
        assert_eq!(split_system_id("ITB-1101"), Some(("ITB", "1101")));
        assert_eq!(split_system_id("ITB"), None);
        assert_eq!(split_system_id("-1101-CP1"), None);
    }

    #[tokio::test]
    async fn test_hostname_override() {
        let cfg = ServerConfig {
            hostname: Some("ITB-1101-CP1".to_string()),
            ..Default::default()
        };
        assert_eq!(hostname(&cfg).await, "ITB-1101-CP1");
        assert_eq!(device_id(&cfg).await, "ITB-1101-CP1");
    }

    #[tokio::test]
    async fn test_system_id_wins_over_hostname() {
        let cfg = ServerConfig {
            hostname: Some("pi".to_string()),
            system_id: Some("ITB-1101-CP1".to_string()),
            ..Default::default()
        };
        assert_eq!(device_id(&cfg).await, "ITB-1101-CP1");
    }

    #[test]
    fn test_outbound_ip_loopback() {
        assert_eq!(outbound_ip("127.0.0.1"), Some("127.0.0.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_device_info_without_services() {
        let cfg = ServerConfig {
            hostname: Some("ITB-1101-CP1".to_string()),
            connectivity_probe: ProbeKind::Dns,
            // Nothing answers DNS here, so the probe fails fast
            connectivity_address: "127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let info = device_info(&cfg, &reqwest::Client::new()).await;
        assert_eq!(info.hostname, "ITB-1101-CP1");
        assert_eq!(info.id, "ITB-1101-CP1");
        assert!(!info.internet_connectivity);
        assert!(info.status.is_empty());
    }
}
