//! Ping probe implementation with native ICMP (high-precision) and command fallback.
//!
//! Uses blocking sockets in spawn_blocking for sub-millisecond timing precision.

use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;
use crate::config::PingSettings;

/// ICMP capability state
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    /// Native ICMP sockets are available
    Native,
    /// Only command fallback is available
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

/// Ping sequence counter for unique identification
static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Aggregate statistics for a multi-echo ping of one address.
#[derive(Debug, Clone, PartialEq)]
pub struct PingStats {
    pub ip: IpAddr,
    pub sent: u32,
    pub received: u32,
    /// Mean round trip of the echoes that came back.
    pub average: Option<Duration>,
}

impl PingStats {
    /// Percentage of echoes lost, 0 to 100.
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        f64::from(self.sent - self.received.min(self.sent)) * 100.0 / f64::from(self.sent)
    }
}

/// Generate a unique identifier for each ping request.
/// This ensures concurrent pings can be distinguished even to the same destination.
fn generate_ping_id() -> (u16, u16) {
    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (identifier, sequence)
}

/// Detect ICMP capability by attempting to create a socket.
fn detect_icmp_capability() -> IcmpCapability {
    // RAW requires CAP_NET_RAW or root
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (RAW socket, privileged)");
        return IcmpCapability::Native;
    }

    // DGRAM is unprivileged on Linux with ping_group_range set, or macOS
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (DGRAM socket, unprivileged)");
        return IcmpCapability::Native;
    }

    tracing::info!("Ping probe: native ICMP unavailable, using command fallback");
    IcmpCapability::CommandOnly
}

fn native_icmp_available() -> bool {
    *ICMP_CAPABILITY.get_or_init(detect_icmp_capability) == IcmpCapability::Native
}

/// Run a single-echo ping probe against the given address and return the round trip.
pub async fn run_ping_probe(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    if native_icmp_available() {
        let ip = resolve_address(address).await?;
        match native_echo(ip, timeout).await {
            Err(e) if is_permission_error(&e) => {
                tracing::warn!(
                    "Native ping failed with permission error for {}, falling back to command: {}",
                    address,
                    e
                );
            }
            other => return other,
        }
    }

    run_ping_command(address, timeout).await
}

/// Send `settings.count` echoes spaced `settings.interval` apart and collect statistics.
///
/// Individual echo timeouts count as lost packets; any other failure aborts the run.
pub async fn ping_statistics(
    address: &str,
    settings: &PingSettings,
) -> Result<PingStats, ProbeError> {
    let ip = resolve_address(address).await?;

    if native_icmp_available() {
        match native_statistics(ip, settings).await {
            Err(e) if is_permission_error(&e) => {
                tracing::warn!(
                    "Native ping failed with permission error for {}, falling back to command: {}",
                    address,
                    e
                );
            }
            other => return other,
        }
    }

    let output = ping_command_output(&ip.to_string(), settings).await?;
    let (sent, received, average) = parse_ping_summary(&output)?;
    Ok(PingStats { ip, sent, received, average })
}

async fn native_statistics(ip: IpAddr, settings: &PingSettings) -> Result<PingStats, ProbeError> {
    let mut received = 0u32;
    let mut total = Duration::ZERO;

    for i in 0..settings.count {
        if i > 0 {
            tokio::time::sleep(settings.interval).await;
        }
        match native_echo(ip, settings.timeout).await {
            Ok(rtt) => {
                received += 1;
                total += rtt;
            }
            Err(ProbeError::Timeout(_)) => {
                tracing::debug!("Echo {} to {} timed out", i, ip);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(PingStats {
        ip,
        sent: settings.count,
        received,
        average: (received > 0).then(|| total / received),
    })
}

fn is_permission_error(e: &ProbeError) -> bool {
    let error_str = e.to_string();
    error_str.contains("Permission")
        || error_str.contains("Operation not permitted")
        || error_str.contains("denied")
}

/// Resolve hostname to IP address.
pub async fn resolve_address(address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    let mut addrs = tokio::net::lookup_host(format!("{}:0", address))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?;

    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", address)))
}

/// Run one blocking echo in a dedicated thread for precise timing.
async fn native_echo(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    tokio::task::spawn_blocking(move || run_blocking_ping(ip, timeout))
        .await
        .map_err(|e| ProbeError::Network(format!("spawn_blocking failed: {}", e)))?
}

fn map_io(context: &str, e: std::io::Error) -> ProbeError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ProbeError::Network(format!("Permission denied: {}", e))
    } else {
        ProbeError::Network(format!("{}: {}", context, e))
    }
}

/// Send one ICMP Echo Request and wait for the matching reply.
fn run_blocking_ping(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    // RAW first (privileged), then DGRAM (unprivileged)
    let socket = Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
        .map_err(|e| map_io("Failed to create ICMP socket", e))?;

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| map_io("Failed to set timeout", e))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| map_io("Failed to set timeout", e))?;

    let dest = SocketAddr::new(ip, 0);
    socket
        .connect(&dest.into())
        .map_err(|e| map_io("Failed to connect", e))?;

    let (identifier, sequence) = generate_ping_id();
    let packet = match ip {
        IpAddr::V4(_) => build_icmp_echo_request(identifier, sequence),
        IpAddr::V6(_) => build_icmpv6_echo_request(identifier, sequence),
    };

    let start = Instant::now();
    socket.send(&packet).map_err(|e| map_io("Failed to send", e))?;

    // Loop until we get OUR reply or time out
    let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
    loop {
        let len = socket.recv(&mut buf).map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) {
                ProbeError::Timeout(timeout)
            } else {
                map_io("Failed to receive", e)
            }
        })?;
        let elapsed = start.elapsed();

        // SAFETY: recv initialized the first `len` bytes
        let data: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        if elapsed >= timeout {
            return Err(ProbeError::Timeout(timeout));
        }

        if is_matching_reply(ip, data, identifier, sequence) {
            return Ok(elapsed);
        }
    }
}

/// Check whether a received datagram is the echo reply for our request.
///
/// RAW IPv4 sockets deliver the IP header in front of the ICMP message;
/// DGRAM and ICMPv6 sockets deliver the ICMP message alone.
fn is_matching_reply(ip: IpAddr, data: &[u8], identifier: u16, sequence: u16) -> bool {
    let (offset, reply_type) = match ip {
        IpAddr::V4(_) => {
            let offset = match data.first() {
                Some(b) if b >> 4 == 4 => usize::from(b & 0x0F) * 4,
                _ => 0,
            };
            (offset, ICMP_ECHO_REPLY)
        }
        IpAddr::V6(_) => (0, ICMPV6_ECHO_REPLY),
    };

    let Some(icmp) = data.get(offset..offset + 8) else {
        return false;
    };
    icmp[0] == reply_type
        && u16::from_be_bytes([icmp[4], icmp[5]]) == identifier
        && u16::from_be_bytes([icmp[6], icmp[7]]) == sequence
}

fn echo_request(kind: u8, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64]; // 8 byte header + 56 byte payload

    packet[0] = kind;
    packet[1] = 0; // Code
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    packet
}

/// Build an ICMP Echo Request packet (type 8, code 0).
fn build_icmp_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = echo_request(ICMP_ECHO_REQUEST, identifier, sequence);
    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

/// Build an ICMPv6 Echo Request packet (type 128, code 0).
///
/// The kernel fills in the ICMPv6 checksum.
fn build_icmpv6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    echo_request(ICMPV6_ECHO_REQUEST, identifier, sequence)
}

/// Compute ICMP checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Run a single-echo ping via the system command (fallback).
async fn run_ping_command(address: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let settings = PingSettings {
        count: 1,
        interval: Duration::from_secs(1),
        timeout,
    };
    let stdout = ping_command_output(address, &settings).await?;
    parse_ping_output(&stdout)
}

/// Run the system `ping` and return its stdout.
///
/// A run where every packet was lost exits non-zero; its output is still
/// returned so the summary line can be parsed.
async fn ping_command_output(address: &str, settings: &PingSettings) -> Result<String, ProbeError> {
    let timeout_secs = settings.timeout.as_secs().max(1);
    let interval_secs = format!("{:.1}", settings.interval.as_secs_f64().max(0.2));

    let output = Command::new("ping")
        .args([
            "-c",
            &settings.count.to_string(),
            "-i",
            &interval_secs,
            "-W",
            &timeout_secs.to_string(),
            address,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stdout.contains("packet loss") {
            if settings.count == 1 {
                return Err(ProbeError::Timeout(settings.timeout));
            }
            return Ok(stdout);
        }
        if stderr.contains("timeout") {
            return Err(ProbeError::Timeout(settings.timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}{}", stdout, stderr)));
    }

    Ok(stdout)
}

fn summary_regexes() -> &'static (Regex, Regex) {
    static RE: OnceLock<(Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r"(?P<sent>\d+) packets transmitted, (?P<recv>\d+) (?:packets )?received")
                .expect("valid regex"),
            Regex::new(r"(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)")
                .expect("valid regex"),
        )
    })
}

fn millis(ms: f64) -> Duration {
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}

/// Parse ping command output for the round trip of a single echo.
fn parse_ping_output(output: &str) -> Result<Duration, ProbeError> {
    // Per-packet response "time=X.XXX ms" (Linux, some macOS)
    static PER_PACKET: OnceLock<Regex> = OnceLock::new();
    let per_packet = PER_PACKET
        .get_or_init(|| Regex::new(r"time[=<](?P<val>[0-9.]+)\s*ms").expect("valid regex"));

    if let Some(ms) = per_packet
        .captures(output)
        .and_then(|caps| caps.name("val"))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return Ok(millis(ms));
    }

    // Summary line "rtt min/avg/max/mdev" (Linux) or "round-trip min/avg/max/stddev" (macOS)
    let (_, rtt) = summary_regexes();
    if let Some(ms) = rtt
        .captures(output)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return Ok(millis(ms));
    }

    Err(ProbeError::Command(format!(
        "failed to parse ping output: {}",
        output
    )))
}

/// Parse the transmission summary of a multi-echo ping run.
fn parse_ping_summary(output: &str) -> Result<(u32, u32, Option<Duration>), ProbeError> {
    let (counts, rtt) = summary_regexes();

    let caps = counts.captures(output).ok_or_else(|| {
        ProbeError::Command(format!("failed to parse ping summary: {}", output))
    })?;
    let sent: u32 = caps["sent"].parse().unwrap_or(0);
    let received: u32 = caps["recv"].parse().unwrap_or(0);

    let average = rtt
        .captures(output)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(millis);

    Ok((sent, received, average))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_icmp_checksum() {
        let mut packet = vec![0u8; 8];
        packet[0] = 8;
        packet[4] = 0x12;
        packet[5] = 0x34;
        packet[7] = 0x01;

        let checksum = icmp_checksum(&packet);
        assert_eq!(checksum, !(0x0800u16 + 0x1234 + 0x0001));

        // A packet with its checksum filled in sums to zero
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(icmp_checksum(&packet), 0);
    }

    #[test]
    fn test_icmp_checksum_odd_length() {
        assert_eq!(icmp_checksum(&[0x01]), !0x0100u16);
    }

    #[test]
    fn test_build_icmp_packet() {
        let packet = build_icmp_echo_request(0x1234, 0x0001);
        assert_eq!(packet.len(), 64);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(packet[4..6], [0x12, 0x34]);
        assert_eq!(packet[6..8], [0x00, 0x01]);
        assert_eq!(icmp_checksum(&packet), 0);
    }

    #[test]
    fn test_build_icmpv6_packet() {
        let packet = build_icmpv6_echo_request(0xBEEF, 7);
        assert_eq!(packet[0], 128);
        assert_eq!(packet[2..4], [0, 0]);
        assert_eq!(packet[4..6], [0xBE, 0xEF]);
    }

    #[test]
    fn test_matching_reply_with_ip_header() {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut data = vec![0u8; 28];
        data[0] = 0x45; // IPv4, 20 byte header
        data[20] = ICMP_ECHO_REPLY;
        data[24..26].copy_from_slice(&0x1234u16.to_be_bytes());
        data[26..28].copy_from_slice(&9u16.to_be_bytes());

        assert!(is_matching_reply(v4, &data, 0x1234, 9));
        assert!(!is_matching_reply(v4, &data, 0x1234, 10));
        assert!(!is_matching_reply(v4, &data[..24], 0x1234, 9));
    }

    #[test]
    fn test_matching_reply_dgram() {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut data = vec![0u8; 8];
        data[4..6].copy_from_slice(&0x0102u16.to_be_bytes());
        data[6..8].copy_from_slice(&3u16.to_be_bytes());
        assert!(is_matching_reply(v4, &data, 0x0102, 3));

        data[0] = ICMP_ECHO_REQUEST;
        assert!(!is_matching_reply(v4, &data, 0x0102, 3));
    }

    #[test]
    fn test_loss_percent() {
        let stats = PingStats {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            sent: 4,
            received: 3,
            average: None,
        };
        assert_eq!(stats.loss_percent(), 25.0);

        let none_sent = PingStats { sent: 0, received: 0, ..stats.clone() };
        assert_eq!(none_sent.loss_percent(), 0.0);

        let all_lost = PingStats { received: 0, ..stats };
        assert_eq!(all_lost.loss_percent(), 100.0);
    }

    #[test]
    fn test_parse_ping_output_linux() {
        let output = "64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.345 ms";
        let latency = parse_ping_output(output).unwrap();
        assert_eq!(latency, Duration::from_micros(12_345));
    }

    #[test]
    fn test_parse_ping_output_macos_summary() {
        let output = r#"PING google.com (142.250.69.174): 56 data bytes

--- google.com ping statistics ---
1 packets transmitted, 1 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 17.906/17.906/17.906/0.000 ms"#;
        let latency = parse_ping_output(output).unwrap();
        assert_eq!(latency, Duration::from_micros(17_906));
    }

    #[test]
    fn test_parse_ping_summary_linux() {
        let output = r#"PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.
64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=1.10 ms
64 bytes from 10.0.0.1: icmp_seq=3 ttl=64 time=1.30 ms

--- 10.0.0.1 ping statistics ---
4 packets transmitted, 2 received, 50% packet loss, time 3004ms
rtt min/avg/max/mdev = 1.100/1.200/1.300/0.100 ms"#;
        let (sent, received, average) = parse_ping_summary(output).unwrap();
        assert_eq!(sent, 4);
        assert_eq!(received, 2);
        assert_eq!(average, Some(Duration::from_micros(1200)));
    }

    #[test]
    fn test_parse_ping_summary_all_lost() {
        let output = r#"--- 10.0.0.9 ping statistics ---
4 packets transmitted, 0 received, 100% packet loss, time 3060ms"#;
        let (sent, received, average) = parse_ping_summary(output).unwrap();
        assert_eq!((sent, received, average), (4, 0, None));
    }

    #[test]
    fn test_parse_ping_summary_garbage() {
        assert!(parse_ping_summary("ping: unknown host").is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let ip = resolve_address("10.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }
}
