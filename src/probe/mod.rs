//! Reachability probes.
//!
//! Ping probes feed both the per-device sweeps and the connectivity check;
//! HTTP and DNS probes are alternative connectivity checks.

mod dns;
mod http;
mod ping;

pub use dns::*;
pub use http::*;
pub use ping::*;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unknown probe kind: {0}")]
    UnknownKind(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// How the connectivity check reaches its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeKind {
    #[default]
    Ping,
    Http,
    Dns,
}

impl FromStr for ProbeKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(ProbeKind::Ping),
            "http" => Ok(ProbeKind::Http),
            "dns" => Ok(ProbeKind::Dns),
            other => Err(ProbeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Http => "http",
            ProbeKind::Dns => "dns",
        })
    }
}

/// Probe `address` once and return how long the answer took.
///
/// An answer slower than `timeout` counts as a timeout.
pub async fn probe_once(
    kind: ProbeKind,
    address: &str,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let elapsed = match kind {
        ProbeKind::Http => run_http_probe(address, timeout).await?,
        ProbeKind::Dns => run_dns_probe(address, timeout).await?,
        ProbeKind::Ping => run_ping_probe(address, timeout).await?,
    };

    if elapsed >= timeout {
        return Err(ProbeError::Timeout(timeout));
    }
    Ok(elapsed)
}
