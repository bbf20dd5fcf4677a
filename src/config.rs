//! Configuration module for devmon.
//!
//! Scalar settings come from environment variables with sensible defaults.
//! Lists (ping targets, services, jobs) come from an optional JSON file named
//! by `DEVMON_CONFIG`.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::probe::ProbeKind;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Jobs the scheduler knows how to run.
pub const KNOWN_JOBS: &[&str] = &["ping", "device-info"];

/// A peer device pinged during each sweep.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PingTarget {
    pub id: String,
    pub address: String,
}

/// A local service whose health is reported in `DeviceInfo.status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub bin: String,
    pub port: u16,
    #[serde(default = "default_service_host")]
    pub host: String,
}

fn default_service_host() -> String {
    "localhost".to_string()
}

/// Echo settings for one device ping.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PingSettings {
    pub count: u32,
    #[serde(with = "duration_str")]
    pub interval: Duration,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
        }
    }
}

/// A scheduled job and how often it runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(with = "duration_str")]
    pub every: Duration,
}

fn default_enabled() -> bool {
    true
}

/// Contents of the JSON configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub targets: Vec<PingTarget>,
    pub services: Vec<ServiceConfig>,
    pub ping: PingSettings,
    pub jobs: Option<Vec<JobConfig>>,
}

impl FileConfig {
    /// Read and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: FileConfig = serde_json::from_str(&text)?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ping.count == 0 {
            return Err(ConfigError::Invalid("ping count must be at least 1".into()));
        }
        if self.ping.timeout.is_zero() {
            return Err(ConfigError::Invalid("ping timeout must be positive".into()));
        }
        for job in self.jobs.iter().flatten() {
            if !KNOWN_JOBS.contains(&job.name.as_str()) {
                return Err(ConfigError::Invalid(format!("job {} doesn't exist", job.name)));
            }
            if job.every.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "job {} must have a positive interval",
                    job.name
                )));
            }
        }
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 10000)
    pub http_port: u16,
    /// Directory served under `/dash`
    pub dash_dir: Option<PathBuf>,
    /// Hostname override
    pub hostname: Option<String>,
    /// Device identifier (default: the hostname)
    pub system_id: Option<String>,
    /// Address probed for internet connectivity (default: "8.8.8.8")
    pub connectivity_address: String,
    /// Probe used for the connectivity check (default: ping)
    pub connectivity_probe: ProbeKind,
    pub targets: Vec<PingTarget>,
    pub services: Vec<ServiceConfig>,
    pub ping: PingSettings,
    pub jobs: Vec<JobConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 10000,
            dash_dir: None,
            hostname: None,
            system_id: None,
            connectivity_address: "8.8.8.8".to_string(),
            connectivity_probe: ProbeKind::Ping,
            targets: Vec::new(),
            services: Vec::new(),
            ping: PingSettings::default(),
            jobs: default_jobs(),
        }
    }
}

/// Jobs run when the configuration file names none.
pub fn default_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig {
            name: "ping".to_string(),
            enabled: true,
            every: Duration::from_secs(60),
        },
        JobConfig {
            name: "device-info".to_string(),
            enabled: true,
            every: Duration::from_secs(30),
        },
    ]
}

impl ServerConfig {
    /// Load configuration from environment variables and the optional file.
    ///
    /// Environment variables:
    /// - `DEVMON_HTTP_PORT`: HTTP port (default: 10000)
    /// - `DEVMON_CONFIG`: JSON file with targets, services, ping settings and jobs
    /// - `DEVMON_DASH_DIR`: static dashboard directory
    /// - `DEVMON_HOSTNAME` / `DEVELOPMENT_HOSTNAME`: hostname override
    /// - `SYSTEM_ID`: device identifier
    /// - `DEVMON_CONNECTIVITY_ADDRESS`: connectivity probe address (default: "8.8.8.8")
    /// - `DEVMON_CONNECTIVITY_PROBE`: "ping", "http" or "dns" (default: "ping")
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("DEVMON_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            } else {
                tracing::warn!("Ignoring invalid DEVMON_HTTP_PORT {:?}", port_str);
            }
        }

        cfg.dash_dir = non_empty_var("DEVMON_DASH_DIR").map(PathBuf::from);
        cfg.hostname =
            non_empty_var("DEVMON_HOSTNAME").or_else(|| non_empty_var("DEVELOPMENT_HOSTNAME"));
        cfg.system_id = non_empty_var("SYSTEM_ID");

        if let Some(addr) = non_empty_var("DEVMON_CONNECTIVITY_ADDRESS") {
            cfg.connectivity_address = addr;
        }
        if let Some(probe) = non_empty_var("DEVMON_CONNECTIVITY_PROBE") {
            cfg.connectivity_probe = parse_probe_kind(&probe)?;
        }

        if let Some(path) = non_empty_var("DEVMON_CONFIG") {
            tracing::info!("Parsing configuration from {}", path);
            cfg.apply_file(FileConfig::from_path(Path::new(&path))?);
        }

        Ok(cfg)
    }

    /// Merge list settings from a configuration file.
    pub fn apply_file(&mut self, file: FileConfig) {
        self.targets = file.targets;
        self.services = file.services;
        self.ping = file.ping;
        if let Some(jobs) = file.jobs {
            self.jobs = jobs;
        }
    }

    /// Enabled jobs only.
    pub fn enabled_jobs(&self) -> impl Iterator<Item = &JobConfig> {
        self.jobs.iter().filter(|j| {
            if !j.enabled {
                tracing::debug!("Skipping {}, because it's disabled.", j.name);
            }
            j.enabled
        })
    }
}

fn parse_probe_kind(value: &str) -> Result<ProbeKind, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("DEVMON_CONNECTIVITY_PROBE: {}", e)))
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Durations written as humantime strings ("1s", "5m", "250ms").
mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 10000);
        assert_eq!(cfg.connectivity_address, "8.8.8.8");
        assert_eq!(cfg.connectivity_probe, ProbeKind::Ping);
        assert_eq!(cfg.ping, PingSettings::default());
        assert_eq!(cfg.ping.count, 4);
        let names: Vec<_> = cfg.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["ping", "device-info"]);
    }

    #[test]
    fn test_parse_file() {
        let file = write_config(
            r#"{
                "targets": [{"id": "ITB-1101-D1", "address": "10.5.34.20"}],
                "services": [{"name": "av-api", "bin": "/usr/bin/av-api", "port": 8000}],
                "ping": {"count": 2, "interval": "500ms", "timeout": "1s"},
                "jobs": [
                    {"name": "ping", "every": "5m"},
                    {"name": "device-info", "enabled": false, "every": "30s"}
                ]
            }"#,
        );
        let parsed = tokio_test::assert_ok!(FileConfig::from_path(file.path()));
        assert_eq!(parsed.targets[0].id, "ITB-1101-D1");
        assert_eq!(parsed.services[0].host, "localhost");
        assert_eq!(parsed.ping.count, 2);
        assert_eq!(parsed.ping.interval, Duration::from_millis(500));

        let mut cfg = ServerConfig::default();
        cfg.apply_file(parsed);
        let enabled: Vec<_> = cfg.enabled_jobs().map(|j| j.name.clone()).collect();
        assert_eq!(enabled, ["ping"]);
        assert_eq!(cfg.jobs[0].every, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_ping_settings_use_defaults() {
        let file = write_config(r#"{"ping": {"count": 1}}"#);
        let parsed = FileConfig::from_path(file.path()).unwrap();
        assert_eq!(parsed.ping.count, 1);
        assert_eq!(parsed.ping.timeout, Duration::from_secs(2));
        assert!(parsed.jobs.is_none());
    }

    #[test]
    fn test_unknown_job_rejected() {
        let file = write_config(r#"{"jobs": [{"name": "reboot", "every": "1h"}]}"#);
        let err = FileConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let file = write_config(r#"{"ping": {"interval": "soon"}}"#);
        assert!(matches!(
            FileConfig::from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_probe_kind() {
        assert_eq!(parse_probe_kind("http").unwrap(), ProbeKind::Http);
        let err = parse_probe_kind("carrier-pigeon").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(
            err.to_string(),
            "invalid configuration: DEVMON_CONNECTIVITY_PROBE: unknown probe kind: carrier-pigeon"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = FileConfig::from_path(Path::new("/nonexistent/devmon.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
