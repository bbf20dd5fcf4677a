//! Scheduler module for running monitoring jobs and keeping the latest records.

use crate::config::{JobConfig, ServerConfig};
use crate::models::{DeviceInfo, PingResult};
use crate::monitor::{device_info, ping_sweep};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Timeout for each service health request.
const SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Most recent records and when they were produced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub device: Option<DeviceInfo>,
    pub ping: Option<PingResult>,
    pub device_updated: Option<DateTime<Utc>>,
    pub ping_updated: Option<DateTime<Utc>>,
}

/// Stop handle of one running job.
///
/// The generation tells a re-added job apart from the task it replaced.
struct RunningJob {
    generation: u64,
    stop_tx: broadcast::Sender<()>,
}

/// Runs the configured jobs and owns the shared snapshot.
pub struct Scheduler {
    config: ServerConfig,
    client: reqwest::Client,
    snapshot: Arc<RwLock<Snapshot>>,
    stop_chans: Arc<RwLock<HashMap<String, RunningJob>>>,
    next_generation: AtomicU64,
}

impl Scheduler {
    /// Create a new scheduler for the given configuration.
    pub fn new(config: ServerConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SERVICE_TIMEOUT).build()?;
        Ok(Self {
            config,
            client,
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            stop_chans: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start every enabled job.
    pub async fn start(self: &Arc<Self>) {
        let jobs: Vec<JobConfig> = self.config.enabled_jobs().cloned().collect();
        tracing::info!(
            "Starting scheduler with {} jobs, {} ping targets, {} services",
            jobs.len(),
            self.config.targets.len(),
            self.config.services.len()
        );

        for job in jobs {
            self.add_job(job).await;
        }
    }

    /// Start running a job on its interval.
    pub async fn add_job(self: &Arc<Self>, job: JobConfig) {
        let mut stop_chans = self.stop_chans.write().await;

        if stop_chans.contains_key(&job.name) {
            return; // Already running
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        stop_chans.insert(job.name.clone(), RunningJob { generation, stop_tx });
        drop(stop_chans);

        tracing::info!("Scheduler: running {} every {:?}", job.name, job.every);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let name = job.name.clone();
            scheduler.run_job_loop(job, stop_rx).await;

            // A newer job under the same name owns the entry now
            let mut chans = scheduler.stop_chans.write().await;
            if chans.get(&name).is_some_and(|j| j.generation == generation) {
                chans.remove(&name);
            }
        });
    }

    /// Stop a running job.
    pub async fn remove_job(&self, name: &str) {
        let mut stop_chans = self.stop_chans.write().await;

        if let Some(job) = stop_chans.remove(name) {
            let _ = job.stop_tx.send(());
            tracing::info!("Scheduler: stopped {}", name);
        }
    }

    /// Stop every running job.
    pub async fn stop_all(&self) {
        for name in self.running_jobs().await {
            self.remove_job(&name).await;
        }
    }

    /// Names of the jobs currently running.
    pub async fn running_jobs(&self) -> Vec<String> {
        let mut names: Vec<_> = self.stop_chans.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn run_job_loop(&self, job: JobConfig, mut stop_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(job.every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = interval.tick() => self.run_job(&job.name).await,
            }
        }
    }

    async fn run_job(&self, name: &str) {
        tracing::debug!("[{}] Running job...", name);
        match name {
            "ping" => {
                self.refresh_ping().await;
            }
            "device-info" => {
                self.refresh_device().await;
            }
            other => tracing::warn!("unknown job {}", other),
        }
        tracing::debug!("[{}] Finished.", name);
    }

    /// Sweep the ping targets now and store the result.
    pub async fn refresh_ping(&self) -> PingResult {
        let result = ping_sweep(&self.config.targets, &self.config.ping).await;
        let mut snapshot = self.snapshot.write().await;
        snapshot.ping = Some(result.clone());
        snapshot.ping_updated = Some(Utc::now());
        result
    }

    /// Gather device information now and store it.
    pub async fn refresh_device(&self) -> DeviceInfo {
        let info = device_info(&self.config, &self.client).await;
        let mut snapshot = self.snapshot.write().await;
        snapshot.device = Some(info.clone());
        snapshot.device_updated = Some(Utc::now());
        info
    }

    /// Latest ping result, sweeping first if none exists yet.
    pub async fn ping_result(&self) -> PingResult {
        if let Some(result) = self.snapshot.read().await.ping.clone() {
            return result;
        }
        self.refresh_ping().await
    }

    /// Latest device information, gathering it first if none exists yet.
    pub async fn device(&self) -> DeviceInfo {
        if let Some(info) = self.snapshot.read().await.device.clone() {
            return info;
        }
        self.refresh_device().await
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }
}
