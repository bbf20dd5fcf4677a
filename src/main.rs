//! devmon - device monitoring service

use devmon::config::ServerConfig;
use devmon::monitor::split_system_id;
use devmon::scheduler::Scheduler;
use devmon::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("devmon=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    tracing::info!("Starting devmon on port {}...", cfg.http_port);
    if let Some((building, room)) = cfg.system_id.as_deref().and_then(split_system_id) {
        tracing::info!("Monitoring room {}-{}", building, room);
    }
    if cfg.targets.is_empty() {
        tracing::warn!("No ping targets configured");
    }

    // Start scheduler
    let scheduler = Arc::new(Scheduler::new(cfg)?);
    scheduler.start().await;

    // Start web server
    let server = Server::new(scheduler);
    server.start().await?;

    Ok(())
}
