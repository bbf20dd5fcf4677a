//! Web server module.

mod handlers;

pub use handlers::*;

use crate::scheduler::Scheduler;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// Web server for devmon.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server around a scheduler.
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            state: AppState { scheduler },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        let mut router = Router::new()
            // Dashboard
            .route("/", get(handlers::handle_dashboard))
            // API endpoints
            .route("/api/device", get(handlers::handle_get_device))
            .route("/api/ping", get(handlers::handle_get_ping))
            .route("/api/snapshot", get(handlers::handle_get_snapshot))
            .route("/api/jobs", get(handlers::handle_get_jobs))
            // Plain endpoints
            .route("/hostname", get(handlers::handle_hostname))
            .route("/ip", get(handlers::handle_ip))
            .route("/network", get(handlers::handle_network))
            .route("/health", get(handlers::handle_health))
            // Static assets
            .route("/favicon.ico", get(handlers::handle_favicon));

        if let Some(dir) = &self.state.scheduler.config().dash_dir {
            tracing::info!("Serving dashboard assets from {}", dir.display());
            router = router.nest_service("/dash", ServeDir::new(dir));
        }

        router
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until Ctrl-C, then stop the scheduled jobs.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.scheduler.config().http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Shutting down");
        self.state.scheduler.stop_all().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
