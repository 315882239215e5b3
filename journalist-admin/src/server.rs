//! HTTP server for the admin interface.

use crate::admin::{AdminState, admin_router};
use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Interval between expired-session sweeps.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the full application: admin routes, static files and request tracing.
pub fn app(state: Arc<AdminState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    admin_router(state)
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
}

/// Periodically delete expired admin sessions.
pub fn spawn_session_cleanup(state: Arc<AdminState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);

        loop {
            ticker.tick().await;
            match state.sessions.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => debug!("Removed {} expired admin sessions", removed),
                Err(e) => warn!("Failed to clean up expired sessions: {:#}", e),
            }
        }
    });
}

/// Serve the admin interface until Ctrl-C.
pub async fn run_server(listen_addr: SocketAddr, state: Arc<AdminState>) -> Result<()> {
    std::fs::create_dir_all(&state.static_dir).with_context(|| {
        format!(
            "Failed to create static directory: {}",
            state.static_dir.display()
        )
    })?;

    spawn_session_cleanup(state.clone());

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;

    info!(addr = %listen_addr, "Admin interface listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Admin interface stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
