// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::host_bridge::HostBridge;
use crate::application::view_registry::ViewRegistry;
use crate::infrastructure::config::load_dashboard_config;
use crate::infrastructure::http_channel::HttpConnector;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_timeseries_options, health_check, host_events, list_views, mount_view, open_file_dialog,
    put_timeseries_options, reset_views, selected_directory, show_adcp_terminal, stream_view,
    terminal_command, terminal_rescan, terminal_selection, terminal_snapshot, unmount_view,
    view_snapshot,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_dashboard_config()?;
    let settings = config.registry_settings()?;

    // Channel connector (infrastructure layer)
    let connector = Arc::new(HttpConnector::new(config.backend.request_timeout()));

    // View registry and host bridge (application layer)
    let registry = Arc::new(ViewRegistry::new(connector, settings));
    for kind in config.autostart_views() {
        if let Err(e) = registry.mount(kind).await {
            tracing::warn!(view = %kind, error = %e, "could not mount view at startup");
        }
    }

    let (host_tx, host_rx) = mpsc::channel(16);
    let state = Arc::new(AppState {
        registry: registry.clone(),
        host: HostBridge::new(registry.clone(), host_tx),
        host_events: Arc::new(Mutex::new(host_rx)),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/views", get(list_views))
        .route("/views/reset", post(reset_views))
        .route(
            "/views/:kind",
            get(view_snapshot).post(mount_view).delete(unmount_view),
        )
        .route("/views/:kind/stream", get(stream_view))
        .route("/terminal", get(terminal_snapshot))
        .route("/terminal/commands", post(terminal_command))
        .route("/terminal/selection", put(terminal_selection))
        .route("/terminal/rescan", post(terminal_rescan))
        .route(
            "/timeseries/options",
            get(get_timeseries_options).put(put_timeseries_options),
        )
        .route("/host/events", get(host_events))
        .route("/host/open-file-dialog", post(open_file_dialog))
        .route("/host/selected-directory", post(selected_directory))
        .route("/host/show-adcp-terminal", post(show_adcp_terminal))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting adcp-dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    Ok(())
}

/// Waits for Ctrl-C, then unmounts every view so open snapshot streams end.
async fn shutdown_signal(registry: Arc<ViewRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    registry.shutdown().await;
}
