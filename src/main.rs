//! Pong Server - Authoritative two-player pong game server
//!
//! Clients connect over a single WebSocket, queue with `joinGame`, and are
//! paired two at a time. Each room then runs its own countdown and 60 Hz
//! simulation task; the server only ever trusts its own ball position.

mod app;
mod config;
mod game;
mod http;
mod matchmaking;
mod util;
mod ws;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::{init_server_time, uptime_secs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the variables directly
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!(
        addr = %config.server_addr,
        client_origin = %config.client_origin,
        join_rate_limit = config.join_rate_limit,
        "Starting Pong Server"
    );

    let state = AppState::new(config.clone());
    let listener = TcpListener::bind(config.server_addr).await?;
    info!(
        "Listening on {0} (health: http://{0}/health, socket: ws://{0}/ws)",
        config.server_addr
    );

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        uptime_secs = uptime_secs(),
        open_rooms = state.room_registry.active_rooms(),
        "Server stopped"
    );
    Ok(())
}

/// Console logging filtered by `RUST_LOG`, else by `LOG_LEVEL`
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "sigterm",
    };
    info!(signal, "Shutting down, draining connections");
}
