use anyhow::Context;
use arcade_server::api;
use arcade_server::config::ServerConfig;
use arcade_server::game_loop::{run_game_loop, GameCommand};
use arcade_server::gateway::{LedgerGateway, OfflineGateway};
use arcade_server::ledger::Ledger;
use arcade_server::ws::{ws_handler, AppState};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();

    // Validate configuration before starting
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid server configuration: {e}"))?;

    let listen_addr = config.listen_addr.clone();
    let ledger = Ledger::shared(config.ledger);

    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(256);

    // Spawn game loop
    let loop_config = config.clone();
    let game_loop = if config.offline {
        tracing::info!("Offline mode: attempts are not consumed");
        let gateway = OfflineGateway::new(config.ledger.starting_attempts, config.ledger.points_per_coin);
        tokio::spawn(run_game_loop(game_rx, loop_config, gateway))
    } else {
        let gateway = LedgerGateway::new(ledger.clone());
        tokio::spawn(run_game_loop(game_rx, loop_config, gateway))
    };

    // Axum app
    let app_state = AppState {
        game_tx,
        config: Arc::new(config),
        ledger,
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .merge(api::router())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!("Starting arcade server on {}", listen_addr);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Open sockets still hold command senders; give them a moment to close
    // so the loop can drain pending commits
    match tokio::time::timeout(SHUTDOWN_GRACE, game_loop).await {
        Ok(joined) => joined.context("game loop panicked")?,
        Err(_) => tracing::warn!("Game loop did not stop within {:?}", SHUTDOWN_GRACE),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
