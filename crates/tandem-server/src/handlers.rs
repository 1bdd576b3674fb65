//! Connection handlers for Tandem server.
//!
//! This module wires the HTTP router, the WebSocket transport and the
//! pairing engine together.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tandem_core::{EngineOutcome, EngineStats, PairingEngine};
use tandem_transport::websocket::{pump, WebSocketConfig};
use tandem_transport::TransportEvent;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The pairing engine.
    pub engine: PairingEngine,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            engine: PairingEngine::with_config(config.engine_config()),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Tandem server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O failure.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Build the router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Matchmaking statistics handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.engine.stats().connections >= state.config.limits.max_connections {
        warn!(remote = %addr, "Connection limit reached, refusing upgrade");
        metrics::record_refused();
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    // axum keeps its own, much larger frame cap; `pump` drops messages over
    // `limits.max_message_size` without closing the socket.
    ws.on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let ws_config = WebSocketConfig {
        max_message_size: state.config.limits.max_message_size,
    };

    let id = pump(socket, Some(addr), ws_config, |event| {
        let bytes = match &event {
            TransportEvent::Received(_, payload) => payload.len(),
            TransportEvent::Errored(..) => {
                metrics::record_error("websocket");
                0
            }
            _ => 0,
        };

        let outcome = state.engine.handle(event);
        metrics::record_outcome(&outcome, bytes);

        if !matches!(outcome, EngineOutcome::Relay(_)) {
            metrics::set_engine_stats(state.engine.stats());
        }
    })
    .await;

    debug!(connection = %id, "Connection handler finished");
}
