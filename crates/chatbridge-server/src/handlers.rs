//! Connection handlers for the chatbridge server.
//!
//! Each WebSocket connection is one host. Requests are dispatched to the
//! shared bridge; every bridge notification is forwarded to every host.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use chatbridge_core::{Bridge, NotificationStream};
use chatbridge_protocol::{codec, Command, Frame};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

type WsSender = SplitSink<WebSocket, Message>;

/// Shared server state.
pub struct AppState {
    /// The bridge every host talks to.
    pub bridge: Bridge,
    /// Server configuration.
    pub config: Config,
    next_connection: AtomicU64,
}

impl AppState {
    /// Create app state around an existing bridge.
    #[must_use]
    pub fn new(bridge: Bridge, config: Config) -> Self {
        Self {
            bridge,
            config,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Create app state with the in-memory backend described by `config`.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        let backend = config.build_backend();
        let bridge = Bridge::with_config(Arc::new(backend), config.bridge.clone());
        Self::new(bridge, config)
    }

    fn next_connection_id(&self) -> String {
        format!("conn_{}", self.next_connection.fetch_add(1, Ordering::Relaxed))
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::from_config(config));
    let ws_path = state.config.transport.websocket_path.clone();
    let listener = TcpListener::bind(addr).await?;

    info!("chatbridge server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, app(Arc::clone(&state))).await?;

    state.bridge.shutdown().await;
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.bridge.registry().stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "initialized": state.bridge.is_initialized().await,
        "channels": stats.channel_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle one host connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = state.next_connection_id();

    debug!(connection = %connection_id, "Host connected");

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before anything else so no notification is missed.
    let mut notifications: NotificationStream = state.bridge.subscribe();

    let connected = Frame::connected(&connection_id, state.config.heartbeat.interval_ms);
    if send_frame(&mut sender, &connected).await.is_err() {
        error!(connection = %connection_id, "Failed to send Connected frame");
        return;
    }

    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            notification = notifications.recv() => {
                match notification {
                    Ok(notification) => {
                        metrics::record_notification(notification.event_name());
                        if send_frame(&mut sender, &Frame::notification(notification)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection = %connection_id, skipped, "Host fell behind on notifications");
                        metrics::record_error("lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);
                        if process_buffer(&mut read_buffer, &connection_id, &state, &mut sender).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        read_buffer.extend_from_slice(text.as_bytes());
                        if process_buffer(&mut read_buffer, &connection_id, &state, &mut sender).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    debug!(connection = %connection_id, "Host disconnected");
}

/// Decode and handle every complete frame in `buffer`.
async fn process_buffer(
    buffer: &mut BytesMut,
    connection_id: &str,
    state: &AppState,
    sender: &mut WsSender,
) -> Result<()> {
    loop {
        match codec::decode_from(buffer) {
            Ok(Some(frame)) => handle_frame(frame, connection_id, state, sender).await?,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Undecodable frame");
                metrics::record_error("protocol");
                buffer.clear();
                return send_frame(sender, &Frame::error(0, "protocol_error", e.to_string())).await;
            }
        }
    }
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: Frame,
    connection_id: &str,
    state: &AppState,
    sender: &mut WsSender,
) -> Result<()> {
    match frame {
        Frame::Request { id, command } => {
            let response = dispatch(id, command, connection_id, state).await;
            send_frame(sender, &response).await?;
        }

        Frame::Ping { timestamp } => {
            send_frame(sender, &Frame::pong(timestamp)).await?;
        }

        Frame::Pong { .. } => {}

        other => {
            warn!(connection = %connection_id, frame_type = other.kind(), "Unexpected frame type");
        }
    }

    Ok(())
}

/// Run one command against the bridge and build the reply frame.
async fn dispatch(id: u64, command: Command, connection_id: &str, state: &AppState) -> Frame {
    let name = command.name();
    let start = Instant::now();
    debug!(connection = %connection_id, request = id, command = name, "Request");

    let result = state.bridge.dispatch(command).await;
    metrics::record_command(name, result.is_ok(), start.elapsed().as_secs_f64());
    metrics::set_registered_channels(state.bridge.registry().len());

    match result {
        Ok(reply) => Frame::response(id, reply),
        Err(e) => {
            debug!(connection = %connection_id, request = id, command = name, error = %e, "Request failed");
            metrics::record_error(e.kind());
            Frame::error(id, e.wire_code(), e.wire_message())
        }
    }
}

/// Send a frame to the WebSocket.
async fn send_frame(sender: &mut WsSender, frame: &Frame) -> Result<()> {
    let data = codec::encode(frame)?;
    metrics::record_frame(data.len(), "outbound");
    sender.send(Message::Binary(data.to_vec())).await?;
    Ok(())
}
