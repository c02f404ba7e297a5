//! Connection intake: upgrades downstream peers and hands them to the manager.

use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use fanout_core::{Message, PeerError};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::health::{self, HealthResponse};
use crate::manager::FanoutStats;
use crate::peer::{PeerHandle, PeerSink};

/// Write half of an upgraded peer connection.
pub struct WsPeerSink {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl PeerSink for WsPeerSink {
    async fn send_text(&mut self, message: &Message) -> Result<(), PeerError> {
        self.sink
            .send(WsMessage::Text(message.as_str().into()))
            .await
            .map_err(|e| PeerError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// Shared state for the intake handlers.
#[derive(Clone)]
pub struct IntakeState {
    /// Hands new peers to the manager.
    pub peers: mpsc::Sender<PeerHandle>,
    /// Live manager counters.
    pub stats: watch::Receiver<FanoutStats>,
    /// When the relay started.
    pub start_time: Instant,
}

/// Build the router: `GET /` upgrades to a peer, `GET /health` reports counters.
pub fn router(state: IntakeState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<IntakeState>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(move |e| warn!(%addr, error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| accept_peer(socket, addr, state.peers))
}

async fn health_handler(State(state): State<IntakeState>) -> Json<HealthResponse> {
    let stats = *state.stats.borrow();
    Json(health::health_check(state.start_time, stats))
}

/// Register the peer, then read until it hangs up or its writer stops.
async fn accept_peer(socket: WebSocket, addr: SocketAddr, peers: mpsc::Sender<PeerHandle>) {
    info!(%addr, "peer connected");
    let (sink, mut stream) = socket.split();
    let handle = PeerHandle::new(WsPeerSink { sink }).with_remote_addr(addr);
    let disconnect = handle.disconnect_token();

    if let Err(mpsc::error::SendError(handle)) = peers.send(handle).await {
        debug!(%addr, "relay is shutting down, closing new peer");
        handle.close().await;
        return;
    }

    loop {
        tokio::select! {
            () = disconnect.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%addr, error = %e, "peer read failed");
                    break;
                }
                // Peers have nothing to say; inbound frames are discarded.
                Some(Ok(_)) => {}
            },
        }
    }
    disconnect.cancel();
    debug!(%addr, "peer reader stopped");
}
