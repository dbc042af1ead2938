//! WebSocket adapter (§4.5.3): a single upgrade endpoint at `/ws`. All
//! other semantics mirror the TCP adapter; only the frame delimiter
//! differs (one JSON object per text frame, no `\n`).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chat_core::session::{Handle, TransportKind};
use chat_core::{handle_frame, Outcome, Registry, Relay};
use chat_wire::{decode, encode, Frame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct WsState {
    registry: Registry,
    relay: Relay,
    next_id: Arc<AtomicU64>,
}

pub struct WsAdapter {
    local_addr: SocketAddr,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl WsAdapter {
    pub async fn start(addr: SocketAddr, registry: Registry, relay: Relay) -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "websocket adapter listening");

        let state = WsState {
            registry,
            relay,
            next_id: Arc::new(AtomicU64::new(0)),
        };
        let router = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
            let serve = axum::serve(listener, make_service).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "websocket server error");
            }
            info!("websocket adapter stopped");
        });

        Ok(Self { local_addr, shutdown_tx })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, peer, state))
}

async fn serve_socket(mut socket: WebSocket, peer: SocketAddr, state: WsState) {
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    let handle = Handle::Ws(id);
    debug!(%peer, ws_id = id, "websocket client connected");

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<String>();
    state.registry.attach(handle, TransportKind::Ws, sink_tx).await;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match decode(&text) {
                            Ok(frame) => frame,
                            Err(_) => {
                                let err = encode(&Frame::error("invalid json format"));
                                if socket.send(Message::Text(err.into())).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        let outcome = handle_frame(&state.registry, &state.relay, handle, TransportKind::Ws, frame).await;
                        if outcome == Outcome::EndSession {
                            drain_sink(&mut socket, &mut sink_rx).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%peer, ws_id = id, "websocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: ignored
                    Some(Err(e)) => {
                        warn!(%peer, ws_id = id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            Some(line) = sink_rx.recv() => {
                // Drop the trailing `\n` used by the line-oriented transports;
                // WebSocket carries one JSON document per frame.
                let payload = line.trim_end_matches('\n').to_owned();
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.detach(handle).await;
    let _ = socket.close().await;
}

/// Flush any egress already queued (e.g. the "username already taken" error
/// queued by `handle_frame` right before it signals `EndSession`) before the
/// connection is closed, so the rejected peer sees the error frame instead
/// of a bare Close.
async fn drain_sink(socket: &mut WebSocket, sink_rx: &mut mpsc::UnboundedReceiver<String>) {
    while let Ok(line) = sink_rx.try_recv() {
        let payload = line.trim_end_matches('\n').to_owned();
        if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }
}
