//! UDP adapter (§4.5.2): one socket for every client, dispatched
//! synchronously in the receive task. Identity is bound to `ip:port`;
//! there is no connection-level close signal, so sessions only end via
//! `exit` or the liveness sweeper (§4.6).

use std::net::SocketAddr;
use std::sync::Arc;

use chat_core::session::{Handle, TransportKind};
use chat_core::{handle_frame, Registry, Relay};
use chat_wire::decode;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub struct UdpAdapter {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl UdpAdapter {
    pub async fn start(addr: SocketAddr, registry: Registry, relay: Relay) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "udp adapter listening");
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut buf = [0u8; 64 * 1024];
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    received = socket.recv_from(&mut buf) => {
                        match received {
                            Ok((n, peer)) => {
                                // Dispatched inline, not spawned: §5 requires frames
                                // from one session to be processed in arrival order
                                // (e.g. a `register` happens-before the broadcast
                                // that follows it), and a per-datagram task would let
                                // the scheduler reorder two datagrams from the same
                                // peer. One shared socket, one receive task, in-order
                                // dispatch — the other branch §4.5.2 permits.
                                let line = String::from_utf8_lossy(&buf[..n]).into_owned();
                                handle_datagram(&registry, &relay, &socket, peer, &line).await;
                            }
                            Err(e) => warn!(error = %e, "udp recv error"),
                        }
                    }
                }
            }
            info!("udp adapter stopped receiving");
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

/// Ensure a session exists for `peer`, spawning its dedicated writer task
/// the first time this address is seen. Later datagrams from the same
/// address reuse the session `attach()` already returns (§4.2).
async fn ensure_attached(registry: &Registry, socket: &Arc<UdpSocket>, peer: SocketAddr) -> Handle {
    let handle = Handle::Udp(peer);
    if registry.lookup_by_handle(handle).await.is_some() {
        return handle;
    }

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<String>();
    let write_socket = socket.clone();
    tokio::spawn(async move {
        while let Some(line) = sink_rx.recv().await {
            if let Err(e) = write_socket.send_to(line.as_bytes(), peer).await {
                warn!(%peer, error = %e, "udp send failed");
            }
        }
    });
    registry.attach(handle, TransportKind::Udp, sink_tx).await;
    handle
}

async fn handle_datagram(registry: &Registry, relay: &Relay, socket: &Arc<UdpSocket>, peer: SocketAddr, line: &str) {
    let handle = ensure_attached(registry, socket, peer).await;
    registry.touch(handle).await;

    let frame = match decode(line) {
        Ok(frame) => frame,
        Err(_) => {
            let err = chat_wire::encode_line(&chat_wire::Frame::error("invalid json format"));
            let _ = socket.send_to(err.as_bytes(), peer).await;
            return;
        }
    };

    debug!(%peer, "udp frame dispatched");
    handle_frame(registry, relay, handle, TransportKind::Udp, frame).await;
}
