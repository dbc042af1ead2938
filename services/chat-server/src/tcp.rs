//! TCP adapter (§4.5.1): one listener, one reader task per connection,
//! newline-delimited JSON frames.

use std::net::SocketAddr;

use chat_core::session::{Handle, TransportKind};
use chat_core::{handle_frame, Outcome, Registry, Relay};
use chat_wire::decode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub struct TcpAdapter {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl TcpAdapter {
    /// Bind `addr` and start accepting connections in the background.
    pub async fn start(
        addr: SocketAddr,
        registry: Registry,
        relay: Relay,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "tcp adapter listening");
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    accept = listener.accept() => {
                        match accept {
                            Ok((stream, peer)) => {
                                debug!(%peer, "tcp client connected");
                                tokio::spawn(serve_connection(stream, peer, registry.clone(), relay.clone()));
                            }
                            Err(e) => warn!(error = %e, "tcp accept error"),
                        }
                    }
                }
            }
            info!("tcp adapter stopped accepting");
        });

        Ok(Self { local_addr, shutdown_tx })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new connections. Idempotent. Existing sessions drain
    /// on their own (read EOF / exit frame).
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, registry: Registry, relay: Relay) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = sink_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let handle = Handle::Tcp(peer);
    registry.attach(handle, TransportKind::Tcp, sink_tx).await;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(%peer, "tcp read EOF");
                break;
            }
            Ok(_) => {
                let frame = match decode(&line) {
                    Ok(frame) => frame,
                    Err(_) => {
                        if let Some(session) = registry.lookup_by_handle(handle).await {
                            let err = chat_wire::encode_line(&chat_wire::Frame::error("invalid json format"));
                            let _ = session.send_line(err);
                        }
                        continue;
                    }
                };
                let outcome = handle_frame(&registry, &relay, handle, TransportKind::Tcp, frame).await;
                if outcome == Outcome::EndSession {
                    break;
                }
            }
            Err(e) => {
                warn!(%peer, error = %e, "tcp read error");
                break;
            }
        }
    }

    registry.detach(handle).await;
    writer_task.abort();
    info!(%peer, "tcp session ended");
}
