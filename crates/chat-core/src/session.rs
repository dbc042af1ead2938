use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// The transport a session was accepted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
    Ws,
}

/// A stable per-session identifier, keyed on the transport's natural
/// connection identity: stream peer address, datagram `ip:port`, or a
/// server-assigned connection id for WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Tcp(SocketAddr),
    Udp(SocketAddr),
    Ws(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registered,
}

/// Opaque internal key for the registry's authoritative session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SessionId(pub(crate) u64);

/// A connected client.
///
/// Cheap to clone: the egress sink is an unbounded line queue, not the
/// transport itself, so a snapshot can be handed to the relay and
/// written from outside the registry lock.
#[derive(Clone)]
pub struct Session {
    pub(crate) id: SessionId,
    pub handle: Handle,
    pub transport: TransportKind,
    pub name: String,
    pub state: SessionState,
    pub last_seen: Instant,
    sink: mpsc::UnboundedSender<String>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        handle: Handle,
        transport: TransportKind,
        sink: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            id,
            handle,
            transport,
            name: String::new(),
            state: SessionState::Unregistered,
            last_seen: Instant::now(),
            sink,
        }
    }

    /// Queue a line for this session's writer task. A full/closed queue
    /// (the session is gone or has lagged out) is a collateral failure:
    /// logged by the caller, never propagated to other recipients.
    pub fn send_line(&self, line: String) -> Result<(), mpsc::error::SendError<String>> {
        self.sink.send(line)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("transport", &self.transport)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
