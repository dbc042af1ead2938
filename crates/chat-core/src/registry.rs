use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use crate::session::{Handle, Session, SessionId, SessionState, TransportKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// `by_name` already has a distinct session registered under this name.
    NameTaken,
    /// The session has already completed registration.
    AlreadyRegistered,
    /// An empty name is never accepted.
    EmptyName,
}

struct Inner {
    next_id: u64,
    sessions: HashMap<SessionId, Session>,
    by_handle: HashMap<Handle, SessionId>,
    by_name: HashMap<String, SessionId>,
}

impl Inner {
    fn new() -> Self {
        Self {
            next_id: 0,
            sessions: HashMap::new(),
            by_handle: HashMap::new(),
            by_name: HashMap::new(),
        }
    }
}

/// The membership registry (C2): a single authoritative session table
/// plus a `by_handle`/`by_name` index, serialized behind one lock.
///
/// Cheap to clone — all instances share the same underlying table.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new())),
        }
    }

    /// Insert a new `Unregistered` session for `handle`. For TCP and
    /// WebSocket handles this is always a fresh session (adapters mint a
    /// unique handle per accepted connection). For UDP, a handle already
    /// present in `by_handle` is not an error: the existing session is
    /// returned unchanged (§4.2).
    pub async fn attach(
        &self,
        handle: Handle,
        transport: TransportKind,
        sink: mpsc::UnboundedSender<String>,
    ) -> Session {
        let mut inner = self.inner.write().await;
        if let Some(&id) = inner.by_handle.get(&handle) {
            return inner.sessions[&id].clone();
        }
        let id = SessionId(inner.next_id);
        inner.next_id += 1;
        let session = Session::new(id, handle, transport, sink);
        inner.by_handle.insert(handle, id);
        inner.sessions.insert(id, session.clone());
        session
    }

    /// Update `last_seen` for a UDP handle without otherwise touching the
    /// session. Called before any other processing of an inbound datagram.
    pub async fn touch(&self, handle: Handle) {
        let mut inner = self.inner.write().await;
        if let Some(&id) = inner.by_handle.get(&handle) {
            if let Some(session) = inner.sessions.get_mut(&id) {
                session.last_seen = Instant::now();
            }
        }
    }

    /// Attempt to register `name` for the session at `handle`.
    pub async fn register(&self, handle: Handle, name: &str) -> Result<Session, RegisterError> {
        if name.is_empty() {
            return Err(RegisterError::EmptyName);
        }
        let mut inner = self.inner.write().await;
        let id = *inner
            .by_handle
            .get(&handle)
            .expect("register called on an attached handle");
        {
            let session = &inner.sessions[&id];
            if session.state != SessionState::Unregistered {
                return Err(RegisterError::AlreadyRegistered);
            }
        }
        if inner.by_name.contains_key(name) {
            return Err(RegisterError::NameTaken);
        }
        let session = inner.sessions.get_mut(&id).expect("session present");
        session.name = name.to_owned();
        session.state = SessionState::Registered;
        let updated = session.clone();
        inner.by_name.insert(name.to_owned(), id);
        Ok(updated)
    }

    /// Remove the session at `handle` from both indices. Idempotent.
    pub async fn detach(&self, handle: Handle) {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.by_handle.remove(&handle) {
            if let Some(session) = inner.sessions.remove(&id) {
                if session.state == SessionState::Registered {
                    inner.by_name.remove(&session.name);
                }
            }
        }
    }

    pub async fn lookup_by_name(&self, name: &str) -> Option<Session> {
        let inner = self.inner.read().await;
        let id = inner.by_name.get(name)?;
        inner.sessions.get(id).cloned()
    }

    pub async fn lookup_by_handle(&self, handle: Handle) -> Option<Session> {
        let inner = self.inner.read().await;
        let id = inner.by_handle.get(&handle)?;
        inner.sessions.get(id).cloned()
    }

    /// A snapshot of every currently-registered session, taken under the
    /// read lock. Broadcast fan-out writes against this snapshot outside
    /// the lock (§9 Design Notes: "prefer snapshotting... and writing
    /// outside it").
    pub async fn registered_snapshot(&self) -> Vec<Session> {
        let inner = self.inner.read().await;
        inner
            .by_name
            .values()
            .filter_map(|id| inner.sessions.get(id))
            .cloned()
            .collect()
    }

    /// Detach every UDP session whose `last_seen` is older than `idle_for`
    /// relative to `now`. Returns the number of sessions pruned.
    pub async fn sweep_idle_udp(&self, now: Instant, idle_for: std::time::Duration) -> usize {
        let mut inner = self.inner.write().await;
        let stale: Vec<Handle> = inner
            .sessions
            .values()
            .filter(|s| s.transport == TransportKind::Udp && now.saturating_duration_since(s.last_seen) >= idle_for)
            .map(|s| s.handle)
            .collect();
        for handle in &stale {
            if let Some(id) = inner.by_handle.remove(handle) {
                if let Some(session) = inner.sessions.remove(&id) {
                    if session.state == SessionState::Registered {
                        inner.by_name.remove(&session.name);
                    }
                }
            }
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_sink() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    fn tcp_handle(port: u16) -> Handle {
        Handle::Tcp(format!("127.0.0.1:{port}").parse().unwrap())
    }

    #[tokio::test]
    async fn attach_then_register_inserts_into_by_name() {
        let registry = Registry::new();
        let (tx, _rx) = noop_sink();
        let handle = tcp_handle(1);
        registry.attach(handle, TransportKind::Tcp, tx).await;

        let session = registry.register(handle, "A").await.unwrap();
        assert_eq!(session.name, "A");
        assert_eq!(session.state, SessionState::Registered);
        assert!(registry.lookup_by_name("A").await.is_some());
    }

    #[tokio::test]
    async fn register_rejects_empty_name() {
        let registry = Registry::new();
        let (tx, _rx) = noop_sink();
        let handle = tcp_handle(2);
        registry.attach(handle, TransportKind::Tcp, tx).await;
        assert_eq!(
            registry.register(handle, "").await,
            Err(RegisterError::EmptyName)
        );
    }

    #[tokio::test]
    async fn register_rejects_duplicate_name() {
        let registry = Registry::new();
        let (tx_a, _) = noop_sink();
        let (tx_b, _) = noop_sink();
        let a = tcp_handle(3);
        let b = tcp_handle(4);
        registry.attach(a, TransportKind::Tcp, tx_a).await;
        registry.attach(b, TransportKind::Tcp, tx_b).await;
        registry.register(a, "A").await.unwrap();
        assert_eq!(
            registry.register(b, "A").await,
            Err(RegisterError::NameTaken)
        );
    }

    #[tokio::test]
    async fn register_rejects_already_registered() {
        let registry = Registry::new();
        let (tx, _rx) = noop_sink();
        let handle = tcp_handle(5);
        registry.attach(handle, TransportKind::Tcp, tx).await;
        registry.register(handle, "A").await.unwrap();
        assert_eq!(
            registry.register(handle, "B").await,
            Err(RegisterError::AlreadyRegistered)
        );
    }

    #[tokio::test]
    async fn detach_is_idempotent_and_clears_both_indices() {
        let registry = Registry::new();
        let (tx, _rx) = noop_sink();
        let handle = tcp_handle(6);
        registry.attach(handle, TransportKind::Tcp, tx).await;
        registry.register(handle, "A").await.unwrap();

        registry.detach(handle).await;
        assert!(registry.lookup_by_handle(handle).await.is_none());
        assert!(registry.lookup_by_name("A").await.is_none());

        registry.detach(handle).await; // idempotent
    }

    #[tokio::test]
    async fn udp_attach_on_known_handle_is_a_no_op_returning_existing_session() {
        let registry = Registry::new();
        let (tx, _rx) = noop_sink();
        let handle = Handle::Udp("10.0.0.1:9999".parse().unwrap());
        registry.attach(handle, TransportKind::Udp, tx.clone()).await;
        registry.register(handle, "A").await.unwrap();

        let (tx2, _rx2) = noop_sink();
        let again = registry.attach(handle, TransportKind::Udp, tx2).await;
        assert_eq!(again.name, "A");
        assert_eq!(again.state, SessionState::Registered);
    }

    #[tokio::test]
    async fn freed_name_can_be_re_registered_after_detach() {
        let registry = Registry::new();
        let (tx, _rx) = noop_sink();
        let handle = tcp_handle(7);
        registry.attach(handle, TransportKind::Tcp, tx).await;
        registry.register(handle, "A").await.unwrap();
        registry.detach(handle).await;

        let (tx2, _rx2) = noop_sink();
        let handle2 = tcp_handle(8);
        registry.attach(handle2, TransportKind::Tcp, tx2).await;
        registry.register(handle2, "A").await.unwrap();
        assert!(registry.lookup_by_name("A").await.is_some());
    }

    #[tokio::test]
    async fn sweep_idle_udp_prunes_only_stale_udp_sessions() {
        let registry = Registry::new();
        let (tx_udp, _) = noop_sink();
        let (tx_tcp, _) = noop_sink();
        let udp_handle = Handle::Udp("10.0.0.2:1111".parse().unwrap());
        let tcp_handle = tcp_handle(9);
        registry.attach(udp_handle, TransportKind::Udp, tx_udp).await;
        registry.attach(tcp_handle, TransportKind::Tcp, tx_tcp).await;
        registry.register(udp_handle, "U").await.unwrap();
        registry.register(tcp_handle, "T").await.unwrap();

        let far_future = Instant::now() + std::time::Duration::from_secs(1000);
        let pruned = registry
            .sweep_idle_udp(far_future, std::time::Duration::from_secs(120))
            .await;

        assert_eq!(pruned, 1);
        assert!(registry.lookup_by_name("U").await.is_none());
        assert!(registry.lookup_by_name("T").await.is_some());
    }

    #[tokio::test]
    async fn registered_snapshot_excludes_unregistered_sessions() {
        let registry = Registry::new();
        let (tx_a, _) = noop_sink();
        let (tx_b, _) = noop_sink();
        registry.attach(tcp_handle(10), TransportKind::Tcp, tx_a).await;
        let b = tcp_handle(11);
        registry.attach(b, TransportKind::Tcp, tx_b).await;
        registry.register(b, "B").await.unwrap();

        let snapshot = registry.registered_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "B");
    }
}
