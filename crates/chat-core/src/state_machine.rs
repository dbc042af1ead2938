use chat_wire::{encode_line, Frame};

use crate::registry::{RegisterError, Registry};
use crate::relay::Relay;
use crate::session::{Handle, SessionState, TransportKind};

/// What the adapter should do after a frame has been run through the
/// state machine. The relay/registry side effects (if any) have already
/// happened by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading from this session.
    Continue,
    /// Detach the session and stop reading. For TCP/WebSocket this also
    /// means closing the underlying connection.
    EndSession,
}

/// Run one inbound frame through the session state machine (C3) for the
/// session bound to `handle`, mutating the registry and relay as needed.
///
/// `handle` must already be attached (via `Registry::attach`).
pub async fn handle_frame(
    registry: &Registry,
    relay: &Relay,
    handle: Handle,
    transport: TransportKind,
    frame: Frame,
) -> Outcome {
    let Some(session) = registry.lookup_by_handle(handle).await else {
        // Session vanished (e.g. concurrent sweep); nothing to do.
        return Outcome::EndSession;
    };

    if let Frame::Register(reg) = &frame {
        return handle_register(registry, &session, transport, &reg.name).await;
    }

    // Authoring identity (§4.3): UDP binds a frame's author claim to the
    // address that registered it; TCP/WS ignore the claim and always use
    // the session's own registered name, so no check is needed for them.
    if transport == TransportKind::Udp && session.state == SessionState::Registered {
        if let Some(claimed) = frame.claimed_name() {
            if claimed != session.name {
                let err = encode_line(&Frame::error("message from wrong address for user"));
                let _ = session.send_line(err);
                return Outcome::Continue;
            }
        }
    }

    match frame {
        Frame::Register(_) => unreachable!("handled above"),
        Frame::Exit(_) => match session.state {
            SessionState::Unregistered => Outcome::Continue, // ignored
            SessionState::Registered => {
                registry.detach(handle).await;
                Outcome::EndSession
            }
        },
        Frame::Broadcast(b) => {
            match session.state {
                SessionState::Unregistered => {
                    let err = encode_line(&Frame::error("not registered"));
                    let _ = session.send_line(err);
                }
                SessionState::Registered => {
                    relay.broadcast(&session.name, &b.text, &b.time).await;
                }
            }
            Outcome::Continue
        }
        Frame::Whisper(w) => {
            match session.state {
                SessionState::Unregistered => {
                    let err = encode_line(&Frame::error("not registered"));
                    let _ = session.send_line(err);
                }
                SessionState::Registered => {
                    relay.whisper(&session, &w.dst, &w.text, &w.time).await;
                }
            }
            Outcome::Continue
        }
        Frame::Error(_) => Outcome::Continue, // clients don't author error frames
    }
}

async fn handle_register(
    registry: &Registry,
    session: &crate::session::Session,
    transport: TransportKind,
    requested_name: &str,
) -> Outcome {
    if session.state == SessionState::Registered {
        if requested_name == session.name {
            return Outcome::Continue; // idempotent re-registration, permitted
        }
        let err = encode_line(&Frame::error("already registered"));
        let _ = session.send_line(err);
        return Outcome::Continue;
    }

    match registry.register(session.handle, requested_name).await {
        Ok(_) => Outcome::Continue,
        Err(RegisterError::NameTaken) => {
            let err = encode_line(&Frame::error("username already taken"));
            let _ = session.send_line(err);
            match transport {
                TransportKind::Tcp | TransportKind::Ws => Outcome::EndSession,
                TransportKind::Udp => Outcome::Continue,
            }
        }
        Err(RegisterError::EmptyName) => {
            let err = encode_line(&Frame::error("name must not be empty"));
            let _ = session.send_line(err);
            Outcome::Continue
        }
        Err(RegisterError::AlreadyRegistered) => {
            // Raced with another frame on the same session; treat like the
            // synchronous idempotent check above.
            Outcome::Continue
        }
    }
}
