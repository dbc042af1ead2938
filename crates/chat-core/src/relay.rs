use chat_wire::{encode_line, Frame};
use tracing::warn;

use crate::registry::Registry;
use crate::session::Session;

/// The relay core (C4): fan-out from one parsed, state-validated inbound
/// frame to the correct subset of sessions.
///
/// Cheap to clone — wraps the same shared `Registry` every clone reads.
#[derive(Clone)]
pub struct Relay {
    registry: Registry,
}

impl Relay {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Emit `{kind:"broadcast", name: author, text, time}` to every
    /// registered session, including the author. Collateral write
    /// failures are logged and do not abort the fan-out.
    pub async fn broadcast(&self, author: &str, text: &str, time: &str) {
        let frame = Frame::broadcast(author, text, time);
        let line = encode_line(&frame);
        let recipients = self.registry.registered_snapshot().await;
        for recipient in &recipients {
            if let Err(e) = recipient.send_line(line.clone()) {
                warn!(name = %recipient.name, error = %e, "broadcast write failed, skipping recipient");
            }
        }
    }

    /// Deliver a whisper from `author` to `dst`.
    ///
    /// - Unknown `dst`: an `error` frame is sent back to `author`, nothing delivered.
    /// - `dst == author`: delivered once.
    /// - Otherwise: delivered to both `dst` and `author` (echo).
    pub async fn whisper(&self, author: &Session, dst: &str, text: &str, time: &str) {
        let Some(destination) = self.registry.lookup_by_name(dst).await else {
            let err = encode_line(&Frame::error(format!("{dst} not found")));
            if let Err(e) = author.send_line(err) {
                warn!(name = %author.name, error = %e, "failed to deliver whisper-not-found error");
            }
            return;
        };

        let frame = Frame::whisper(&author.name, dst, text, time);
        let line = encode_line(&frame);

        if destination.handle == author.handle {
            if let Err(e) = author.send_line(line) {
                warn!(name = %author.name, error = %e, "whisper-to-self write failed");
            }
            return;
        }

        if let Err(e) = destination.send_line(line.clone()) {
            warn!(name = %destination.name, error = %e, "whisper write failed, skipping recipient");
        }
        if let Err(e) = author.send_line(line) {
            warn!(name = %author.name, error = %e, "whisper echo write failed");
        }
    }
}
