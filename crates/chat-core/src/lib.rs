//! Transport-agnostic relay core: session bookkeeping, the membership
//! registry, and the broadcast/whisper fan-out logic shared by every
//! adapter (TCP, UDP, WebSocket).

pub mod registry;
pub mod relay;
pub mod session;
pub mod state_machine;

pub use registry::{RegisterError, Registry};
pub use relay::Relay;
pub use session::{Handle, Session, SessionState, TransportKind};
pub use state_machine::{handle_frame, Outcome};
