//! RAOP connection management

mod channel;
mod reconnect;
mod session;
mod state;
mod timing;

#[cfg(test)]
mod tests;

pub use channel::RtspChannel;
pub use reconnect::{ReconnectDecision, ReconnectOutcome, ReconnectPolicy};
pub use session::{RaopSession, SessionStatus};
pub use state::{ConnectionState, ConnectionStats, DisconnectReason, SessionEvent};
