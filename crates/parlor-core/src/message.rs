//! Internal message types for the hub.

use parlor_protocol::{codec, ServerFrame};
use parlor_transport::ConnectionId;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// An encoded frame, shared between every member it is fanned out to.
pub type Payload = Arc<str>;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Encode a server frame into a shareable payload.
///
/// Encoding only fails for frames over the size limit; those are logged and
/// dropped.
#[must_use]
pub fn encode_frame(frame: &ServerFrame) -> Option<Payload> {
    match codec::encode(frame) {
        Ok(text) => Some(Payload::from(text)),
        Err(e) => {
            error!(kind = frame.kind(), error = %e, "Failed to encode frame");
            None
        }
    }
}

/// One fan-out delivery: a payload addressed to every member of a room.
#[derive(Debug, Clone)]
pub struct BroadcastEnvelope {
    /// Target room.
    pub room_id: String,
    /// Encoded frame.
    pub payload: Payload,
    /// Member that submitted the payload; `None` for hub notices.
    pub sender: Option<ConnectionId>,
}

impl BroadcastEnvelope {
    /// Create a new envelope.
    #[must_use]
    pub fn new(room_id: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            room_id: room_id.into(),
            payload: payload.into(),
            sender: None,
        }
    }

    /// Only deliver while `sender` is still a member of the room.
    #[must_use]
    pub fn from_member(mut self, sender: ConnectionId) -> Self {
        self.sender = Some(sender);
        self
    }
}
