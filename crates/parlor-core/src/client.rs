//! Connection-side view of a chat client.

use crate::room::RoomId;
use parlor_transport::ConnectionId;

/// A connected client.
///
/// The outbound queue is not part of this type: its sending half is handed
/// to the hub at registration and its receiving half belongs to the outbound
/// pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Connection handle.
    pub id: ConnectionId,
    /// Display name used in notices and chat frames.
    pub username: String,
    /// Room this client joined, set once negotiation succeeds.
    pub room: Option<RoomId>,
}

impl Client {
    /// Create a client that has not joined a room yet.
    #[must_use]
    pub fn new(id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            room: None,
        }
    }

    /// Create a client already bound to a room.
    #[must_use]
    pub fn in_room(mut self, room_id: impl Into<RoomId>) -> Self {
        self.room = Some(room_id.into());
        self
    }

    /// The room this client belongs to, if any.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }
}
