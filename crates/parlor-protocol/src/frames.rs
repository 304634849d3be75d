//! Frame types for the Parlor protocol.
//!
//! Every frame is a JSON text message. The first frame a client sends is a
//! [`JoinRequest`]; everything after a successful join is a [`ClientCommand`].
//! The server answers with [`ServerFrame`]s, or with a single [`ErrorFrame`]
//! when negotiation fails.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Request to join a room. Only valid as the first frame of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Target room identifier.
    pub room_id: String,
    /// Room password, required when the room has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl JoinRequest {
    /// Create a join request without a password.
    #[must_use]
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            password: None,
        }
    }

    /// Attach a password to the request.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Action tag of a post-join client command.
///
/// Only [`Action::Message`] carries behaviour. [`Action::Join`] is recognised
/// but does nothing since joining happens during negotiation; anything else
/// is kept verbatim in [`Action::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a chat message to the current room.
    Message,
    /// Reserved.
    Join,
    /// Unrecognised action.
    Other(String),
}

impl Action {
    /// Get the wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Action::Message => "message",
            Action::Join => "join",
            Action::Other(name) => name,
        }
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        match name.as_str() {
            "message" => Action::Message,
            "join" => Action::Join,
            _ => Action::Other(name),
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action::from(name.to_string())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Action::from)
    }
}

/// A command sent by a joined client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommand {
    /// What the client wants to do.
    pub action: Action,
    /// Command body.
    #[serde(default)]
    pub content: String,
}

impl ClientCommand {
    /// Create a `message` command.
    #[must_use]
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            action: Action::Message,
            content: content.into(),
        }
    }
}

/// A frame broadcast by the server to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Membership notice generated by the hub.
    System {
        /// Human-readable notice.
        content: String,
    },

    /// Chat message relayed from a member.
    Chat {
        /// Sender's display name.
        username: String,
        /// Message body.
        message: String,
        /// Send time in milliseconds since the Unix epoch.
        time: u64,
    },
}

impl ServerFrame {
    /// Create a system notice.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        ServerFrame::System {
            content: content.into(),
        }
    }

    /// Notice announcing that `username` joined.
    #[must_use]
    pub fn joined(username: &str) -> Self {
        Self::system(format!("{username} joined the room"))
    }

    /// Notice announcing that `username` left.
    #[must_use]
    pub fn left(username: &str) -> Self {
        Self::system(format!("{username} left the room"))
    }

    /// Create a chat frame.
    #[must_use]
    pub fn chat(username: impl Into<String>, message: impl Into<String>, time: u64) -> Self {
        ServerFrame::Chat {
            username: username.into(),
            message: message.into(),
            time,
        }
    }

    /// Get the `type` tag of this frame.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::System { .. } => "system",
            ServerFrame::Chat { .. } => "chat",
        }
    }
}

/// Error answer to a rejected join. The connection is closed right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Client-visible reason.
    pub error: String,
}

impl ErrorFrame {
    /// Create an error frame.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_frame_shape() {
        let frame = ServerFrame::chat("A", "hi", 1_700_000_000_000);
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "chat", "username": "A", "message": "hi", "time": 1_700_000_000_000u64})
        );
        assert_eq!(frame.kind(), "chat");
    }

    #[test]
    fn test_membership_notices() {
        let value = serde_json::to_value(ServerFrame::left("A")).unwrap();
        assert_eq!(value, json!({"type": "system", "content": "A left the room"}));

        let value = serde_json::to_value(ServerFrame::joined("B")).unwrap();
        assert_eq!(value, json!({"type": "system", "content": "B joined the room"}));
    }

    #[test]
    fn test_join_request_optional_password() {
        let req: JoinRequest = serde_json::from_str(r#"{"room_id":"r1"}"#).unwrap();
        assert_eq!(req, JoinRequest::new("r1"));

        let req: JoinRequest =
            serde_json::from_str(r#"{"room_id":"r1","password":"secret"}"#).unwrap();
        assert_eq!(req.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_action_parsing() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"action":"message","content":"hi"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::message("hi"));

        let cmd: ClientCommand = serde_json::from_str(r#"{"action":"join"}"#).unwrap();
        assert_eq!(cmd.action, Action::Join);
        assert!(cmd.content.is_empty());

        let cmd: ClientCommand = serde_json::from_str(r#"{"action":"typing"}"#).unwrap();
        assert_eq!(cmd.action, Action::Other("typing".to_string()));
        assert_eq!(cmd.action.as_str(), "typing");
    }

    #[test]
    fn test_error_frame_shape() {
        let value = serde_json::to_value(ErrorFrame::new("Room is full")).unwrap();
        assert_eq!(value, json!({"error": "Room is full"}));
    }
}
