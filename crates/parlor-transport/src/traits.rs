//! Transport abstraction traits for Parlor.
//!
//! A connection is split into a reader half and a writer half so that one
//! task can own each: the inbound pump is the only reader and the outbound
//! pump is the only writer of a given connection.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, globally unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation did not finish before its deadline.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Incoming message exceeded the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size of the rejected message.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Binary message was not valid UTF-8.
    #[error("Message is not valid UTF-8")]
    InvalidUtf8,
}

/// The receiving half of a connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Receive the next text frame.
    ///
    /// Control frames are handled internally. Returns `None` once the peer
    /// has closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// The sending half of a connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a keepalive ping.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Send a close frame and shut the writer down.
    async fn close(&mut self) -> Result<(), TransportError>;
}
