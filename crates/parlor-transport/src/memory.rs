//! In-process transport.
//!
//! [`pair`] returns the server-side reader/writer of a connection together
//! with a [`PeerHandle`] that plays the client. The server-to-peer direction
//! is bounded, so a peer that stops reading makes writes stall the same way a
//! slow network client does.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Something the server wrote to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A text frame.
    Text(String),
    /// A keepalive ping.
    Ping,
    /// A close frame.
    Close,
}

enum Inbound {
    Text(String),
    Fail(String),
}

/// Create a connected in-memory transport.
///
/// `capacity` bounds the number of unread frames in each direction.
#[must_use]
pub fn pair(capacity: usize) -> (MemoryReader, MemoryWriter, PeerHandle) {
    let (to_server, from_peer) = mpsc::channel(capacity);
    let (to_peer, from_server) = mpsc::channel(capacity);
    (
        MemoryReader { rx: from_peer },
        MemoryWriter {
            tx: to_peer,
            closed: false,
        },
        PeerHandle {
            tx: Some(to_server),
            rx: from_server,
        },
    )
}

/// Server-side reader of an in-memory connection.
pub struct MemoryReader {
    rx: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(Inbound::Text(text)) => Ok(Some(text)),
            Some(Inbound::Fail(reason)) => Err(TransportError::ReceiveFailed(reason)),
            None => Ok(None),
        }
    }
}

/// Server-side writer of an in-memory connection.
pub struct MemoryWriter {
    tx: mpsc::Sender<PeerEvent>,
    closed: bool,
}

impl MemoryWriter {
    async fn push(&mut self, event: PeerEvent) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.push(PeerEvent::Text(text)).await
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.push(PeerEvent::Ping).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        let result = self.push(PeerEvent::Close).await;
        self.closed = true;
        result
    }
}

/// The client end of an in-memory connection.
pub struct PeerHandle {
    tx: Option<mpsc::Sender<Inbound>>,
    rx: mpsc::Receiver<PeerEvent>,
}

impl PeerHandle {
    /// Send a text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer already disconnected or the server side
    /// was dropped.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(Inbound::Text(text.into()))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Make the server's next read fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is already gone.
    pub async fn fail(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(Inbound::Fail(reason.into()))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Close the client side. The server reader sees a clean close once it
    /// has drained pending frames.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Receive the next event written by the server.
    ///
    /// Returns `None` once the server writer has been dropped.
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.rx.recv().await
    }

    /// Receive the next text frame, skipping pings.
    ///
    /// Returns `None` on close or when the writer is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await? {
                PeerEvent::Text(text) => return Some(text),
                PeerEvent::Ping => continue,
                PeerEvent::Close => return None,
            }
        }
    }

    /// Take an already-written event without waiting.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.rx.try_recv().ok()
    }
}
