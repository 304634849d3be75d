//! WebSocket transport implementation.
//!
//! Adapts an upgraded `axum` WebSocket into a [`FrameReader`]/[`FrameWriter`]
//! pair. Pongs are answered by the underlying protocol stack while reading.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::traits::{FrameReader, FrameWriter, TransportError};

/// Default maximum message size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Split an upgraded WebSocket into its reader and writer halves.
#[must_use]
pub fn split(socket: WebSocket, max_message_size: usize) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = socket.split();
    (
        WebSocketReader {
            stream,
            max_message_size,
        },
        WebSocketWriter { sink, closed: false },
    )
}

/// Reader half of a WebSocket connection.
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
    max_message_size: usize,
}

impl WebSocketReader {
    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.max_message_size {
            warn!(size, max = self.max_message_size, "Message too large");
            return Err(TransportError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return Ok(Some(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|_| TransportError::InvalidUtf8);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

/// Writer half of a WebSocket connection.
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.sink
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        // The peer's close reply is consumed by the reader half.
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
