//! # parlor-transport
//!
//! Transport abstraction layer for the Parlor chat hub.
//!
//! - **WebSocket** - `axum` upgraded sockets (feature `websocket`, on by default)
//! - **Memory** - in-process connections for tests and embedding
//!
//! ## Transport Abstraction
//!
//! Every connection is split into a [`FrameReader`] and a [`FrameWriter`] so
//! that reading and writing can be owned by separate tasks.
//!
//! ```rust,ignore
//! use parlor_transport::{FrameReader, FrameWriter};
//!
//! async fn echo(mut reader: impl FrameReader, mut writer: impl FrameWriter) {
//!     while let Ok(Some(text)) = reader.recv().await {
//!         if writer.send_text(text).await.is_err() {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{ConnectionId, FrameReader, FrameWriter, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketReader, WebSocketWriter};
