//! JSON text codec for Parlor frames.
//!
//! Frames travel as one JSON document per transport message, so there is no
//! length prefix; the codec only enforces the size bound.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Maximum size of a client command that is re-broadcast as a chat frame.
///
/// Re-encoding never lengthens the content, so this leaves room for the
/// chat envelope and a sender name of up to [`MAX_USERNAME_LENGTH`].
pub const MAX_COMMAND_SIZE: usize = MAX_FRAME_SIZE - 1024;

/// Maximum username length in bytes.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a frame to a JSON string.
///
/// # Errors
///
/// Returns an error if the frame is too large or serialization fails.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(frame).map_err(ProtocolError::Encode)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode a frame from a JSON string.
///
/// # Errors
///
/// Returns an error if the text is too large or is not a valid frame.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
