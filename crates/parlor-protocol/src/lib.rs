//! # parlor-protocol
//!
//! Wire messages for the Parlor chat hub.
//!
//! Frames are JSON text messages and are transport-agnostic:
//!
//! - `JoinRequest` - first client frame, selects a room
//! - `ClientCommand` - post-join commands (`{"action":"message","content":...}`)
//! - `ServerFrame` - `system` notices and `chat` messages fanned out by the hub
//! - `ErrorFrame` - join rejection
//!
//! ## Example
//!
//! ```rust
//! use parlor_protocol::{codec, ClientCommand, ServerFrame};
//!
//! let cmd: ClientCommand = codec::decode(r#"{"action":"message","content":"hi"}"#).unwrap();
//! let text = codec::encode(&ServerFrame::chat("alice", cmd.content, 0)).unwrap();
//! assert!(text.starts_with(r#"{"type":"chat""#));
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError, MAX_COMMAND_SIZE, MAX_FRAME_SIZE, MAX_USERNAME_LENGTH};
pub use frames::{Action, ClientCommand, ErrorFrame, JoinRequest, ServerFrame};
