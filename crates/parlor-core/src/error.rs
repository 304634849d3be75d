//! Error types for the hub, join negotiation and collaborator calls.
//!
//! The `Display` text of [`JoinError`] is what rejected clients see in their
//! error frame.

use parlor_transport::TransportError;
use thiserror::Error;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Room creation parameters were rejected.
    #[error("Invalid room parameters: {0}")]
    Validation(&'static str),

    /// The directory already holds the configured number of rooms.
    #[error("Maximum number of rooms reached")]
    TooManyRooms,

    /// The coordinator task has stopped.
    #[error("Hub is not running")]
    Closed,
}

/// Reasons a join can fail.
#[derive(Debug, Error)]
pub enum JoinError {
    /// First frame was not a join request.
    #[error("Invalid join request")]
    InvalidRequest,

    /// Room does not exist (or was deleted before the join applied).
    #[error("Room not found")]
    RoomNotFound,

    /// Room has a password and the request did not match it.
    #[error("Invalid password")]
    InvalidPassword,

    /// Room is at capacity.
    #[error("Room is full")]
    RoomFull,

    /// No join request arrived in time.
    #[error("Join request timed out")]
    Timeout,

    /// The hub could not take the registration.
    #[error("Server unavailable")]
    Unavailable,

    /// The connection failed during negotiation.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failures talking to an external collaborator (presence or auth).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The service could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish before its deadline.
    #[error("Service call timed out")]
    Timeout,

    /// The service answered but refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl JoinError {
    /// Short label for metrics and logs.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            JoinError::InvalidRequest => "invalid_request",
            JoinError::RoomNotFound => "not_found",
            JoinError::InvalidPassword => "invalid_password",
            JoinError::RoomFull => "room_full",
            JoinError::Timeout => "timeout",
            JoinError::Unavailable => "unavailable",
            JoinError::Transport(_) => "transport",
        }
    }

    /// Whether the client can still be told why it was rejected.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        !matches!(self, JoinError::Transport(_))
    }
}
