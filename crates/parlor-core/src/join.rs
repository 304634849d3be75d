//! Join negotiation.
//!
//! A new connection must send exactly one [`JoinRequest`] within the join
//! timeout. The request is checked against the room directory (existence,
//! then password, then capacity; the first failure wins) and, if it passes,
//! handed to the hub for registration. A rejected connection never touches
//! the hub.

use crate::client::Client;
use crate::error::JoinError;
use crate::hub::Hub;
use crate::message::Payload;
use crate::telemetry;
use parlor_protocol::{codec, ErrorFrame, JoinRequest};
use parlor_transport::{FrameReader, FrameWriter, TransportError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default time a connection has to send its join request.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPhase {
    /// Connection accepted, nothing read yet.
    Connected,
    /// Waiting for the join request.
    AwaitingJoin,
    /// Checking the request against the room.
    Validating,
    /// Registered with the hub.
    Joined,
    /// Refused; the connection gets an error frame and is closed.
    Rejected,
}

/// Drives one connection through join negotiation.
pub struct JoinNegotiator<'a> {
    hub: &'a Hub,
    timeout: Duration,
    phase: JoinPhase,
}

impl<'a> JoinNegotiator<'a> {
    /// Create a negotiator for a freshly accepted connection.
    #[must_use]
    pub fn new(hub: &'a Hub, timeout: Duration) -> Self {
        Self {
            hub,
            timeout,
            phase: JoinPhase::Connected,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> JoinPhase {
        self.phase
    }

    /// Read the join request, validate it and register the client.
    ///
    /// On success the returned client carries its room and `outbound` is
    /// owned by the hub.
    ///
    /// # Errors
    ///
    /// Returns the reason the join was refused.
    pub async fn negotiate<R>(
        &mut self,
        reader: &mut R,
        client: Client,
        outbound: mpsc::Sender<Payload>,
    ) -> Result<Client, JoinError>
    where
        R: FrameReader + ?Sized,
    {
        let result = self.run(reader, client, outbound).await;
        match &result {
            Ok(client) => {
                self.phase = JoinPhase::Joined;
                debug!(connection = %client.id, room = ?client.room, "Join accepted");
            }
            Err(e) => {
                self.phase = JoinPhase::Rejected;
                telemetry::record_join_rejected(e.reason());
                debug!(reason = e.reason(), "Join rejected");
            }
        }
        result
    }

    async fn run<R>(
        &mut self,
        reader: &mut R,
        client: Client,
        outbound: mpsc::Sender<Payload>,
    ) -> Result<Client, JoinError>
    where
        R: FrameReader + ?Sized,
    {
        self.phase = JoinPhase::AwaitingJoin;
        let text = match tokio::time::timeout(self.timeout, reader.recv()).await {
            Err(_) => return Err(JoinError::Timeout),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(None)) => return Err(TransportError::ConnectionClosed.into()),
            Ok(Ok(Some(text))) => text,
        };
        let request: JoinRequest = codec::decode(&text).map_err(|e| {
            debug!(connection = %client.id, error = %e, "Malformed join request");
            JoinError::InvalidRequest
        })?;

        self.phase = JoinPhase::Validating;
        self.validate(&request)?;

        let client = client.in_room(request.room_id);
        self.hub.register(&client, outbound).await?;
        Ok(client)
    }

    fn validate(&self, request: &JoinRequest) -> Result<(), JoinError> {
        self.hub
            .directory()
            .inspect(&request.room_id, |room| {
                if !room.password_matches(request.password.as_deref()) {
                    return Err(JoinError::InvalidPassword);
                }
                if room.is_full() {
                    return Err(JoinError::RoomFull);
                }
                Ok(())
            })
            .unwrap_or(Err(JoinError::RoomNotFound))
    }
}

/// Tell a refused client why, then close its connection.
pub async fn reject<W>(writer: &mut W, error: &JoinError)
where
    W: FrameWriter + ?Sized,
{
    if error.is_reportable() {
        match codec::encode(&ErrorFrame::new(error.to_string())) {
            Ok(text) => {
                if let Err(e) = writer.send_text(text).await {
                    debug!(error = %e, "Could not deliver join error");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode join error"),
        }
    }
    let _ = writer.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::room::RoomSpec;
    use parlor_transport::memory::{self, PeerEvent};
    use parlor_transport::ConnectionId;

    fn client(name: &str) -> Client {
        Client::new(ConnectionId::generate(), name)
    }

    struct Attempt {
        result: Result<Client, JoinError>,
        phase: JoinPhase,
        // Keeps the outbound queue open so the member is not evicted
        _outbound: mpsc::Receiver<Payload>,
    }

    async fn attempt(hub: &Hub, frame: &str) -> Attempt {
        let (mut reader, _writer, peer) = memory::pair(8);
        peer.send(frame).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let mut negotiator = JoinNegotiator::new(hub, DEFAULT_JOIN_TIMEOUT);
        let result = negotiator.negotiate(&mut reader, client("A"), tx).await;
        Attempt {
            result,
            phase: negotiator.phase(),
            _outbound: rx,
        }
    }

    #[tokio::test]
    async fn test_join_success() {
        let hub = Hub::start(HubConfig::default());
        let room = hub.create_room(RoomSpec::new("lobby", 2), "owner").unwrap();

        let attempt = attempt(&hub, &format!(r#"{{"room_id":"{}"}}"#, room.id)).await;
        assert_eq!(attempt.phase, JoinPhase::Joined);
        let joined = attempt.result.unwrap();
        assert_eq!(joined.room(), Some(room.id.as_str()));
        assert_eq!(hub.room(&room.id).unwrap().member_count, 1);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let hub = Hub::start(HubConfig::default());
        let attempt = attempt(&hub, r#"{"room_id":"nope"}"#).await;
        assert!(matches!(attempt.result, Err(JoinError::RoomNotFound)));
        assert_eq!(attempt.phase, JoinPhase::Rejected);
    }

    #[tokio::test]
    async fn test_join_password() {
        let hub = Hub::start(HubConfig::default());
        let room = hub
            .create_room(RoomSpec::new("locked", 2).with_password("pw"), "owner")
            .unwrap();

        let bad = attempt(&hub, &format!(r#"{{"room_id":"{}","password":"bad"}}"#, room.id)).await;
        assert!(matches!(bad.result, Err(JoinError::InvalidPassword)));
        let missing = attempt(&hub, &format!(r#"{{"room_id":"{}"}}"#, room.id)).await;
        assert!(matches!(missing.result, Err(JoinError::InvalidPassword)));
        assert_eq!(hub.room(&room.id).unwrap().member_count, 0);

        let good = attempt(&hub, &format!(r#"{{"room_id":"{}","password":"pw"}}"#, room.id)).await;
        assert!(good.result.is_ok());
    }

    #[tokio::test]
    async fn test_password_checked_before_capacity() {
        let hub = Hub::start(HubConfig::default());
        let room = hub
            .create_room(RoomSpec::new("locked", 2).with_password("pw"), "owner")
            .unwrap();
        let ok = format!(r#"{{"room_id":"{}","password":"pw"}}"#, room.id);
        let first = attempt(&hub, &ok).await;
        let second = attempt(&hub, &ok).await;
        assert!(first.result.is_ok() && second.result.is_ok());

        let bad = attempt(&hub, &format!(r#"{{"room_id":"{}","password":"bad"}}"#, room.id)).await;
        assert!(matches!(bad.result, Err(JoinError::InvalidPassword)));
        let third = attempt(&hub, &ok).await;
        assert!(matches!(third.result, Err(JoinError::RoomFull)));
    }

    #[tokio::test]
    async fn test_join_malformed() {
        let hub = Hub::start(HubConfig::default());
        let garbage = attempt(&hub, "not json").await;
        assert!(matches!(garbage.result, Err(JoinError::InvalidRequest)));
        let no_room = attempt(&hub, r#"{"password":"pw"}"#).await;
        assert!(matches!(no_room.result, Err(JoinError::InvalidRequest)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout() {
        let hub = Hub::start(HubConfig::default());
        let (mut reader, _writer, _peer) = memory::pair(8);
        let (tx, _rx) = mpsc::channel(8);

        let mut negotiator = JoinNegotiator::new(&hub, Duration::from_secs(1));
        let result = negotiator.negotiate(&mut reader, client("A"), tx).await;
        assert!(matches!(result, Err(JoinError::Timeout)));
    }

    #[tokio::test]
    async fn test_join_peer_gone() {
        let hub = Hub::start(HubConfig::default());
        let (mut reader, _writer, mut peer) = memory::pair(8);
        peer.disconnect();
        let (tx, _rx) = mpsc::channel(8);

        let mut negotiator = JoinNegotiator::new(&hub, DEFAULT_JOIN_TIMEOUT);
        let result = negotiator.negotiate(&mut reader, client("A"), tx).await;
        let err = result.unwrap_err();
        assert!(!err.is_reportable());
    }

    #[tokio::test]
    async fn test_reject_sends_error_frame() {
        let (_reader, mut writer, mut peer) = memory::pair(8);
        reject(&mut writer, &JoinError::RoomFull).await;

        assert_eq!(
            peer.recv().await,
            Some(PeerEvent::Text(r#"{"error":"Room is full"}"#.to_string()))
        );
        assert_eq!(peer.recv().await, Some(PeerEvent::Close));
    }

    #[tokio::test]
    async fn test_reject_transport_error_only_closes() {
        let (_reader, mut writer, mut peer) = memory::pair(8);
        reject(&mut writer, &JoinError::Transport(TransportError::ConnectionClosed)).await;
        assert_eq!(peer.recv().await, Some(PeerEvent::Close));
    }
}
