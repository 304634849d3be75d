//! Connection sessions.
//!
//! [`run_session`] drives one connection from accept to teardown: join
//! negotiation, registration, presence, both pumps, and cleanup.

use crate::client::Client;
use crate::error::JoinError;
use crate::hub::Hub;
use crate::join::{reject, JoinNegotiator, DEFAULT_JOIN_TIMEOUT};
use crate::presence::{PresenceNotifier, SessionId};
use crate::pump::{inbound_pump, outbound_pump, PumpConfig};
use parlor_transport::{ConnectionId, FrameReader, FrameWriter};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Who is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user ID, reported to presence.
    pub user_id: String,
    /// Display name shown to the room.
    pub username: String,
}

impl Identity {
    /// Create an identity.
    #[must_use]
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Time allowed for the join request.
    pub join_timeout: Duration,
    /// Capacity of each client's outbound queue.
    pub outbound_capacity: usize,
    /// Outbound pump timing.
    pub pump: PumpConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            outbound_capacity: 256,
            pump: PumpConfig::default(),
        }
    }
}

/// Shared handles every session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// The hub.
    pub hub: Hub,
    /// Presence updates.
    pub presence: PresenceNotifier,
    /// Settings.
    pub config: SessionConfig,
}

impl SessionContext {
    /// Create a context without presence reporting.
    #[must_use]
    pub fn new(hub: Hub, config: SessionConfig) -> Self {
        Self {
            hub,
            presence: PresenceNotifier::disabled(),
            config,
        }
    }

    /// Report sessions to `presence`.
    #[must_use]
    pub fn with_presence(mut self, presence: PresenceNotifier) -> Self {
        self.presence = presence;
        self
    }
}

/// Serve one connection until it closes.
///
/// # Errors
///
/// Returns the join error if the connection was refused. The client has
/// already been sent an error frame and the connection closed.
pub async fn run_session<R, W>(
    mut reader: R,
    mut writer: W,
    identity: Identity,
    ctx: SessionContext,
) -> Result<(), JoinError>
where
    R: FrameReader + 'static,
    W: FrameWriter + 'static,
{
    let connection_id = ConnectionId::generate();
    let client = Client::new(connection_id.clone(), &identity.username);
    let (outbound_tx, outbound_rx) = mpsc::channel(ctx.config.outbound_capacity.max(1));

    let mut negotiator = JoinNegotiator::new(&ctx.hub, ctx.config.join_timeout);
    let client = match negotiator.negotiate(&mut reader, client, outbound_tx).await {
        Ok(client) => client,
        Err(e) => {
            debug!(connection = %connection_id, user = %identity.username, error = %e, "Connection refused");
            reject(&mut writer, &e).await;
            return Err(e);
        }
    };

    let session_id = SessionId::generate();
    info!(
        connection = %connection_id,
        room = client.room().unwrap_or_default(),
        user = %identity.username,
        "Client joined"
    );

    let mut outbound = tokio::spawn(outbound_pump(
        writer,
        outbound_rx,
        ctx.config.pump,
        connection_id.clone(),
    ));
    let mut inbound = tokio::spawn(inbound_pump(reader, ctx.hub.clone(), client.clone()));

    ctx.presence.online(&identity.user_id, &session_id).await;

    tokio::select! {
        _ = &mut inbound => {
            // The inbound pump unregistered; the hub closes the queue next
            let _ = (&mut outbound).await;
        }
        exit = &mut outbound => {
            if matches!(exit, Ok(exit) if exit.is_failure()) {
                ctx.hub.unregister(&client).await;
            }
            // Give the peer a chance to answer our close frame
            if tokio::time::timeout(ctx.config.pump.write_timeout, &mut inbound).await.is_err() {
                inbound.abort();
                ctx.hub.unregister(&client).await;
            }
        }
    }

    ctx.presence.offline(&identity.user_id, &session_id).await;
    info!(connection = %connection_id, user = %identity.username, "Client left");
    Ok(())
}
