//! Per-connection pumps.
//!
//! Every joined connection runs two tasks. The inbound pump is the only
//! reader of the connection and turns chat commands into hub broadcasts. The
//! outbound pump is the only writer: it drains the client's outbound queue
//! and keeps the connection alive with pings when the queue is quiet.
//!
//! ```text
//!   socket ──▶ inbound_pump ──▶ Hub ──▶ outbound queue ──▶ outbound_pump ──▶ socket
//! ```

use crate::client::Client;
use crate::hub::Hub;
use crate::message::{encode_frame, now_millis, Payload};
use crate::telemetry;
use parlor_protocol::{codec, Action, ClientCommand, ServerFrame, MAX_COMMAND_SIZE};
use parlor_transport::{ConnectionId, FrameReader, FrameWriter, TransportError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Outbound pump timing.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Quiet period after which a ping is sent.
    pub keepalive_interval: Duration,
    /// Deadline for a single write.
    pub write_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(15),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Why an outbound pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// The hub closed the queue; a close frame was sent.
    QueueClosed,
    /// A write failed.
    WriteFailed,
    /// A write missed its deadline.
    WriteTimedOut,
}

impl OutboundExit {
    /// Whether the connection broke rather than being closed by the hub.
    #[must_use]
    pub fn is_failure(self) -> bool {
        !matches!(self, OutboundExit::QueueClosed)
    }
}

/// Write queued payloads to `writer` until the queue closes or a write fails.
pub async fn outbound_pump<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Payload>,
    config: PumpConfig,
    connection_id: ConnectionId,
) -> OutboundExit
where
    W: FrameWriter,
{
    let period = config.keepalive_interval;
    let mut keepalive = interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            payload = queue.recv() => {
                let Some(payload) = payload else {
                    debug!(connection = %connection_id, "Outbound queue closed");
                    let _ = deadline(config.write_timeout, writer.close()).await;
                    break OutboundExit::QueueClosed;
                };
                if let Err(exit) = deadline(config.write_timeout, writer.send_text(payload.to_string())).await {
                    break exit;
                }
                telemetry::record_message("outbound");
                keepalive.reset();
            }
            _ = keepalive.tick() => {
                if let Err(exit) = deadline(config.write_timeout, writer.send_ping()).await {
                    break exit;
                }
                trace!(connection = %connection_id, "Keepalive ping");
            }
        }
    };

    if exit.is_failure() {
        debug!(connection = %connection_id, ?exit, "Outbound pump stopped");
    }
    exit
}

async fn deadline<F>(limit: Duration, write: F) -> Result<(), OutboundExit>
where
    F: Future<Output = Result<(), TransportError>>,
{
    match tokio::time::timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            trace!(error = %e, "Write failed");
            Err(OutboundExit::WriteFailed)
        }
        Err(_) => Err(OutboundExit::WriteTimedOut),
    }
}

/// Read commands from `reader` until the connection ends, then unregister
/// the client.
pub async fn inbound_pump<R>(mut reader: R, hub: Hub, client: Client)
where
    R: FrameReader,
{
    loop {
        match reader.recv().await {
            Ok(Some(text)) => handle_command(&hub, &client, &text).await,
            Ok(None) => {
                debug!(connection = %client.id, "Peer closed connection");
                break;
            }
            Err(e) => {
                debug!(connection = %client.id, error = %e, "Read failed");
                break;
            }
        }
    }

    hub.unregister(&client).await;
}

async fn handle_command(hub: &Hub, client: &Client, text: &str) {
    if text.len() > MAX_COMMAND_SIZE {
        warn!(connection = %client.id, size = text.len(), "Skipping oversized command");
        return;
    }
    let command: ClientCommand = match codec::decode(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(connection = %client.id, error = %e, "Skipping malformed command");
            return;
        }
    };

    match command.action {
        Action::Message => {
            if client.room().is_none() {
                return;
            }
            let frame = ServerFrame::chat(&client.username, command.content, now_millis());
            if let Some(payload) = encode_frame(&frame) {
                telemetry::record_message("inbound");
                hub.broadcast_from(client, payload).await;
            }
        }
        Action::Join => {
            trace!(connection = %client.id, "Join action after negotiation ignored");
        }
        Action::Other(action) => {
            debug!(connection = %client.id, action = %action, "Unknown action ignored");
        }
    }
}
