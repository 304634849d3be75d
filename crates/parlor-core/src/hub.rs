//! The hub coordinator.
//!
//! The hub owns the room directory. Membership changes and fan-out are
//! applied by a single coordinator task that drains one bounded command
//! queue, so two mutations of the same room never interleave. Room creation
//! and listing go straight to the directory; each directory operation holds
//! the lock of the affected shard, which keeps a departure and the deletion
//! of the emptied room a single step for concurrent readers.

use crate::client::Client;
use crate::error::{HubError, JoinError};
use crate::message::{encode_frame, BroadcastEnvelope, Payload};
use crate::room::{Member, Room, RoomId, RoomSpec, RoomSummary};
use crate::telemetry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parlor_protocol::ServerFrame;
use parlor_transport::ConnectionId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the coordinator's command queue.
    pub queue_capacity: usize,
    /// Maximum number of rooms in the directory.
    pub max_rooms: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_rooms: 10_000,
        }
    }
}

/// The room directory: room ID to room.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    rooms: Arc<DashMap<RoomId, Room>>,
}

impl Directory {
    /// Number of rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Check if there are no rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Run `f` against a room while holding its read lock.
    pub fn inspect<R>(&self, room_id: &str, f: impl FnOnce(&Room) -> R) -> Option<R> {
        self.rooms.get(room_id).map(|room| f(room.value()))
    }

    /// Snapshot every room.
    #[must_use]
    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms.iter().map(|entry| entry.summary()).collect()
    }
}

enum HubCommand {
    Register {
        client: Client,
        outbound: mpsc::Sender<Payload>,
        respond_to: oneshot::Sender<Result<(), JoinError>>,
    },
    Unregister {
        client: Client,
    },
    Broadcast(BroadcastEnvelope),
    Flush {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to the hub.
///
/// Cheap to clone; every clone feeds the same coordinator.
#[derive(Clone)]
pub struct Hub {
    directory: Directory,
    commands: mpsc::Sender<HubCommand>,
    config: Arc<HubConfig>,
    creating: Arc<Mutex<()>>,
}

impl Hub {
    /// Create a hub and spawn its coordinator on the current runtime.
    #[must_use]
    pub fn start(config: HubConfig) -> Self {
        let (hub, coordinator) = Self::new(config);
        tokio::spawn(coordinator.run());
        hub
    }

    /// Create a hub and the coordinator that must be run for it to make
    /// progress.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, Coordinator) {
        info!("Creating hub with config: {:?}", config);
        let directory = Directory::default();
        let (commands, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let hub = Self {
            directory: directory.clone(),
            commands,
            config: Arc::new(config),
            creating: Arc::default(),
        };
        let coordinator = Coordinator {
            directory,
            commands: receiver,
        };
        (hub, coordinator)
    }

    /// Get the room directory.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Add a client to the room it carries and announce it to the room.
    ///
    /// `outbound` becomes the client's outbound queue; the hub holds its only
    /// sender, so removing the client closes the queue. Existence and
    /// capacity are checked again when the registration is applied. A client
    /// without a room is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::RoomNotFound`] or [`JoinError::RoomFull`] if the
    /// room changed since negotiation, or [`JoinError::Unavailable`] if the
    /// coordinator is gone.
    pub async fn register(
        &self,
        client: &Client,
        outbound: mpsc::Sender<Payload>,
    ) -> Result<(), JoinError> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(HubCommand::Register {
                client: client.clone(),
                outbound,
                respond_to,
            })
            .await
            .map_err(|_| JoinError::Unavailable)?;
        response.await.map_err(|_| JoinError::Unavailable)?
    }

    /// Remove a client from its room. Repeated calls are harmless.
    pub async fn unregister(&self, client: &Client) {
        let command = HubCommand::Unregister {
            client: client.clone(),
        };
        if self.commands.send(command).await.is_err() {
            warn!(connection = %client.id, "Hub stopped before unregister");
        }
    }

    /// Queue a payload for every member of `room_id`.
    pub async fn broadcast(&self, room_id: &str, payload: Payload) {
        let command = HubCommand::Broadcast(BroadcastEnvelope::new(room_id, payload));
        if self.commands.send(command).await.is_err() {
            warn!(room = %room_id, "Hub stopped, dropping broadcast");
        }
    }

    /// Queue a payload submitted by `client` for every member of its room.
    ///
    /// The payload is dropped if the client is no longer a member when the
    /// coordinator gets to it, e.g. after it was evicted.
    pub async fn broadcast_from(&self, client: &Client, payload: Payload) {
        let Some(room_id) = client.room() else {
            return;
        };
        let envelope = BroadcastEnvelope::new(room_id, payload).from_member(client.id.clone());
        if self.commands.send(HubCommand::Broadcast(envelope)).await.is_err() {
            warn!(connection = %client.id, room = %room_id, "Hub stopped, dropping broadcast");
        }
    }

    /// Wait until every command queued before this call has been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator is gone.
    pub async fn flush(&self) -> Result<(), HubError> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(HubCommand::Flush { respond_to })
            .await
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Create a room and insert it into the directory.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name or a capacity below two,
    /// or [`HubError::TooManyRooms`] when the directory is full.
    pub fn create_room(&self, spec: RoomSpec, owner: &str) -> Result<RoomSummary, HubError> {
        let spec = spec.validated().map_err(HubError::Validation)?;

        // Deletions only shrink the directory, so holding the creation lock
        // across the check and the insert keeps the cap exact
        let _creating = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        if self.directory.len() >= self.config.max_rooms {
            return Err(HubError::TooManyRooms);
        }

        let id = Uuid::new_v4().to_string();
        let room = Room::new(id.clone(), spec, owner);
        let summary = room.summary();
        self.directory.rooms.insert(id, room);

        telemetry::record_room_created();
        telemetry::set_active_rooms(self.directory.len());
        info!(room = %summary.id, name = %summary.name, owner = %owner, "Room created");

        Ok(summary)
    }

    /// Snapshot of every room.
    #[must_use]
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.directory.summaries()
    }

    /// Snapshot of one room.
    #[must_use]
    pub fn room(&self, room_id: &str) -> Option<RoomSummary> {
        self.directory.inspect(room_id, Room::summary)
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let (room_count, member_count) = self
            .directory
            .rooms
            .iter()
            .fold((0, 0), |(rooms, members), entry| {
                (rooms + 1, members + entry.member_count())
            });
        HubStats {
            room_count,
            member_count,
        }
    }
}

/// The single writer of room membership.
pub struct Coordinator {
    directory: Directory,
    commands: mpsc::Receiver<HubCommand>,
}

impl Coordinator {
    /// Apply commands until every [`Hub`] handle has been dropped.
    pub async fn run(mut self) {
        debug!("Hub coordinator started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("Hub coordinator stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                client,
                outbound,
                respond_to,
            } => {
                let result = self.register(&client, outbound);
                // The negotiator may have given up already
                let _ = respond_to.send(result);
            }
            HubCommand::Unregister { client } => self.unregister(&client),
            HubCommand::Broadcast(envelope) => {
                if let Some(sender) = &envelope.sender {
                    if !self.is_member(&envelope.room_id, sender) {
                        trace!(connection = %sender, room = %envelope.room_id, "Broadcast from non-member dropped");
                        return;
                    }
                }
                telemetry::record_message("broadcast");
                self.fan_out(&envelope.room_id, envelope.payload);
            }
            HubCommand::Flush { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    fn is_member(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        self.directory
            .inspect(room_id, |room| room.contains(connection_id))
            .unwrap_or(false)
    }

    fn register(&mut self, client: &Client, outbound: mpsc::Sender<Payload>) -> Result<(), JoinError> {
        let Some(room_id) = client.room() else {
            debug!(connection = %client.id, "Register without a room ignored");
            return Ok(());
        };

        {
            let Some(mut room) = self.directory.rooms.get_mut(room_id) else {
                return Err(JoinError::RoomNotFound);
            };
            if room.contains(&client.id) {
                return Ok(());
            }
            room.insert(client.id.clone(), Member::new(&client.username, outbound))
                .map_err(|_| JoinError::RoomFull)?;
        }

        if let Some(notice) = encode_frame(&ServerFrame::joined(&client.username)) {
            self.fan_out(room_id, notice);
        }
        Ok(())
    }

    fn unregister(&mut self, client: &Client) {
        let Some(room_id) = client.room() else {
            return;
        };

        let (member, deleted) = match self.directory.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let member = entry.get_mut().remove(&client.id);
                let deleted = member.is_some() && entry.get().is_empty();
                if deleted {
                    entry.remove();
                }
                (member, deleted)
            }
            Entry::Vacant(_) => (None, false),
        };

        let Some(member) = member else {
            trace!(connection = %client.id, room = %room_id, "Already unregistered");
            return;
        };
        let username = member.username().to_string();
        // Closes the outbound queue
        drop(member);

        if deleted {
            telemetry::set_active_rooms(self.directory.len());
            info!(room = %room_id, "Deleted empty room");
            return;
        }

        if let Some(notice) = encode_frame(&ServerFrame::left(&username)) {
            self.fan_out(room_id, notice);
        }
    }

    fn fan_out(&mut self, room_id: &str, payload: Payload) {
        let mut pending = VecDeque::from([payload]);

        while let Some(payload) = pending.pop_front() {
            let evicted = match self.directory.rooms.entry(room_id.to_string()) {
                Entry::Occupied(mut entry) => {
                    let evicted = entry.get_mut().deliver(&payload);
                    if !evicted.is_empty() && entry.get().is_empty() {
                        entry.remove();
                        telemetry::set_active_rooms(self.directory.len());
                        info!(room = %room_id, "Deleted room emptied by eviction");
                    }
                    evicted
                }
                Entry::Vacant(_) => {
                    trace!(room = %room_id, "Broadcast to unknown room dropped");
                    return;
                }
            };

            for (connection_id, member) in evicted {
                warn!(
                    room = %room_id,
                    connection = %connection_id,
                    user = %member.username(),
                    "Evicted slow consumer"
                );
                telemetry::record_eviction();
                if let Some(notice) = encode_frame(&ServerFrame::left(member.username())) {
                    pending.push_back(notice);
                }
            }
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    /// Number of rooms in the directory.
    pub room_count: usize,
    /// Number of registered members across all rooms.
    pub member_count: usize,
}
