//! Room abstraction for Parlor.
//!
//! A room is a named, optionally password-protected group of connections with
//! a fixed capacity. Rooms never hold more than `max_members` members.

use crate::message::{now_millis, Payload};
use parlor_transport::ConnectionId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 128;

/// Smallest allowed room capacity.
pub const MIN_ROOM_MEMBERS: usize = 2;

/// A room identifier.
pub type RoomId = String;

/// Parameters for creating a room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomSpec {
    /// Display name.
    pub name: String,
    /// Optional password. An empty password means none.
    #[serde(default)]
    pub password: Option<String>,
    /// Capacity, at least [`MIN_ROOM_MEMBERS`]. Accepts a number or a
    /// numeric string.
    #[serde(deserialize_with = "deserialize_capacity")]
    pub max_members: usize,
}

impl RoomSpec {
    /// Create a room spec without a password.
    #[must_use]
    pub fn new(name: impl Into<String>, max_members: usize) -> Self {
        Self {
            name: name.into(),
            password: None,
            max_members,
        }
    }

    /// Protect the room with a password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Validate and normalize the spec.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validated(mut self) -> Result<Self, &'static str> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err("Room name cannot be empty");
        }
        if self.name.len() > MAX_ROOM_NAME_LENGTH {
            return Err("Room name too long");
        }
        if self.max_members < MIN_ROOM_MEMBERS {
            return Err("Room must allow at least 2 members");
        }
        if self.password.as_deref() == Some("") {
            self.password = None;
        }
        Ok(self)
    }
}

fn deserialize_capacity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Capacity {
        Number(usize),
        Text(String),
    }

    match Capacity::deserialize(deserializer)? {
        Capacity::Number(n) => Ok(n),
        Capacity::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A room member as seen by the hub: a name and the sending side of its
/// outbound queue.
#[derive(Debug)]
pub struct Member {
    username: String,
    outbound: mpsc::Sender<Payload>,
}

impl Member {
    /// Create a member.
    #[must_use]
    pub fn new(username: impl Into<String>, outbound: mpsc::Sender<Payload>) -> Self {
        Self {
            username: username.into(),
            outbound,
        }
    }

    /// The member's display name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// A chat room.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: String,
    password: Option<String>,
    max_members: usize,
    members: HashMap<ConnectionId, Member>,
    owner: String,
    created_at: u64,
}

impl Room {
    /// Create an empty room from a validated spec.
    #[must_use]
    pub fn new(id: impl Into<RoomId>, spec: RoomSpec, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: spec.name,
            password: spec.password,
            max_members: spec.max_members,
            members: HashMap::new(),
            owner: owner.into(),
            created_at: now_millis(),
        }
    }

    /// Get the room ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity that created the room.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Creation time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Get the capacity.
    #[must_use]
    pub fn max_members(&self) -> usize {
        self.max_members
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if the room is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_members
    }

    /// Check if a password is required.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Check a supplied password. Rooms without a password accept anything.
    #[must_use]
    pub fn password_matches(&self, supplied: Option<&str>) -> bool {
        match &self.password {
            Some(expected) => supplied == Some(expected.as_str()),
            None => true,
        }
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Add a member.
    ///
    /// Returns the member back if the room is full.
    pub fn insert(&mut self, connection_id: ConnectionId, member: Member) -> Result<(), Member> {
        if self.is_full() {
            return Err(member);
        }
        debug!(room = %self.id, connection = %connection_id, user = %member.username, "Member added");
        self.members.insert(connection_id, member);
        Ok(())
    }

    /// Remove a member. Dropping the returned member closes its queue.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Member> {
        let removed = self.members.remove(connection_id);
        if removed.is_some() {
            debug!(room = %self.id, connection = %connection_id, "Member removed");
        }
        removed
    }

    /// Enqueue `payload` on every member's outbound queue without waiting.
    ///
    /// Members whose queue is full or already closed are removed and
    /// returned; delivery to everyone else is unaffected.
    pub fn deliver(&mut self, payload: &Payload) -> Vec<(ConnectionId, Member)> {
        let mut stalled = Vec::new();
        for (connection_id, member) in &self.members {
            match member.outbound.try_send(Payload::clone(payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(room = %self.id, connection = %connection_id, "Outbound queue full");
                    stalled.push(connection_id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(room = %self.id, connection = %connection_id, "Outbound queue closed");
                    stalled.push(connection_id.clone());
                }
            }
        }

        stalled
            .into_iter()
            .filter_map(|id| self.members.remove_entry(&id))
            .collect()
    }

    /// Public snapshot of the room. Never exposes membership.
    #[must_use]
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            member_count: self.members.len(),
            max_members: self.max_members,
            has_password: self.has_password(),
            owner: self.owner.clone(),
            created_at: self.created_at,
        }
    }
}

/// Listing entry for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Room ID.
    pub id: RoomId,
    /// Room name.
    pub name: String,
    /// Current number of members.
    #[serde(rename = "members")]
    pub member_count: usize,
    /// Capacity.
    pub max_members: usize,
    /// Whether joining needs a password.
    pub has_password: bool,
    /// Creator identity.
    #[serde(rename = "created_by")]
    pub owner: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
}
