//! # parlor-core
//!
//! Room hub, join negotiation and connection pumps for the Parlor chat hub.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Room** - Capacity-bounded, optionally password-protected group of connections
//! - **Hub** - Single-writer coordinator for membership and fan-out
//! - **Join** - First-frame negotiation before a connection reaches the hub
//! - **Pump** - Per-connection reader and writer tasks
//! - **Session** - Drives a connection from accept to teardown
//! - **Presence** / **Auth** - Collaborator contracts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│    Join     │────▶│     Hub     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                  ▲        │
//!        ▼                                  │        ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Presence   │     │   Inbound   │     │  Outbound   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod hub;
pub mod join;
pub mod message;
pub mod presence;
pub mod pump;
pub mod room;
pub mod session;
pub mod telemetry;

pub use auth::{AuthService, StaticAuth};
pub use client::Client;
pub use error::{CollaboratorError, HubError, JoinError};
pub use hub::{Coordinator, Directory, Hub, HubConfig, HubStats};
pub use join::{JoinNegotiator, JoinPhase};
pub use message::{BroadcastEnvelope, Payload};
pub use presence::{LocalPresence, PresenceNotifier, PresenceService, SessionId, UserPresence};
pub use pump::{inbound_pump, outbound_pump, OutboundExit, PumpConfig};
pub use room::{Room, RoomId, RoomSpec, RoomSummary};
pub use session::{run_session, Identity, SessionConfig, SessionContext};
