//! Metric names and recording helpers for the hub.
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! binary installs an exporter.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parlor_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parlor_connections_active";
    pub const MESSAGES_TOTAL: &str = "parlor_messages_total";
    pub const ROOMS_ACTIVE: &str = "parlor_rooms_active";
    pub const ROOMS_CREATED_TOTAL: &str = "parlor_rooms_created_total";
    pub const EVICTIONS_TOTAL: &str = "parlor_evictions_total";
    pub const JOIN_REJECTIONS_TOTAL: &str = "parlor_join_rejections_total";
    pub const COLLABORATOR_ERRORS_TOTAL: &str = "parlor_collaborator_errors_total";
}

/// Record a message passing through the hub.
pub fn record_message(direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
}

/// Record a room creation.
pub fn record_room_created() {
    counter!(names::ROOMS_CREATED_TOTAL).increment(1);
}

/// Update the active room gauge.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record a slow-consumer eviction.
pub fn record_eviction() {
    counter!(names::EVICTIONS_TOTAL).increment(1);
}

/// Record a rejected join.
pub fn record_join_rejected(reason: &'static str) {
    counter!(names::JOIN_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record a failed collaborator call.
pub fn record_collaborator_error(service: &'static str) {
    counter!(names::COLLABORATOR_ERRORS_TOTAL, "service" => service).increment(1);
}
