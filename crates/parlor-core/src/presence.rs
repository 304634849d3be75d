//! Presence tracking.
//!
//! Presence lives in an external service reached through [`PresenceService`].
//! The chat path only talks to it through [`PresenceNotifier`], which bounds
//! every call with a deadline and swallows failures after logging them.
//! [`LocalPresence`] is the in-process implementation used when no external
//! service is configured.

use crate::error::CollaboratorError;
use crate::message::now_millis;
use crate::telemetry;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Correlates the online and offline updates of one connection lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Presence of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    /// User ID.
    pub user_id: String,
    /// Whether at least one session is open.
    pub online: bool,
    /// Last presence change in milliseconds since the Unix epoch, 0 if never seen.
    pub last_active: u64,
    /// Number of open sessions.
    pub active_connections: usize,
}

impl UserPresence {
    fn offline(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            online: false,
            last_active: 0,
            active_connections: 0,
        }
    }
}

/// Contract of the presence service.
#[async_trait]
pub trait PresenceService: Send + Sync {
    /// Mark a session of `user_id` online or offline.
    async fn update_presence(
        &self,
        user_id: &str,
        online: bool,
        session_id: &SessionId,
    ) -> Result<bool, CollaboratorError>;

    /// Look up the presence of several users, in request order.
    async fn get_presence(&self, user_ids: &[String]) -> Result<Vec<UserPresence>, CollaboratorError>;
}

/// Best-effort presence updates for the chat path.
#[derive(Clone)]
pub struct PresenceNotifier {
    service: Option<Arc<dyn PresenceService>>,
    timeout: Duration,
}

impl PresenceNotifier {
    /// Create a notifier backed by `service`.
    #[must_use]
    pub fn new(service: Arc<dyn PresenceService>, timeout: Duration) -> Self {
        Self {
            service: Some(service),
            timeout,
        }
    }

    /// Create a notifier that does nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            service: None,
            timeout: Duration::ZERO,
        }
    }

    /// Report a session as online. Returns whether the service accepted it.
    pub async fn online(&self, user_id: &str, session_id: &SessionId) -> bool {
        self.update(user_id, true, session_id).await
    }

    /// Report a session as offline. Returns whether the service accepted it.
    pub async fn offline(&self, user_id: &str, session_id: &SessionId) -> bool {
        self.update(user_id, false, session_id).await
    }

    async fn update(&self, user_id: &str, online: bool, session_id: &SessionId) -> bool {
        let Some(service) = &self.service else {
            return false;
        };

        let call = service.update_presence(user_id, online, session_id);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout),
        };

        match result {
            Ok(success) => {
                debug!(user = %user_id, session = %session_id, online, "Presence updated");
                success
            }
            Err(e) => {
                warn!(user = %user_id, session = %session_id, online, error = %e, "Presence update failed");
                telemetry::record_collaborator_error("presence");
                false
            }
        }
    }
}

#[derive(Debug)]
struct Entry {
    sessions: HashSet<SessionId>,
    last_active: u64,
}

/// In-process presence service.
///
/// A user is online while at least one of their sessions is open.
#[derive(Debug, Default)]
pub struct LocalPresence {
    users: DashMap<String, Entry>,
}

impl LocalPresence {
    /// Create an empty presence tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with at least one open session.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.users
            .iter()
            .filter(|entry| !entry.sessions.is_empty())
            .count()
    }

    /// Presence of a single user.
    #[must_use]
    pub fn lookup(&self, user_id: &str) -> UserPresence {
        match self.users.get(user_id) {
            Some(entry) => UserPresence {
                user_id: user_id.to_string(),
                online: !entry.sessions.is_empty(),
                last_active: entry.last_active,
                active_connections: entry.sessions.len(),
            },
            None => UserPresence::offline(user_id),
        }
    }
}

#[async_trait]
impl PresenceService for LocalPresence {
    async fn update_presence(
        &self,
        user_id: &str,
        online: bool,
        session_id: &SessionId,
    ) -> Result<bool, CollaboratorError> {
        if user_id.is_empty() {
            return Err(CollaboratorError::Rejected("empty user id".to_string()));
        }

        let mut entry = self.users.entry(user_id.to_string()).or_insert_with(|| Entry {
            sessions: HashSet::new(),
            last_active: 0,
        });
        if online {
            entry.sessions.insert(session_id.clone());
        } else {
            entry.sessions.remove(session_id);
        }
        entry.last_active = now_millis();

        debug!(
            user = %user_id,
            sessions = entry.sessions.len(),
            "Local presence changed"
        );
        Ok(true)
    }

    async fn get_presence(&self, user_ids: &[String]) -> Result<Vec<UserPresence>, CollaboratorError> {
        Ok(user_ids.iter().map(|id| self.lookup(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl PresenceService for Unreachable {
        async fn update_presence(
            &self,
            _user_id: &str,
            _online: bool,
            _session_id: &SessionId,
        ) -> Result<bool, CollaboratorError> {
            Err(CollaboratorError::Unavailable("connection refused".to_string()))
        }

        async fn get_presence(&self, _user_ids: &[String]) -> Result<Vec<UserPresence>, CollaboratorError> {
            Err(CollaboratorError::Unavailable("connection refused".to_string()))
        }
    }

    struct Stalled;

    #[async_trait]
    impl PresenceService for Stalled {
        async fn update_presence(
            &self,
            _user_id: &str,
            _online: bool,
            _session_id: &SessionId,
        ) -> Result<bool, CollaboratorError> {
            std::future::pending().await
        }

        async fn get_presence(&self, _user_ids: &[String]) -> Result<Vec<UserPresence>, CollaboratorError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_local_presence_sessions() {
        let presence = LocalPresence::new();
        let first = SessionId::generate();
        let second = SessionId::generate();

        presence.update_presence("u1", true, &first).await.unwrap();
        presence.update_presence("u1", true, &second).await.unwrap();
        assert_eq!(presence.lookup("u1").active_connections, 2);

        presence.update_presence("u1", false, &first).await.unwrap();
        assert!(presence.lookup("u1").online);

        presence.update_presence("u1", false, &second).await.unwrap();
        let state = presence.lookup("u1");
        assert!(!state.online);
        assert!(state.last_active > 0);
        assert_eq!(presence.online_count(), 0);
    }

    #[tokio::test]
    async fn test_get_presence_keeps_order() {
        let presence = LocalPresence::new();
        presence
            .update_presence("b", true, &SessionId::generate())
            .await
            .unwrap();

        let ids = vec!["a".to_string(), "b".to_string()];
        let result = presence.get_presence(&ids).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], UserPresence::offline("a"));
        assert!(result[1].online);
    }

    #[tokio::test]
    async fn test_notifier_swallows_failures() {
        let notifier = PresenceNotifier::new(Arc::new(Unreachable), Duration::from_secs(1));
        assert!(!notifier.online("u1", &SessionId::generate()).await);

        assert!(!PresenceNotifier::disabled().online("u1", &SessionId::generate()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_times_out() {
        let notifier = PresenceNotifier::new(Arc::new(Stalled), Duration::from_millis(50));
        assert!(!notifier.offline("u1", &SessionId::generate()).await);
    }

    #[tokio::test]
    async fn test_notifier_reaches_service() {
        let presence = Arc::new(LocalPresence::new());
        let notifier = PresenceNotifier::new(presence.clone(), Duration::from_secs(1));
        let session = SessionId::generate();

        assert!(notifier.online("u1", &session).await);
        assert!(presence.lookup("u1").online);
        assert!(notifier.offline("u1", &session).await);
        assert!(!presence.lookup("u1").online);
    }
}
