//! Authentication collaborator.
//!
//! The hub never authenticates anyone itself; the server asks an
//! [`AuthService`] before upgrading a connection and on login.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Contract of the authentication service.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Check a username/password pair.
    async fn authenticate_user(&self, username: &str, password: &str) -> Result<bool, CollaboratorError>;

    /// Check a bearer token.
    async fn validate_token(&self, token: &str) -> Result<bool, CollaboratorError>;
}

/// Authentication against a fixed set of users and tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    users: HashMap<String, String>,
    tokens: HashSet<String>,
    open: bool,
}

impl StaticAuth {
    /// Create an authenticator from known credentials.
    #[must_use]
    pub fn new(users: HashMap<String, String>, tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            users,
            tokens: tokens.into_iter().collect(),
            open: false,
        }
    }

    /// Create an authenticator that accepts every token.
    ///
    /// Logins are still checked against `users`.
    #[must_use]
    pub fn open(users: HashMap<String, String>) -> Self {
        Self {
            users,
            tokens: HashSet::new(),
            open: true,
        }
    }
}

#[async_trait]
impl AuthService for StaticAuth {
    async fn authenticate_user(&self, username: &str, password: &str) -> Result<bool, CollaboratorError> {
        Ok(self
            .users
            .get(username)
            .is_some_and(|expected| expected == password))
    }

    async fn validate_token(&self, token: &str) -> Result<bool, CollaboratorError> {
        if self.open {
            return Ok(true);
        }
        Ok(!token.is_empty() && self.tokens.contains(token))
    }
}
