//! Session and user types

use serde::{Deserialize, Serialize};
use std::ops::Deref;

// =============================================================================
// Session
// =============================================================================

/// User identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Stable user id
    pub id: String,
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
}

/// A session as resolved by the session collaborator.
///
/// A session may exist without a user (e.g. an anonymous visitor session);
/// only a session with a user passes [`auth_middleware`](super::auth_middleware).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id
    pub id: String,
    /// Signed-in user, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

impl Session {
    /// Session with a signed-in user.
    pub fn authenticated(id: impl Into<String>, user: SessionUser) -> Self {
        Self {
            id: id.into(),
            user: Some(user),
        }
    }

    /// Session without a user.
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: None,
        }
    }
}

// =============================================================================
// Auth User
// =============================================================================

/// The user the auth middleware derived from the session.
///
/// Present in the context of every procedure behind
/// [`auth_middleware`](super::auth_middleware).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub SessionUser);

impl Deref for AuthUser {
    type Target = SessionUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
