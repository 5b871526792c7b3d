//! In-memory session store
//!
//! Stands in for the authentication provider: it maps opaque tokens to
//! sessions and answers the dispatcher's session lookups. Tokens arrive as
//! `Authorization: Bearer <token>` or in the `session_token` cookie.
//!
//! The store never signs anyone in by itself: the sign-in flow calls
//! [`InMemorySessionStore::create`] and hands the token to the user. For
//! local development, `DEV_SESSION_TOKEN` seeds one session at start-up
//! (see [`ServerConfig`](crate::ServerConfig)).

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use chrono::{DateTime, Duration, Utc};
use contract_rpc::{RpcResult, Session, SessionProvider, SessionUser};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug, Clone)]
struct StoredSession {
    session: Session,
    expires_at: DateTime<Utc>,
}

impl StoredSession {
    fn new(user: SessionUser, ttl: Duration) -> Self {
        Self {
            session: Session::authenticated(uuid::Uuid::new_v4().to_string(), user),
            expires_at: Utc::now() + ttl,
        }
    }
}

/// Token-keyed session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding one session for `user` under `token`.
    pub fn with_session(token: impl Into<String>, user: SessionUser, ttl: Duration) -> Self {
        let stored = StoredSession::new(user, ttl);
        debug!(session_id = %stored.session.id, "Session seeded");
        Self {
            sessions: RwLock::new(HashMap::from([(token.into(), stored)])),
        }
    }

    /// Sign `user` in for `ttl`, returning the session token.
    pub async fn create(&self, user: SessionUser, ttl: Duration) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let stored = StoredSession::new(user, ttl);
        debug!(session_id = %stored.session.id, expires_at = %stored.expires_at, "Session created");
        self.sessions.write().await.insert(token.clone(), stored);
        token
    }

    /// Drop the session behind `token`. Returns whether there was one.
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// The live session behind `token`.
    pub async fn lookup(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        let stored = sessions.get(token)?;
        if stored.expires_at <= Utc::now() {
            trace!(session_id = %stored.session.id, "Session expired");
            return None;
        }
        Some(stored.session.clone())
    }

    /// Remove expired sessions, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);
        before - sessions.len()
    }

    /// Number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// The session token of a request, from the bearer header or the cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl SessionProvider for InMemorySessionStore {
    async fn get_session(&self, headers: &HeaderMap) -> RpcResult<Option<Session>> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };
        Ok(self.lookup(token).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ada() -> SessionUser {
        SessionUser {
            id: "1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        }
    }

    #[test]
    fn token_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session_token=abc"));
        assert_eq!(session_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(session_token(&headers), Some("abc"));
    }

    #[tokio::test]
    async fn sessions_resolve_until_revoked() {
        let store = InMemorySessionStore::new();
        let token = store.create(ada(), Duration::hours(1)).await;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token)).unwrap());

        let session = store.get_session(&headers).await.unwrap().unwrap();
        assert_eq!(session.user, Some(ada()));

        assert!(store.revoke(&token).await);
        assert_eq!(store.get_session(&headers).await.unwrap(), None);
    }

    #[tokio::test]
    async fn seeded_session_resolves_by_its_token() {
        let store = InMemorySessionStore::with_session("dev-token", ada(), Duration::hours(1));
        assert_eq!(store.len().await, 1);

        let session = store.lookup("dev-token").await.unwrap();
        assert_eq!(session.user, Some(ada()));
        assert_eq!(store.lookup("other").await, None);
    }

    #[tokio::test]
    async fn expired_sessions_are_ignored() {
        let store = InMemorySessionStore::new();
        let token = store.create(ada(), Duration::seconds(-1)).await;

        assert_eq!(store.lookup(&token).await, None);
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }
}
