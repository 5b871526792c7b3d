//! Session provider trait and the session-aware context factory

use crate::auth::types::Session;
use crate::context::{Context, ContextFactory, RequestMeta};
use crate::error::RpcResult;
use async_trait::async_trait;
use http::HeaderMap;
use std::sync::Arc;

// =============================================================================
// Session Provider Trait
// =============================================================================

/// Resolves the session a request belongs to.
///
/// Implemented by the host application; the core only reads the result.
///
/// # Example
///
/// ```rust,ignore
/// struct StaticSession(Session);
///
/// #[async_trait]
/// impl SessionProvider for StaticSession {
///     async fn get_session(&self, _headers: &HeaderMap) -> RpcResult<Option<Session>> {
///         Ok(Some(self.0.clone()))
///     }
/// }
/// ```
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// Look up the session for a request.
    ///
    /// Return `Ok(None)` for requests without a (valid) session; reserve
    /// errors for failures of the lookup itself.
    async fn get_session(&self, headers: &HeaderMap) -> RpcResult<Option<Session>>;
}

#[async_trait]
impl<P: SessionProvider + ?Sized> SessionProvider for Arc<P> {
    async fn get_session(&self, headers: &HeaderMap) -> RpcResult<Option<Session>> {
        (**self).get_session(headers).await
    }
}

// =============================================================================
// Session Context Factory
// =============================================================================

/// Context factory that seeds [`RequestMeta`] and, when there is one, the
/// request's [`Session`].
#[derive(Debug, Clone)]
pub struct SessionContextFactory<P> {
    provider: P,
}

impl<P: SessionProvider> SessionContextFactory<P> {
    /// Create a factory backed by `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: SessionProvider> ContextFactory for SessionContextFactory<P> {
    async fn create(&self, meta: &RequestMeta) -> RpcResult<Context> {
        let ctx = Context::new().extend(meta.clone())?;
        match self.provider.get_session(&meta.headers).await? {
            Some(session) => {
                tracing::trace!(
                    session_id = %session.id,
                    has_user = session.user.is_some(),
                    "Session resolved"
                );
                ctx.extend(session)
            }
            None => Ok(ctx),
        }
    }
}
