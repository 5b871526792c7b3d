//! Authentication middleware

use crate::auth::types::{AuthUser, Session};
use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::middleware::{BoxFuture, Middleware, Next, Request, Response};
use std::sync::Arc;

/// Middleware requiring a session with a user.
///
/// Short-circuits with UNAUTHORIZED when the context has no [`Session`] or
/// the session has no user; otherwise extends the context with [`AuthUser`]
/// and calls next.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthMiddleware;

/// Create the authentication middleware.
///
/// # Example
///
/// ```rust,ignore
/// let protected = implement(&contract).use_middleware(auth_middleware());
/// ```
pub fn auth_middleware() -> AuthMiddleware {
    AuthMiddleware
}

impl Middleware for AuthMiddleware {
    fn handle(&self, ctx: Context, req: Arc<Request>, next: Next) -> BoxFuture<RpcResult<Response>> {
        Box::pin(async move {
            let user = ctx.get::<Session>().and_then(|session| session.user.clone());

            let Some(user) = user else {
                tracing::debug!(
                    path = %req.path,
                    has_session = ctx.contains::<Session>(),
                    "Authentication failed: no signed-in user"
                );
                return Err(RpcError::unauthorized("Authentication required"));
            };

            tracing::trace!(path = %req.path, user_id = %user.id, "Authentication successful");
            next.run(ctx.extend(AuthUser(user))?).await
        })
    }
}
