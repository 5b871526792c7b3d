//! Middleware support for request/response processing
//!
//! A middleware receives the current [`Context`], the [`Request`] being
//! served and a [`Next`] handle. It either calls [`Next::run`] exactly once,
//! usually with an extended context, and returns what it yields, or it
//! short-circuits by returning an error without calling it.
//!
//! The chain is an ordered slice. Each [`Next`] holds the index of the
//! following middleware, so the chain nests: a middleware's future stays
//! alive around the rest of the chain and can act on its result. Every
//! [`Next`] carries a call-once flag, so misuse is detected instead of
//! producing two responses:
//!
//! - calling `run` a second time returns INTERNAL and poisons the invocation,
//!   so the caller gets INTERNAL even if the middleware discards that error;
//! - returning `Ok` without having called `run` is INTERNAL as well;
//! - a context passed to `run` must keep every entry the middleware received,
//!   otherwise `run` returns INTERNAL without going further down the chain
//!   and the invocation is poisoned the same way.

use crate::context::{Context, RequestMeta};
use crate::error::{RpcError, RpcResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{trace, warn};

/// Boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Response type (JSON value)
pub type Response = serde_json::Value;

/// Request information passed to middleware
#[derive(Clone, Debug)]
pub struct Request {
    /// Dotted path of the procedure (e.g., "users.get")
    pub path: String,
    /// Raw input, not yet checked against the input schema
    pub input: serde_json::Value,
    /// Transport metadata, absent for in-process calls
    pub meta: Option<RequestMeta>,
}

impl Request {
    /// Create a request without transport metadata
    pub fn new(path: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            input,
            meta: None,
        }
    }

    /// Attach transport metadata
    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Get the namespace (first part of path)
    pub fn namespace(&self) -> Option<&str> {
        self.path.split('.').next()
    }

    /// Get the procedure name (last part of path)
    pub fn procedure(&self) -> &str {
        self.path.split('.').next_back().unwrap_or(&self.path)
    }
}

/// Middleware function type
pub type MiddlewareFn =
    Arc<dyn Fn(Context, Arc<Request>, Next) -> BoxFuture<RpcResult<Response>> + Send + Sync>;

/// Innermost step of a chain, run once every middleware has called next.
pub type FinalHandler =
    Arc<dyn Fn(Context, Arc<Request>) -> BoxFuture<RpcResult<Response>> + Send + Sync>;

/// Trait for implementing custom middleware
pub trait Middleware: Send + Sync + 'static {
    /// Process the request, optionally calling next
    fn handle(&self, ctx: Context, req: Arc<Request>, next: Next) -> BoxFuture<RpcResult<Response>>;
}

/// Async functions and closures are middleware.
///
/// ```rust,ignore
/// let builder = implement(&contract).use_middleware(|ctx: Context, req: Arc<Request>, next: Next| async move {
///     tracing::info!(path = %req.path, "calling");
///     next.run(ctx).await
/// });
/// ```
impl<F, Fut> Middleware for F
where
    F: Fn(Context, Arc<Request>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Response>> + Send + 'static,
{
    fn handle(&self, ctx: Context, req: Arc<Request>, next: Next) -> BoxFuture<RpcResult<Response>> {
        Box::pin(self(ctx, req, next))
    }
}

/// Erase a middleware into a [`MiddlewareFn`].
pub fn from_fn<M: Middleware>(middleware: M) -> MiddlewareFn {
    let middleware = Arc::new(middleware);
    Arc::new(move |ctx, req, next| middleware.handle(ctx, req, next))
}

struct Invocation {
    middleware: Arc<[MiddlewareFn]>,
    handler: FinalHandler,
    request: Arc<Request>,
    violation: OnceLock<&'static str>,
}

impl Invocation {
    /// Record a contract violation; the chain result becomes INTERNAL.
    fn poison(&self, reason: &'static str) -> RpcError {
        let _ = self.violation.set(reason);
        RpcError::middleware_violation(reason)
    }
}

/// Handle to the rest of a middleware chain.
///
/// Cloning shares the call-once flag: whichever clone runs first wins and
/// any further run is a violation.
#[derive(Clone)]
pub struct Next {
    invocation: Arc<Invocation>,
    index: usize,
    upstream: Context,
    called: Arc<AtomicBool>,
}

impl Next {
    fn new(invocation: Arc<Invocation>, index: usize, upstream: Context) -> Self {
        Self {
            invocation,
            index,
            upstream,
            called: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the remaining middleware and the handler with `ctx`.
    pub async fn run(&self, ctx: Context) -> RpcResult<Response> {
        if self.called.swap(true, Ordering::SeqCst) {
            warn!(
                path = %self.invocation.request.path,
                position = self.index,
                "Middleware called next more than once"
            );
            return Err(self.invocation.poison("next was called more than once"));
        }
        if !ctx.retains(&self.upstream) {
            warn!(
                path = %self.invocation.request.path,
                position = self.index,
                "Middleware dropped or replaced an upstream context entry"
            );
            return Err(self
                .invocation
                .poison("context passed to next does not keep upstream entries"));
        }
        step(Arc::clone(&self.invocation), self.index, ctx).await
    }

    /// Whether [`Next::run`] has been called.
    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }

    /// The request being served.
    pub fn request(&self) -> &Request {
        &self.invocation.request
    }
}

fn step(invocation: Arc<Invocation>, index: usize, ctx: Context) -> BoxFuture<RpcResult<Response>> {
    let Some(middleware) = invocation.middleware.get(index).cloned() else {
        trace!(path = %invocation.request.path, "Middleware chain complete, running handler");
        return (invocation.handler)(ctx, Arc::clone(&invocation.request));
    };

    let next = Next::new(Arc::clone(&invocation), index + 1, ctx.clone());
    let guard = next.clone();
    let future = middleware(ctx, Arc::clone(&invocation.request), next);

    Box::pin(async move {
        let result = future.await;
        if result.is_ok() && !guard.was_called() {
            warn!(
                path = %invocation.request.path,
                position = index,
                "Middleware returned a value without calling next"
            );
            return Err(RpcError::middleware_violation(
                "middleware returned a value without calling next",
            ));
        }
        result
    })
}

/// Run `middleware` front to back, then `handler`, for one request.
pub async fn run_chain(
    middleware: Arc<[MiddlewareFn]>,
    handler: FinalHandler,
    request: Request,
    ctx: Context,
) -> RpcResult<Response> {
    let invocation = Arc::new(Invocation {
        middleware,
        handler,
        request: Arc::new(request),
        violation: OnceLock::new(),
    });

    let result = step(Arc::clone(&invocation), 0, ctx).await;

    if let Some(reason) = invocation.violation.get() {
        return Err(RpcError::middleware_violation(*reason));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn ok_handler() -> FinalHandler {
        Arc::new(|_ctx, _req| Box::pin(async { Ok(json!({ "result": "ok" })) }))
    }

    #[tokio::test]
    async fn test_middleware_chain_execution_order() {
        let execution_order = Arc::new(AtomicUsize::new(0));

        let recorder = |before: usize, after: usize| {
            let order = execution_order.clone();
            from_fn(move |ctx: Context, _req: Arc<Request>, next: Next| {
                let order = order.clone();
                async move {
                    assert_eq!(order.fetch_add(1, Ordering::SeqCst), before);
                    let result = next.run(ctx).await;
                    assert_eq!(order.fetch_add(1, Ordering::SeqCst), after);
                    result
                }
            })
        };

        let chain: Arc<[MiddlewareFn]> = vec![recorder(0, 5), recorder(1, 4), recorder(2, 3)].into();
        let result = run_chain(
            chain,
            ok_handler(),
            Request::new("test", json!(null)),
            Context::new(),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(execution_order.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn short_circuit_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler: FinalHandler = Arc::new(move |_ctx, _req| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(json!(null)) })
        });

        let deny = from_fn(|_ctx: Context, _req: Arc<Request>, _next: Next| async {
            Err::<Response, _>(RpcError::forbidden("no"))
        });

        let err = run_chain(vec![deny].into(), handler, Request::new("x", json!(null)), Context::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::RpcErrorKind::Forbidden);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn double_next_poisons_invocation() {
        let twice = from_fn(|ctx: Context, _req: Arc<Request>, next: Next| async move {
            let first = next.run(ctx.clone()).await;
            // Ignore the violation reported by the second call.
            let _ = next.run(ctx).await;
            first
        });

        let err = run_chain(vec![twice].into(), ok_handler(), Request::new("x", json!(null)), Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::RpcErrorKind::Internal);
    }

    #[tokio::test]
    async fn ok_without_next_is_rejected() {
        let swallow = from_fn(|_ctx: Context, _req: Arc<Request>, _next: Next| async {
            Ok::<_, RpcError>(json!("forged"))
        });

        let err = run_chain(vec![swallow].into(), ok_handler(), Request::new("x", json!(null)), Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::RpcErrorKind::Internal);
    }

    #[tokio::test]
    async fn extended_context_reaches_handler() {
        #[derive(Debug)]
        struct Marker(u8);

        let extend = from_fn(|ctx: Context, _req: Arc<Request>, next: Next| async move {
            next.run(ctx.extend(Marker(7))?).await
        });
        let handler: FinalHandler = Arc::new(|ctx, _req| {
            let value = ctx.get::<Marker>().map(|m| m.0);
            Box::pin(async move { Ok(json!(value)) })
        });

        let result = run_chain(vec![extend].into(), handler, Request::new("x", json!(null)), Context::new())
            .await
            .unwrap();
        assert_eq!(result, json!(7));
    }

    #[test]
    fn request_path_helpers() {
        let req = Request::new("users.profile.get", json!(null));
        assert_eq!(req.namespace(), Some("users"));
        assert_eq!(req.procedure(), "get");
    }
}
