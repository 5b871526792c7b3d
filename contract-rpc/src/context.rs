//! Per-request context
//!
//! A [`Context`] is a small typed map: one value per Rust type. The context
//! factory seeds it (request metadata, session), middleware extends it
//! (resolved user), and handlers read from it. Extension is additive: a new
//! context is produced with every upstream entry plus the new one, and an
//! entry can never be replaced or removed on the way down the chain.
//!
//! ```rust,ignore
//! let ctx = Context::new().extend(session)?;
//! let ctx = ctx.extend(AuthUser(user))?;
//!
//! let user = ctx.require::<AuthUser>()?;
//! ```

use crate::error::{RpcError, RpcResult};
use async_trait::async_trait;
use http::{HeaderMap, Method};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type Entry = Arc<dyn Any + Send + Sync>;

/// Typed, additive per-request context.
///
/// Cloning is cheap; entries are shared.
#[derive(Clone, Default)]
pub struct Context {
    values: Arc<HashMap<TypeId, Entry>>,
    names: Arc<Vec<&'static str>>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new context with `value` added.
    ///
    /// Fails with INTERNAL if a value of the same type is already present.
    pub fn extend<T: Send + Sync + 'static>(&self, value: T) -> RpcResult<Context> {
        let key = TypeId::of::<T>();
        let name = std::any::type_name::<T>();
        if self.values.contains_key(&key) {
            tracing::warn!(entry = name, "Context entry already present, refusing to overwrite");
            return Err(RpcError::middleware_violation(format!(
                "context already contains {}",
                name
            )));
        }

        let mut values = (*self.values).clone();
        values.insert(key, Arc::new(value));
        let mut names = (*self.names).clone();
        names.push(name);

        Ok(Context {
            values: Arc::new(values),
            names: Arc::new(names),
        })
    }

    /// Get the value of type `T`, if present.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get the value of type `T` or fail with INTERNAL.
    ///
    /// Use for entries the chain guarantees, such as the user set by the auth
    /// middleware on a protected procedure.
    pub fn require<T: Send + Sync + 'static>(&self) -> RpcResult<&T> {
        self.get::<T>().ok_or_else(|| {
            RpcError::internal("Missing context entry")
                .with_cause(format!("context has no {}", std::any::type_name::<T>()))
        })
    }

    /// Whether a value of type `T` is present.
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    /// Whether every entry of `upstream` is present here, unreplaced.
    pub(crate) fn retains(&self, upstream: &Context) -> bool {
        upstream.values.iter().all(|(key, entry)| {
            self.values
                .get(key)
                .is_some_and(|value| Arc::ptr_eq(value, entry))
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("entries", &self.names).finish()
    }
}

/// Transport-level facts about the inbound request.
///
/// Inserted by every context factory before middleware runs.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// HTTP method
    pub method: Method,
    /// Request path, including the mount prefix
    pub path: String,
    /// Request headers
    pub headers: HeaderMap,
}

/// Builds the initial context for each inbound request.
///
/// Called exactly once per request, before any middleware. The dispatcher
/// adds the [`RequestMeta`] itself if the factory did not.
///
/// Async closures taking a [`RequestMeta`] are context factories:
///
/// ```rust,ignore
/// let handler = RpcHandler::new(router, config).with_context_factory(|meta: RequestMeta| async move {
///     let tenant = Tenant::from_headers(&meta.headers)?;
///     Context::new().extend(meta)?.extend(tenant)
/// });
/// ```
#[async_trait]
pub trait ContextFactory: Send + Sync + 'static {
    /// Build the context for one request.
    async fn create(&self, meta: &RequestMeta) -> RpcResult<Context>;
}

#[async_trait]
impl<F, Fut> ContextFactory for F
where
    F: Fn(RequestMeta) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Context>> + Send,
{
    async fn create(&self, meta: &RequestMeta) -> RpcResult<Context> {
        self(meta.clone()).await
    }
}

/// Factory producing a context with only the [`RequestMeta`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaContextFactory;

#[async_trait]
impl ContextFactory for MetaContextFactory {
    async fn create(&self, meta: &RequestMeta) -> RpcResult<Context> {
        Context::new().extend(meta.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    #[derive(Debug, PartialEq)]
    struct Locale(&'static str);

    #[test]
    fn extend_keeps_upstream_entries() {
        let base = Context::new().extend(Tenant("acme")).unwrap();
        let extended = base.extend(Locale("en")).unwrap();

        assert_eq!(extended.get::<Tenant>(), Some(&Tenant("acme")));
        assert_eq!(extended.get::<Locale>(), Some(&Locale("en")));
        assert_eq!(extended.len(), 2);

        // The original context is untouched.
        assert!(base.get::<Locale>().is_none());
    }

    #[test]
    fn extend_refuses_to_overwrite() {
        let ctx = Context::new().extend(Tenant("acme")).unwrap();
        let err = ctx.extend(Tenant("other")).unwrap_err();
        assert_eq!(err.kind, crate::RpcErrorKind::Internal);
        assert_eq!(ctx.get::<Tenant>(), Some(&Tenant("acme")));
    }

    #[test]
    fn retains_tracks_upstream_entries() {
        let base = Context::new().extend(Tenant("acme")).unwrap();
        assert!(base.extend(Locale("en")).unwrap().retains(&base));
        assert!(base.retains(&Context::new()));

        assert!(!Context::new().retains(&base));
        let lookalike = Context::new().extend(Tenant("acme")).unwrap();
        assert!(!lookalike.retains(&base));
    }

    #[test]
    fn require_reports_missing_entries() {
        let ctx = Context::new();
        assert!(ctx.is_empty());
        let err = ctx.require::<Tenant>().unwrap_err();
        assert_eq!(err.kind, crate::RpcErrorKind::Internal);
        assert!(err.cause.unwrap().contains("Tenant"));
    }
}
