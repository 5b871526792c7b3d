//! HTTP dispatcher
//!
//! [`RpcHandler`] turns one inbound request into either a response or
//! [`DispatchOutcome::Unmatched`], in which case the host falls through to
//! its other routes. It is transport-agnostic: hosts implement
//! [`InboundRequest`] for their request type and convert
//! [`RpcHttpResponse`] back into theirs.
//!
//! # Request mapping
//!
//! - `POST {prefix}/a/b` reads the body in the procedure's [`BodyFormat`].
//! - `GET {prefix}/a/b?input=<url-encoded JSON>` reads the input from the
//!   query string.
//! - Any other method is METHOD_NOT_SUPPORTED.
//! - An empty body or missing `input` parameter is the JSON `null` input.
//!
//! # Responses
//!
//! Success is `200` with the output as JSON. Errors use the status of their
//! kind and the body `{"kind", "message", "metadata"?}`. INTERNAL errors are
//! logged and sanitized before they leave the server.

use crate::context::{ContextFactory, MetaContextFactory, RequestMeta};
use crate::contract::BodyFormat;
use crate::config::{ConfigValidationError, RpcConfig};
use crate::error::{RpcError, RpcErrorKind, RpcResult};
use crate::router::Router;
use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

// =============================================================================
// Inbound Request
// =============================================================================

/// What the dispatcher needs from a host transport's request.
///
/// `body` is the generic accessor and must always work. The per-format
/// accessors are optional: a transport that parses JSON, text or forms
/// natively returns `Some` from them and the dispatcher will use that
/// instead of reading raw bytes. The dispatcher reads the body at most once,
/// through exactly one accessor.
#[async_trait]
pub trait InboundRequest: Send {
    /// HTTP method
    fn method(&self) -> &Method;

    /// Request path, without the query string
    fn path(&self) -> &str;

    /// Raw query string, without the leading `?`
    fn query(&self) -> Option<&str>;

    /// Request headers
    fn headers(&self) -> &HeaderMap;

    /// Read the whole body, failing with PAYLOAD_TOO_LARGE past `limit` bytes.
    async fn body(&mut self, limit: usize) -> RpcResult<Bytes>;

    /// Native JSON accessor.
    async fn json(&mut self, _limit: usize) -> Option<RpcResult<Value>> {
        None
    }

    /// Native text accessor.
    async fn text(&mut self, _limit: usize) -> Option<RpcResult<String>> {
        None
    }

    /// Native form accessor, producing a flat JSON object of fields.
    async fn form(&mut self, _limit: usize) -> Option<RpcResult<Value>> {
        None
    }
}

// =============================================================================
// Body Reader
// =============================================================================

/// Read-once guard over an [`InboundRequest`] body.
pub struct BodyReader<'a, R: InboundRequest + ?Sized> {
    request: &'a mut R,
    limit: usize,
    consumed: bool,
}

impl<'a, R: InboundRequest + ?Sized> BodyReader<'a, R> {
    /// Wrap `request`, enforcing `limit` bytes.
    pub fn new(request: &'a mut R, limit: usize) -> Self {
        Self {
            request,
            limit,
            consumed: false,
        }
    }

    /// Whether the body has been read.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Read the body as `format`, preferring the transport's native accessor.
    pub async fn read(&mut self, format: BodyFormat) -> RpcResult<Value> {
        if self.consumed {
            return Err(RpcError::internal("Request body already consumed"));
        }
        self.consumed = true;

        if let Some(length) = content_length(self.request.headers()) {
            if length > self.limit {
                return Err(too_large(length, self.limit));
            }
        }

        let limit = self.limit;
        match format {
            BodyFormat::Json => {
                if let Some(native) = self.request.json(limit).await {
                    trace!("Body read through native JSON accessor");
                    return native;
                }
                let bytes = self.request.body(limit).await?;
                parse_json(&bytes)
            }
            BodyFormat::Text => {
                if let Some(native) = self.request.text(limit).await {
                    trace!("Body read through native text accessor");
                    return native.map(text_input);
                }
                let bytes = self.request.body(limit).await?;
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| RpcError::bad_request("Request body is not valid UTF-8"))?;
                Ok(text_input(text))
            }
            BodyFormat::Form => {
                if let Some(native) = self.request.form(limit).await {
                    trace!("Body read through native form accessor");
                    return native;
                }
                let bytes = self.request.body(limit).await?;
                Ok(parse_form(&bytes))
            }
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn too_large(size: usize, limit: usize) -> RpcError {
    warn!(size = size, limit = limit, "Input size exceeds limit");
    RpcError::payload_too_large(format!(
        "Input size {} bytes exceeds maximum of {} bytes",
        size, limit
    ))
}

fn parse_json(bytes: &[u8]) -> RpcResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn text_input(text: String) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}

fn parse_form(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    let fields = url::form_urlencoded::parse(bytes)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(fields)
}

fn query_input(query: Option<&str>, limit: usize) -> RpcResult<Value> {
    let Some(query) = query else {
        return Ok(Value::Null);
    };
    let raw = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "input")
        .map(|(_, value)| value.into_owned());

    match raw {
        None => Ok(Value::Null),
        Some(raw) if raw.len() > limit => Err(too_large(raw.len(), limit)),
        Some(raw) => parse_json(raw.as_bytes()),
    }
}

// =============================================================================
// Response
// =============================================================================

/// Transport-agnostic HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcHttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// JSON body
    pub body: Bytes,
}

impl RpcHttpResponse {
    fn json(status: StatusCode, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: Bytes::from(body),
        }
    }

    /// Successful response carrying `output`.
    pub fn success(output: &Value) -> Self {
        match serde_json::to_vec(output) {
            Ok(body) => Self::json(StatusCode::OK, body),
            Err(e) => Self::error(
                RpcError::internal("Failed to serialize output").with_cause(e.to_string()),
                false,
            ),
        }
    }

    /// Error response for `err`.
    ///
    /// INTERNAL errors are logged with their cause and sanitized. With
    /// `debug_errors`, other errors keep their cause in `metadata.cause`.
    pub fn error(err: RpcError, debug_errors: bool) -> Self {
        let status = err.status();
        let err = if err.kind == RpcErrorKind::Internal {
            error!(message = %err.message, cause = ?err.cause, "Internal error while dispatching");
            err.sanitize()
        } else if debug_errors {
            with_debug_cause(err)
        } else {
            err
        };

        let body = serde_json::to_vec(&err).unwrap_or_else(|_| {
            br#"{"kind":"INTERNAL","message":"Internal server error"}"#.to_vec()
        });
        Self::json(status, body)
    }

    /// Split into status, headers and body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }

    /// Decode the body as JSON.
    pub fn json_body(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}

fn with_debug_cause(mut err: RpcError) -> RpcError {
    let Some(cause) = err.cause.take() else {
        return err;
    };
    match err.metadata.as_mut() {
        Some(Value::Object(map)) => {
            map.insert("cause".to_string(), Value::String(cause));
        }
        Some(_) => {}
        None => err.metadata = Some(serde_json::json!({ "cause": cause })),
    }
    err
}

/// Result of [`RpcHandler::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The request named a procedure; this is its response
    Matched(RpcHttpResponse),
    /// The request is outside the prefix or names no procedure
    Unmatched,
}

impl DispatchOutcome {
    /// Whether a procedure handled the request.
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// The response, if matched.
    pub fn into_response(self) -> Option<RpcHttpResponse> {
        match self {
            Self::Matched(response) => Some(response),
            Self::Unmatched => None,
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Dispatcher over a router, mounted at a prefix.
///
/// Holds only immutable, shared state, so one instance (or its clones)
/// serves any number of concurrent requests.
///
/// ```rust,ignore
/// let handler = RpcHandler::new(router, RpcConfig::default())?
///     .with_context_factory(SessionContextFactory::new(store));
///
/// match handler.handle(&mut request).await {
///     DispatchOutcome::Matched(response) => respond(response),
///     DispatchOutcome::Unmatched => fall_through(request),
/// }
/// ```
#[derive(Clone)]
pub struct RpcHandler {
    router: Router,
    config: Arc<RpcConfig>,
    context_factory: Arc<dyn ContextFactory>,
}

impl RpcHandler {
    /// Create a handler; fails if `config` is invalid.
    pub fn new(router: Router, config: RpcConfig) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self {
            router,
            config: Arc::new(config),
            context_factory: Arc::new(MetaContextFactory),
        })
    }

    /// Use `factory` to build each request's initial context.
    #[must_use = "This method returns a new RpcHandler and does not modify self"]
    pub fn with_context_factory<F: ContextFactory>(mut self, factory: F) -> Self {
        self.context_factory = Arc::new(factory);
        self
    }

    /// The router requests are dispatched to.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The active configuration.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Strip the mount prefix, returning the rest of the path.
    fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let prefix = self.config.prefix.trim_end_matches('/');
        let rest = path.strip_prefix(prefix)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    /// Dispatch one request.
    pub async fn handle<R: InboundRequest + ?Sized>(&self, request: &mut R) -> DispatchOutcome {
        let Some(rest) = self.strip_prefix(request.path()) else {
            trace!(path = %request.path(), "Request outside RPC prefix");
            return DispatchOutcome::Unmatched;
        };

        let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();
        let procedure = match self.router.resolve(&segments) {
            Ok(procedure) => procedure.clone(),
            Err(_) => {
                debug!(path = %request.path(), "No procedure at path, falling through");
                return DispatchOutcome::Unmatched;
            }
        };
        let path = procedure.path();

        let started = Instant::now();
        let result = AssertUnwindSafe(self.dispatch(request, &procedure))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(path = %path, panic = %message, "Procedure panicked");
                Err(RpcError::internal("Procedure panicked").with_cause(message))
            });

        let response = match result {
            Ok(output) => RpcHttpResponse::success(&output),
            Err(err) => RpcHttpResponse::error(err, self.config.debug_errors),
        };

        debug!(
            path = %path,
            status = response.status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "RPC request dispatched"
        );
        DispatchOutcome::Matched(response)
    }

    async fn dispatch<R: InboundRequest + ?Sized>(
        &self,
        request: &mut R,
        procedure: &crate::procedure::Procedure,
    ) -> RpcResult<Value> {
        let method = request.method().clone();
        if method != Method::GET && method != Method::POST {
            return Err(RpcError::method_not_supported(&method));
        }

        let meta = RequestMeta {
            method: method.clone(),
            path: request.path().to_string(),
            headers: request.headers().clone(),
        };

        let mut ctx = self.context_factory.create(&meta).await?;
        if !ctx.contains::<RequestMeta>() {
            ctx = ctx.extend(meta.clone())?;
        }

        let limit = self.config.max_input_size;
        let input = if method == Method::GET {
            query_input(request.query(), limit)?
        } else {
            BodyReader::new(request, limit)
                .read(procedure.leaf().body_format())
                .await?
        };

        procedure.call(ctx, input, Some(meta)).await
    }
}

impl std::fmt::Debug for RpcHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcHandler")
            .field("prefix", &self.config.prefix)
            .field("procedures", &self.router.procedures())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
