//! Axum transport
//!
//! Adapts axum requests to [`InboundRequest`] and runs the dispatcher as a
//! middleware in front of the route table. Requests the dispatcher does not
//! match continue to the next service untouched.

use crate::rpc::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use contract_rpc::{DispatchOutcome, InboundRequest, RpcError, RpcHttpResponse, RpcResult};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::debug;

// =============================================================================
// Inbound Request
// =============================================================================

/// An axum request seen through [`InboundRequest`].
pub struct AxumRequest {
    parts: Parts,
    body: Option<Body>,
}

impl AxumRequest {
    /// Wrap `request`.
    pub fn new(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            parts,
            body: Some(body),
        }
    }

    /// Rebuild the axum request. The body is empty once it has been read.
    pub fn into_request(self) -> Request {
        Request::from_parts(self.parts, self.body.unwrap_or_else(Body::empty))
    }
}

#[async_trait]
impl InboundRequest for AxumRequest {
    fn method(&self) -> &Method {
        &self.parts.method
    }

    fn path(&self) -> &str {
        self.parts.uri.path()
    }

    fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    async fn body(&mut self, limit: usize) -> RpcResult<Bytes> {
        let Some(body) = self.body.take() else {
            return Err(RpcError::internal("Request body already consumed"));
        };

        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(err) if err.is::<LengthLimitError>() => Err(RpcError::payload_too_large(format!(
                "Request body exceeds {} bytes",
                limit
            ))),
            Err(err) => Err(RpcError::bad_request("Failed to read request body").with_cause(err.to_string())),
        }
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Dispatch requests under the RPC prefix.
///
/// A path under the prefix that names no procedure is answered with a
/// NOT_FOUND error body; everything else falls through to `next`.
pub async fn rpc_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut inbound = AxumRequest::new(request);

    match state.rpc().handle(&mut inbound).await {
        DispatchOutcome::Matched(response) => into_axum(response),
        DispatchOutcome::Unmatched if under_prefix(&state, inbound.path()) => {
            debug!(path = %inbound.path(), "Unknown procedure");
            let prefix = state.rpc().config().prefix.trim_end_matches('/');
            let procedure = inbound
                .path()
                .strip_prefix(prefix)
                .unwrap_or_default()
                .trim_start_matches('/')
                .replace('/', ".");
            into_axum(RpcHttpResponse::error(RpcError::procedure_not_found(&procedure), false))
        }
        DispatchOutcome::Unmatched => next.run(inbound.into_request()).await,
    }
}

/// Whether `path` lies in the namespace reserved by a non-root prefix.
fn under_prefix(state: &AppState, path: &str) -> bool {
    let prefix = state.rpc().config().prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Convert a dispatcher response.
pub fn into_axum(response: RpcHttpResponse) -> Response {
    let (status, headers, body) = response.into_parts();
    (status, headers, body).into_response()
}
