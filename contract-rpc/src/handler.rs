//! Handler traits and utilities
//!
//! A handler is an async function `(Context, Input) -> RpcResult<Output>`.
//! Before it is stored in a procedure it is wrapped so the raw JSON input is
//! checked against the contract's input schema first and the output is
//! checked against the output schema afterwards.

use crate::contract::ContractLeaf;
use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::middleware::FinalHandler;
use crate::schema::SchemaType;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Trait for handler functions
///
/// Automatically implemented for async functions with the signature:
/// `async fn(Context, Input) -> RpcResult<Output>`
pub trait Handler<Input, Output>: Clone + Send + Sync + 'static
where
    Input: SchemaType,
    Output: SchemaType,
{
    /// The future type returned by the handler
    type Future: Future<Output = RpcResult<Output>> + Send;

    /// Call the handler with context and input
    fn call(&self, ctx: Context, input: Input) -> Self::Future;
}

impl<Input, Output, F, Fut> Handler<Input, Output> for F
where
    Input: SchemaType,
    Output: SchemaType,
    F: Fn(Context, Input) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Output>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, ctx: Context, input: Input) -> Self::Future {
        (self)(ctx, input)
    }
}

/// Wrap `handler` into the innermost step of a procedure's chain.
///
/// Input schema failures are BAD_REQUEST; output schema failures are
/// INTERNAL, since a handler returning the wrong shape is a server bug.
pub(crate) fn into_final_handler<Input, Output, H>(leaf: Arc<ContractLeaf>, handler: H) -> FinalHandler
where
    Input: SchemaType,
    Output: SchemaType,
    H: Handler<Input, Output>,
{
    Arc::new(move |ctx, request| {
        let handler = handler.clone();
        let leaf = Arc::clone(&leaf);
        Box::pin(async move {
            let path = request.path.as_str();

            trace!(path = %path, "Validating procedure input");
            let input: Input = leaf
                .input()
                .parse_as(request.input.clone())
                .map_err(|e| {
                    warn!(path = %path, issues = e.issues.len(), error = %e, "Input validation failed");
                    e.into_input_error()
                })?;

            trace!(path = %path, "Executing procedure handler");
            let output = handler.call(ctx, input).await.inspect_err(|e| {
                debug!(path = %path, kind = %e.kind, "Procedure handler returned error");
            })?;

            let output_value = serde_json::to_value(output).map_err(|e| {
                error!(path = %path, error = %e, "Failed to serialize output");
                RpcError::internal("Failed to serialize output").with_cause(e.to_string())
            })?;

            let output_value = leaf.output().parse(output_value).map_err(|e| {
                error!(path = %path, error = %e, "Output validation failed");
                e.into_output_error()
            })?;

            trace!(path = %path, "Procedure completed successfully");
            Ok(output_value)
        })
    })
}
