#![warn(missing_docs)]
//! # contract-rpc
//!
//! Contract-first, type-safe RPC over HTTP.
//!
//! ## Overview
//!
//! - **Contracts** declare every procedure's path, input schema and output
//!   schema once, in a crate shared by server and clients
//! - **Procedures** implement contract leaves with async handlers behind an
//!   ordered, call-once-checked middleware chain
//! - **Routers** mirror the contract's shape exactly, checked at start-up
//! - **Dispatch** maps HTTP requests under a mount prefix onto procedures
//! - **Typed clients** call procedures through the same contract and expose
//!   deterministic cache keys for query caches
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Contract crate (shared)                   │
//! │        define_contract(ContractTree) ─▶ Contract             │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────────┐  ┌───────────────────────────┐
//! │            Server             │  │          Client           │
//! │  implement ─▶ Procedure       │  │  ContractClient           │
//! │  RouterTree::build ─▶ Router  │  │   └▶ ProcedureClient      │
//! │  RpcHandler::handle           │◀─┤  FetchLink (reqwest)      │
//! │   ├ ContextFactory            │  │  QueryOptions / QueryKey  │
//! │   ├ middleware chain          │  └───────────────────────────┘
//! │   └ handler + schemas         │
//! └───────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ### 1. Define the contract
//!
//! ```rust,ignore
//! use contract_rpc::prelude::*;
//!
//! let contract = define_contract(
//!     ContractTree::new().nest(
//!         "public",
//!         ContractTree::new().procedure("greeting", oc().input::<GreetingInput>().output::<GreetingOutput>()),
//!     ),
//! )?;
//! let greeting = contract.procedure::<GreetingInput, GreetingOutput>("public.greeting")?;
//! ```
//!
//! ### 2. Implement and route it
//!
//! ```rust,ignore
//! let public = implement(&contract);
//! let router = RouterTree::new()
//!     .nest(
//!         "public",
//!         RouterTree::new().procedure(
//!             "greeting",
//!             public.procedure(&greeting).handler(|_ctx: Context, input: GreetingInput| async move {
//!                 Ok(GreetingOutput { text: format!("Hello, {}!", input.name.unwrap_or_default()) })
//!             }),
//!         ),
//!     )
//!     .build(&contract)?;
//! ```
//!
//! ### 3. Serve it
//!
//! ```rust,ignore
//! let handler = RpcHandler::new(router, RpcConfig::default())?;
//! match handler.handle(&mut request).await {
//!     DispatchOutcome::Matched(response) => response,
//!     DispatchOutcome::Unmatched => not_found(),
//! }
//! ```
//!
//! ### 4. Call it
//!
//! ```rust,ignore
//! let client = ContractClient::new(FetchLink::new("http://localhost:3000/rpc"));
//! let output = client.procedure(&greeting).call(&GreetingInput { name: Some("Ada".into()) }).await?;
//! ```
//!
//! ## Error Handling
//!
//! ```rust,ignore
//! RpcError::bad_request("Invalid request")
//! RpcError::unauthorized("Authentication required")
//! RpcError::not_found("User not found")
//! RpcError::internal("Something went wrong")
//! ```
//!
//! Every kind maps to one HTTP status. INTERNAL errors are logged and
//! sanitized before they are sent.
//!
//! ## Module Structure
//!
//! - [`contract`] - Contract definition and typed handles
//! - [`schema`] / [`validation`] - Schema descriptors and field rules
//! - [`middleware`] - Middleware types and the chain runner
//! - [`procedure`] - Procedure builder
//! - [`router`] - Router and shape check
//! - [`dispatch`] - HTTP dispatcher
//! - [`auth`] - Session-based authentication
//! - [`client`] / [`query`] - Typed client and query adapter
//! - [`logging`] - Request logging and redaction

pub mod auth;
pub mod client;
mod config;
mod context;
pub mod contract;
pub mod dispatch;
mod error;
mod handler;
pub mod logging;
pub mod middleware;
pub mod procedure;
pub mod query;
pub mod router;
pub mod schema;
pub mod types;
pub mod validation;

#[cfg(test)]
mod tests;

// Public API
pub use auth::{
    AuthMiddleware, AuthUser, Session, SessionContextFactory, SessionProvider, SessionUser,
    auth_middleware,
};
pub use client::{ContractClient, EncodedBody, FetchLink, Link, ProcedureClient, encode_body};
pub use config::{ConfigValidationError, RpcConfig};
pub use context::{Context, ContextFactory, MetaContextFactory, RequestMeta};
pub use contract::{
    BodyFormat, Contract, ContractLeaf, ContractNode, ContractProcedure, ContractSchema,
    ContractTree, ProcedureContractBuilder, ProcedureSchema, define_contract, oc,
};
pub use dispatch::{BodyReader, DispatchOutcome, InboundRequest, RpcHttpResponse, RpcHandler};
pub use error::{
    ClientError, ContractError, RpcError, RpcErrorKind, RpcResult, SchemaError,
};
pub use handler::Handler;
pub use logging::{LogConfig, RequestId, logging_middleware, redact_value};
pub use middleware::{
    BoxFuture, FinalHandler, Middleware, MiddlewareFn, Next, Request, Response, from_fn,
};
pub use procedure::{Implementer, Procedure, ProcedureBuilder, implement};
pub use query::{QueryKey, QueryOptions, generate_query_key};
pub use router::{Router, RouterNode, RouterTree};
pub use schema::{SchemaDescriptor, SchemaType};
pub use types::NoInput;
pub use validation::{FieldError, Validate, ValidationResult, ValidationRules};

/// Prelude for convenient imports
///
/// ```rust,ignore
/// use contract_rpc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Auth
        AuthUser,
        // Contract
        BodyFormat,
        // Client
        ClientError,
        Context,
        ContextFactory,
        Contract,
        ContractClient,
        ContractProcedure,
        ContractTree,
        // Dispatch
        DispatchOutcome,
        FetchLink,
        // Validation
        FieldError,
        InboundRequest,
        // Middleware
        Middleware,
        MiddlewareFn,
        Next,
        NoInput,
        // Procedures
        Procedure,
        ProcedureClient,
        QueryKey,
        QueryOptions,
        Request,
        RequestMeta,
        Response,
        // Routing
        Router,
        RouterTree,
        // Configuration
        RpcConfig,
        // Errors
        RpcError,
        RpcErrorKind,
        RpcHandler,
        RpcHttpResponse,
        RpcResult,
        Session,
        SessionContextFactory,
        SessionProvider,
        SessionUser,
        Validate,
        ValidationResult,
        ValidationRules,
        auth_middleware,
        define_contract,
        implement,
        oc,
    };
}
