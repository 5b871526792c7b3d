//! oRPC-style procedure builder
//!
//! [`implement`] binds a builder to a contract. Middleware attached with
//! [`Implementer::use_middleware`] applies to every procedure built from the
//! returned implementer afterwards; it is a snapshot, so procedures that
//! were already finalized keep the chain they were built with.
//!
//! # Example
//!
//! ```rust,ignore
//! use contract_rpc::prelude::*;
//!
//! let public = implement(&contract);
//! let protected = public.use_middleware(auth_middleware());
//!
//! let public_greeting = public
//!     .procedure(&app.public_greeting)
//!     .handler(|_ctx: Context, input: GreetingInput| async move { Ok(greet(input, "public")) });
//!
//! let private_greeting = protected
//!     .procedure(&app.private_greeting)
//!     .handler(|_ctx: Context, input: GreetingInput| async move { Ok(greet(input, "private")) });
//! ```

use crate::context::{Context, RequestMeta};
use crate::contract::{Contract, ContractLeaf, ContractProcedure};
use crate::error::RpcResult;
use crate::handler::{Handler, into_final_handler};
use crate::middleware::{FinalHandler, Middleware, MiddlewareFn, Request, Response, from_fn, run_chain};
use crate::schema::SchemaType;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// Start implementing `contract`.
pub fn implement(contract: &Contract) -> Implementer {
    Implementer {
        contract: contract.clone(),
        middleware: Arc::from(Vec::new()),
    }
}

/// Builder bound to a contract, carrying a shared middleware prefix.
#[derive(Clone)]
pub struct Implementer {
    contract: Contract,
    middleware: Arc<[MiddlewareFn]>,
}

impl Implementer {
    /// New implementer whose chain is this one's plus `middleware`.
    #[must_use = "use_middleware returns a new Implementer and leaves self unchanged"]
    pub fn use_middleware<M: Middleware>(&self, middleware: M) -> Implementer {
        self.with_middleware_fn(from_fn(middleware))
    }

    /// Same as [`Implementer::use_middleware`] for an already erased middleware.
    #[must_use = "with_middleware_fn returns a new Implementer and leaves self unchanged"]
    pub fn with_middleware_fn(&self, middleware: MiddlewareFn) -> Implementer {
        let mut chain = self.middleware.to_vec();
        chain.push(middleware);
        Implementer {
            contract: self.contract.clone(),
            middleware: chain.into(),
        }
    }

    /// Erase an async closure into a [`MiddlewareFn`].
    ///
    /// Useful to build a middleware once and attach it to several
    /// implementers.
    pub fn middleware_fn<M: Middleware>(middleware: M) -> MiddlewareFn {
        from_fn(middleware)
    }

    /// The contract being implemented.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Number of middleware in the shared prefix.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Start building the procedure for `declared`.
    pub fn procedure<I, O>(&self, declared: &ContractProcedure<I, O>) -> ProcedureBuilder<I, O>
    where
        I: SchemaType,
        O: SchemaType,
    {
        ProcedureBuilder {
            leaf: Arc::clone(declared.leaf()),
            middleware: self.middleware.to_vec(),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for Implementer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementer")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Builder for a single procedure.
pub struct ProcedureBuilder<I, O> {
    leaf: Arc<ContractLeaf>,
    middleware: Vec<MiddlewareFn>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> ProcedureBuilder<I, O>
where
    I: SchemaType,
    O: SchemaType,
{
    /// Add middleware for this procedure only, after the shared prefix.
    pub fn use_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(from_fn(middleware));
        self
    }

    /// Same as [`ProcedureBuilder::use_middleware`] for an already erased middleware.
    pub fn with_middleware_fn(mut self, middleware: MiddlewareFn) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Finalize the procedure with its handler.
    pub fn handler<H: Handler<I, O>>(self, handler: H) -> Procedure {
        let handler = into_final_handler(Arc::clone(&self.leaf), handler);
        trace!(
            path = %self.leaf.dotted_path(),
            middleware = self.middleware.len(),
            "Procedure built"
        );
        Procedure {
            leaf: self.leaf,
            middleware: self.middleware.into(),
            handler,
        }
    }
}

/// A finalized procedure: contract leaf, middleware chain and handler.
///
/// Immutable and cheap to clone.
#[derive(Clone)]
pub struct Procedure {
    leaf: Arc<ContractLeaf>,
    middleware: Arc<[MiddlewareFn]>,
    handler: FinalHandler,
}

impl Procedure {
    /// Contract leaf this procedure implements.
    pub fn leaf(&self) -> &Arc<ContractLeaf> {
        &self.leaf
    }

    /// Dotted path of the implemented leaf.
    pub fn path(&self) -> String {
        self.leaf.dotted_path()
    }

    /// Number of middleware in the chain.
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Run the middleware chain and the handler with raw `input`.
    pub async fn call(
        &self,
        ctx: Context,
        input: serde_json::Value,
        meta: Option<RequestMeta>,
    ) -> RpcResult<Response> {
        let request = Request {
            path: self.leaf.dotted_path(),
            input,
            meta,
        };
        run_chain(
            Arc::clone(&self.middleware),
            Arc::clone(&self.handler),
            request,
            ctx,
        )
        .await
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("path", &self.leaf.dotted_path())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
