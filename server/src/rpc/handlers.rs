//! RPC Handlers
//!
//! Implements the application contract and assembles the router.

use app_contract::{AppContract, GreetingInput, GreetingOutput};
use contract_rpc::{
    AuthUser, Context, ContractError, LogConfig, Router, RouterTree, RpcResult, auth_middleware,
    implement, logging_middleware,
};
use tracing::debug;

/// Build the greeting for `input` from the `scope` procedure.
pub fn greet(input: GreetingInput, scope: &str) -> GreetingOutput {
    GreetingOutput {
        text: format!(
            "Hello, {} from {} greeting procedure!",
            input.name.as_deref().unwrap_or("Anonymous"),
            scope
        ),
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the application router.
///
/// `public.*` procedures are open; `private.*` procedures sit behind the
/// auth middleware.
pub fn create_router(app: &AppContract) -> Result<Router, ContractError> {
    let public = implement(app.contract()).use_middleware(logging_middleware(LogConfig::new()));
    let protected = public.use_middleware(auth_middleware());

    RouterTree::new()
        .nest(
            "public",
            RouterTree::new().procedure(
                "greeting",
                public.procedure(&app.public_greeting).handler(public_greeting),
            ),
        )
        .nest(
            "private",
            RouterTree::new().procedure(
                "greeting",
                protected.procedure(&app.private_greeting).handler(private_greeting),
            ),
        )
        .build(app.contract())
}

// =============================================================================
// Greeting Handlers
// =============================================================================

async fn public_greeting(_ctx: Context, input: GreetingInput) -> RpcResult<GreetingOutput> {
    Ok(greet(input, "public"))
}

async fn private_greeting(ctx: Context, input: GreetingInput) -> RpcResult<GreetingOutput> {
    let user = ctx.require::<AuthUser>()?;
    debug!(user_id = %user.id, "Private greeting");
    Ok(greet(input, "private"))
}
