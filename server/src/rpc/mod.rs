//! App RPC - Router, Sessions, and State

mod handlers;
mod session;

pub use handlers::*;
pub use session::*;

use crate::config::ServerConfig;
use app_contract::AppContract;
use contract_rpc::{ConfigValidationError, ContractError, RpcHandler, SessionContextFactory};
use std::sync::Arc;
use thiserror::Error;

/// Lifetime, in days, of the session seeded from `DEV_SESSION_TOKEN`.
pub const DEV_SESSION_TTL_DAYS: i64 = 30;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The contract or router is malformed
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    /// The dispatcher configuration is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigValidationError),
}

/// Shared application state, built once at start-up.
#[derive(Clone, Debug)]
pub struct AppState {
    contract: AppContract,
    rpc: RpcHandler,
    sessions: Arc<InMemorySessionStore>,
}

impl AppState {
    /// Define the contract, build the router and the dispatcher.
    pub fn new(config: &ServerConfig) -> Result<Self, StartupError> {
        let contract = AppContract::new()?;
        let router = create_router(&contract)?;
        let sessions = Arc::new(match &config.dev_session {
            Some(dev) => {
                tracing::warn!(user = %dev.user.name, "Seeding development session");
                InMemorySessionStore::with_session(
                    &dev.token,
                    dev.user.clone(),
                    chrono::Duration::days(DEV_SESSION_TTL_DAYS),
                )
            }
            None => InMemorySessionStore::new(),
        });
        let rpc = RpcHandler::new(router, config.rpc.clone())?
            .with_context_factory(SessionContextFactory::new(Arc::clone(&sessions)));

        tracing::info!(
            prefix = %config.rpc.prefix,
            procedures = ?rpc.router().procedures(),
            "RPC router ready"
        );
        Ok(Self {
            contract,
            rpc,
            sessions,
        })
    }

    /// The application contract.
    pub fn contract(&self) -> &AppContract {
        &self.contract
    }

    /// The dispatcher.
    pub fn rpc(&self) -> &RpcHandler {
        &self.rpc
    }

    /// The session store.
    pub fn sessions(&self) -> &Arc<InMemorySessionStore> {
        &self.sessions
    }
}
