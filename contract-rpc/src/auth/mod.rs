//! Session-based authentication
//!
//! The core never stores or mutates sessions. A [`SessionProvider`] (owned
//! by the host application) resolves the session for a request's headers,
//! [`SessionContextFactory`] puts it into the initial [`Context`], and
//! [`auth_middleware`] turns "session with a user" into an [`AuthUser`]
//! entry or an UNAUTHORIZED error.
//!
//! A protected builder is a public builder with the auth middleware
//! appended:
//!
//! ```rust,ignore
//! use contract_rpc::auth::auth_middleware;
//! use contract_rpc::prelude::*;
//!
//! let public = implement(&contract);
//! let protected = public.use_middleware(auth_middleware());
//!
//! let handler = RpcHandler::new(router, RpcConfig::default())
//!     .with_context_factory(SessionContextFactory::new(store));
//! ```
//!
//! [`Context`]: crate::Context

mod middleware;
mod provider;
mod types;

pub use middleware::{AuthMiddleware, auth_middleware};
pub use provider::{SessionContextFactory, SessionProvider};
pub use types::{AuthUser, Session, SessionUser};
