//! Server configuration
//!
//! Read once from the environment at start-up. Every variable is optional;
//! a variable that is set but invalid stops the server from starting.
//!
//! | Variable             | Default                                         |
//! |----------------------|-------------------------------------------------|
//! | `HOST`               | `0.0.0.0`                                       |
//! | `PORT`               | `3000`                                          |
//! | `CORS_ORIGINS`       | `http://localhost:3001,http://localhost:8081`   |
//! | `RPC_PREFIX`         | `/rpc`                                          |
//! | `RPC_MAX_INPUT_SIZE` | `1048576`                                       |
//! | `RPC_DEBUG_ERRORS`   | `false`                                         |
//! | `DEV_SESSION_TOKEN`  | unset                                           |
//! | `DEV_SESSION_NAME`   | `Developer`                                     |
//! | `DEV_SESSION_EMAIL`  | `dev@localhost`                                 |
//!
//! `DEV_SESSION_TOKEN` is for local development only: when set, the session
//! store starts with one session under that token, so protected procedures
//! can be called without a sign-in flow. Leave it unset in production.

use axum::http::HeaderValue;
use contract_rpc::{ConfigValidationError, RpcConfig, SessionUser};
use std::net::SocketAddr;
use thiserror::Error;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Origins allowed by default (web and native dev servers).
pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3001", "http://localhost:8081"];

/// Name of the seeded development user when `DEV_SESSION_NAME` is unset.
pub const DEFAULT_DEV_NAME: &str = "Developer";

/// Email of the seeded development user when `DEV_SESSION_EMAIL` is unset.
pub const DEFAULT_DEV_EMAIL: &str = "dev@localhost";

/// Errors raised while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `PORT` is not a port number
    #[error("invalid PORT '{0}'")]
    InvalidPort(String),
    /// `HOST` and `PORT` do not form a socket address
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
    /// `RPC_MAX_INPUT_SIZE` is not a number
    #[error("invalid RPC_MAX_INPUT_SIZE '{0}'")]
    InvalidMaxInputSize(String),
    /// `RPC_DEBUG_ERRORS` is not a boolean
    #[error("invalid RPC_DEBUG_ERRORS '{0}'")]
    InvalidDebugErrors(String),
    /// A `CORS_ORIGINS` entry cannot be used as a header value
    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),
    /// `DEV_SESSION_TOKEN` is set but blank
    #[error("DEV_SESSION_TOKEN must not be blank")]
    BlankDevSessionToken,
    /// The RPC settings were rejected
    #[error(transparent)]
    Rpc(#[from] ConfigValidationError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
    /// Dispatcher settings
    pub rpc: RpcConfig,
    /// Session to seed at start-up (development only)
    pub dev_session: Option<DevSession>,
}

/// A session that exists from start-up, for local development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevSession {
    pub token: String,
    pub user: SessionUser,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            rpc: RpcConfig::default(),
            dev_session: None,
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(prefix) = lookup("RPC_PREFIX") {
            config.rpc = config.rpc.with_prefix(prefix);
        }
        if let Some(size) = lookup("RPC_MAX_INPUT_SIZE") {
            let parsed = size
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidMaxInputSize(size))?;
            config.rpc = config.rpc.with_max_input_size(parsed);
        }
        if let Some(flag) = lookup("RPC_DEBUG_ERRORS") {
            let enabled = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => return Err(ConfigError::InvalidDebugErrors(flag)),
            };
            config.rpc = config.rpc.with_debug_errors(enabled);
        }
        if let Some(token) = lookup("DEV_SESSION_TOKEN") {
            let token = token.trim();
            if token.is_empty() {
                return Err(ConfigError::BlankDevSessionToken);
            }
            let name = lookup("DEV_SESSION_NAME").unwrap_or_else(|| DEFAULT_DEV_NAME.to_string());
            let email =
                lookup("DEV_SESSION_EMAIL").unwrap_or_else(|| DEFAULT_DEV_EMAIL.to_string());
            config.dev_session = Some(DevSession {
                token: token.to_string(),
                user: SessionUser {
                    id: "dev".to_string(),
                    name,
                    email,
                },
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc.validate()?;
        self.addr()?;
        self.origin_headers()?;
        Ok(())
    }

    /// Socket address to listen on.
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }

    /// Allowed origins as header values.
    pub fn origin_headers(&self) -> Result<Vec<HeaderValue>, ConfigError> {
        self.cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))
            })
            .collect()
    }
}
