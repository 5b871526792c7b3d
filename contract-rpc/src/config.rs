//! Dispatcher configuration
//!
//! # Example
//! ```rust,ignore
//! use contract_rpc::RpcConfig;
//!
//! let config = RpcConfig::new()
//!     .with_prefix("/api/rpc")
//!     .with_max_input_size(512 * 1024)
//!     .with_debug_errors(cfg!(debug_assertions));
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default mount prefix
pub const DEFAULT_PREFIX: &str = "/rpc";

/// Default maximum input size: 1MB
pub const DEFAULT_MAX_INPUT_SIZE: usize = 1024 * 1024;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// max_input_size must be greater than 0
    #[error("max_input_size must be greater than 0")]
    InvalidMaxInputSize,
    /// prefix must start with '/' and must not end with '/'
    #[error("invalid prefix '{0}': must start with '/' and must not end with '/'")]
    InvalidPrefix(String),
}

/// Dispatcher configuration.
///
/// # Fields
///
/// * `prefix` - Mount prefix stripped from request paths. Requests outside it
///   are unmatched. Default: `/rpc`.
///
/// * `max_input_size` - Maximum request body (or `input` query parameter) in
///   bytes. Larger inputs are rejected with PAYLOAD_TOO_LARGE. Default: 1MB.
///
/// * `debug_errors` - Include the server-side cause of non-INTERNAL errors in
///   the response metadata. INTERNAL errors are always sanitized. Default: false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Mount prefix
    pub prefix: String,
    /// Maximum input size in bytes
    pub max_input_size: usize,
    /// Expose causes of client errors
    pub debug_errors: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            debug_errors: false,
        }
    }
}

impl RpcConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_input_size == 0 {
            return Err(ConfigValidationError::InvalidMaxInputSize);
        }
        if !self.prefix.starts_with('/') || (self.prefix.len() > 1 && self.prefix.ends_with('/')) {
            return Err(ConfigValidationError::InvalidPrefix(self.prefix.clone()));
        }
        Ok(())
    }

    /// Set the mount prefix
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set maximum input size
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Enable or disable error causes in responses
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_debug_errors(mut self, enabled: bool) -> Self {
        self.debug_errors = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RpcConfig::default();
        assert_eq!(config.prefix, "/rpc");
        assert_eq!(config.max_input_size, 1024 * 1024);
        assert!(!config.debug_errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            RpcConfig::new().with_max_input_size(0).validate(),
            Err(ConfigValidationError::InvalidMaxInputSize)
        );
        assert!(matches!(
            RpcConfig::new().with_prefix("rpc").validate(),
            Err(ConfigValidationError::InvalidPrefix(_))
        ));
        assert!(matches!(
            RpcConfig::new().with_prefix("/rpc/").validate(),
            Err(ConfigValidationError::InvalidPrefix(_))
        ));
        assert!(RpcConfig::new().with_prefix("/").validate().is_ok());
    }
}
