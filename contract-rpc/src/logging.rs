//! Request logging
//!
//! [`logging_middleware`] logs each procedure call with a [`RequestId`], its
//! path, its duration and its outcome. Inputs and outputs are only logged
//! when enabled, and always pass through [`redact_value`] first.
//!
//! ```rust,ignore
//! let public = implement(&contract).use_middleware(logging_middleware(
//!     LogConfig::new().with_input_logging(true).redact_field("ssn"),
//! ));
//! ```
//!
//! The middleware also puts the [`RequestId`] into the context, so handlers
//! can correlate their own log lines with it.

use crate::context::Context;
use crate::error::RpcResult;
use crate::middleware::{BoxFuture, Middleware, Next, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Length of the short request ID format (first N characters of UUID).
pub const SHORT_ID_LENGTH: usize = 8;

/// Default threshold for slow request warnings in milliseconds.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 1000;

/// Default replacement string for redacted sensitive fields.
pub const DEFAULT_REDACTION_REPLACEMENT: &str = "[REDACTED]";

/// Field names redacted by default (case-insensitive substring match).
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "cookie",
    "session",
];

// =============================================================================
// Request ID
// =============================================================================

/// Unique identifier for a request, used for log correlation.
///
/// Uses UUID v7, so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext)))
    }

    /// Short form of the ID for compact log output.
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(SHORT_ID_LENGTH).collect()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for request logging.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to log request input (redacted).
    pub log_input: bool,
    /// Whether to log response output (redacted).
    pub log_output: bool,
    /// Field names to redact (case-insensitive substring matching).
    pub redacted_fields: HashSet<String>,
    /// Replacement string for redacted values.
    pub redaction_replacement: String,
    /// Paths that are never logged.
    pub excluded_paths: HashSet<String>,
    /// Warn about calls slower than this many milliseconds.
    pub slow_request_threshold_ms: Option<u64>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_input: false,
            log_output: false,
            redacted_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
            redaction_replacement: DEFAULT_REDACTION_REPLACEMENT.to_string(),
            excluded_paths: HashSet::new(),
            slow_request_threshold_ms: Some(DEFAULT_SLOW_THRESHOLD_MS),
        }
    }
}

impl LogConfig {
    /// Creates a new logging configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable input logging
    #[must_use = "This method returns a new LogConfig and does not modify self"]
    pub fn with_input_logging(mut self, enabled: bool) -> Self {
        self.log_input = enabled;
        self
    }

    /// Enable or disable output logging
    #[must_use = "This method returns a new LogConfig and does not modify self"]
    pub fn with_output_logging(mut self, enabled: bool) -> Self {
        self.log_output = enabled;
        self
    }

    /// Add a field name to redact
    #[must_use = "This method returns a new LogConfig and does not modify self"]
    pub fn redact_field(mut self, field: impl Into<String>) -> Self {
        self.redacted_fields.insert(field.into());
        self
    }

    /// Never log calls to `path`
    #[must_use = "This method returns a new LogConfig and does not modify self"]
    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.insert(path.into());
        self
    }

    /// Set or clear the slow request threshold
    #[must_use = "This method returns a new LogConfig and does not modify self"]
    pub fn with_slow_request_threshold(mut self, threshold_ms: Option<u64>) -> Self {
        self.slow_request_threshold_ms = threshold_ms;
        self
    }

    /// Whether calls to `path` are logged.
    pub fn should_log_path(&self, path: &str) -> bool {
        !self.excluded_paths.contains(path)
    }
}

// =============================================================================
// Redaction
// =============================================================================

/// Replace the values of sensitive fields, at any depth.
///
/// A field is sensitive when its lowercased name contains one of the
/// configured names.
pub fn redact_value(value: &Value, config: &LogConfig) -> Value {
    let sensitive: Vec<String> = config.redacted_fields.iter().map(|s| s.to_lowercase()).collect();
    redact_with(value, &sensitive, &config.redaction_replacement)
}

fn redact_with(value: &Value, sensitive: &[String], replacement: &str) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let key_lower = key.to_lowercase();
                    let redacted = if sensitive.iter().any(|field| key_lower.contains(field.as_str())) {
                        Value::String(replacement.to_string())
                    } else {
                        redact_with(val, sensitive, replacement)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_with(item, sensitive, replacement))
                .collect(),
        ),
        other => other.clone(),
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Middleware logging every call it wraps.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    config: Arc<LogConfig>,
}

/// Create a logging middleware with `config`.
pub fn logging_middleware(config: LogConfig) -> LoggingMiddleware {
    LoggingMiddleware {
        config: Arc::new(config),
    }
}

impl Middleware for LoggingMiddleware {
    fn handle(&self, ctx: Context, req: Arc<Request>, next: Next) -> BoxFuture<RpcResult<Response>> {
        let config = Arc::clone(&self.config);
        Box::pin(async move {
            let existing = ctx.get::<RequestId>().copied();
            let (request_id, ctx) = match existing {
                Some(id) => (id, ctx),
                None => {
                    let id = RequestId::new();
                    (id, ctx.extend(id)?)
                }
            };

            if !config.should_log_path(&req.path) {
                return next.run(ctx).await;
            }

            if config.log_input {
                tracing::info!(
                    request_id = %request_id,
                    path = %req.path,
                    input = %redact_value(&req.input, &config),
                    "RPC call started"
                );
            } else {
                tracing::info!(request_id = %request_id, path = %req.path, "RPC call started");
            }

            let started = Instant::now();
            let result = next.run(ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(output) if config.log_output => tracing::info!(
                    request_id = %request_id,
                    path = %req.path,
                    duration_ms = duration_ms,
                    output = %redact_value(output, &config),
                    "RPC call succeeded"
                ),
                Ok(_) => tracing::info!(
                    request_id = %request_id,
                    path = %req.path,
                    duration_ms = duration_ms,
                    "RPC call succeeded"
                ),
                Err(err) => tracing::warn!(
                    request_id = %request_id,
                    path = %req.path,
                    duration_ms = duration_ms,
                    kind = %err.kind,
                    message = %err.message,
                    "RPC call failed"
                ),
            }

            if config
                .slow_request_threshold_ms
                .is_some_and(|threshold| duration_ms > threshold)
            {
                tracing::warn!(
                    request_id = %request_id.short(),
                    path = %req.path,
                    duration_ms = duration_ms,
                    "Slow RPC call"
                );
            }

            result
        })
    }
}
