//! Error types for RPC operations
//!
//! # Error Kinds
//!
//! Error kinds are represented by the [`RpcErrorKind`] enum. When serialized,
//! kinds are converted to SCREAMING_SNAKE_CASE strings, which is the form the
//! client reads back from an error response body.
//!
//! # Example
//! ```rust,ignore
//! use contract_rpc::{RpcError, RpcErrorKind};
//!
//! let error = RpcError::new(RpcErrorKind::NotFound, "User not found");
//! let error = RpcError::unauthorized("Authentication required");
//! ```

use crate::validation::FieldError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error kinds for RPC operations.
///
/// Every kind maps onto exactly one HTTP status, see [`RpcErrorKind::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// The request was malformed or failed input validation
    BadRequest,
    /// Authentication is required
    Unauthorized,
    /// The authenticated user lacks permission
    Forbidden,
    /// The requested procedure or resource was not found
    NotFound,
    /// The HTTP method cannot be used to call procedures
    MethodNotSupported,
    /// The request payload exceeds size limits
    PayloadTooLarge,
    /// An unexpected internal error occurred
    Internal,
}

impl RpcErrorKind {
    /// Returns the wire representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status used when this kind is sent as a response.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Best-effort mapping from a response status back to a kind.
    ///
    /// Used by the client when an error response carries no readable body.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::BadRequest,
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::METHOD_NOT_ALLOWED => Self::MethodNotSupported,
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge,
            _ => Self::Internal,
        }
    }

    /// Returns true if this is a client error (4xx equivalent).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC error with a kind, a message and optional metadata.
///
/// This is both the error type handlers and middleware return and the body of
/// every non-success response.
///
/// # Example
/// ```rust,ignore
/// use contract_rpc::RpcError;
///
/// let error = RpcError::bad_request("Invalid input")
///     .with_metadata(serde_json::json!({ "field": "name" }))
///     .with_cause("name was empty after trimming");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{kind}] {message}")]
pub struct RpcError {
    /// Error kind
    pub kind: RpcErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Optional structured metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Server-side cause, logged but never sent over the wire
    #[serde(skip)]
    pub cause: Option<String>,
}

impl RpcError {
    /// Create a new error with kind and message.
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            metadata: None,
            cause: None,
        }
    }

    /// Attach metadata to the error.
    pub fn with_metadata(mut self, metadata: impl Serialize) -> Self {
        self.metadata = serde_json::to_value(metadata).ok();
        self
    }

    /// Add a cause string for server-side debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Sanitize error for client response (removes internal details for server errors).
    pub fn sanitize(mut self) -> Self {
        if matches!(self.kind, RpcErrorKind::Internal) {
            self.message = "Internal server error".to_string();
            self.metadata = None;
            self.cause = None;
        }
        self
    }

    // Convenience constructors

    /// Create a BAD_REQUEST error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::BadRequest, message)
    }

    /// Create an UNAUTHORIZED error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Unauthorized, message)
    }

    /// Create a FORBIDDEN error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Forbidden, message)
    }

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::NotFound, message)
    }

    /// Create a NOT_FOUND error for an unknown procedure path.
    pub fn procedure_not_found(path: &str) -> Self {
        Self::not_found(format!("Procedure '{}' not found", path))
    }

    /// Create a METHOD_NOT_SUPPORTED error.
    pub fn method_not_supported(method: &http::Method) -> Self {
        Self::new(
            RpcErrorKind::MethodNotSupported,
            format!("Method {} cannot be used to call procedures", method),
        )
    }

    /// Create a PAYLOAD_TOO_LARGE error.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::PayloadTooLarge, message)
    }

    /// Create an INTERNAL error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Internal, message)
    }

    /// Create the INTERNAL error reported for misuse of `Next` by a middleware.
    pub fn middleware_violation(message: impl Into<String>) -> Self {
        Self::internal("Middleware contract violation").with_cause(message)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("Malformed JSON: {}", err))
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Structured schema validation failure.
///
/// Produced by the schema adapter when a value does not match its declared
/// shape. Carries one [`FieldError`] per problem found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("value does not match schema '{schema}': {}", summarize(.issues))]
pub struct SchemaError {
    /// Type name of the schema that rejected the value
    pub schema: String,
    /// Individual problems
    pub issues: Vec<FieldError>,
}

fn summarize(issues: &[FieldError]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SchemaError {
    /// Convert into the error returned for an invalid procedure input.
    pub fn into_input_error(self) -> RpcError {
        RpcError::bad_request("Input validation failed")
            .with_metadata(serde_json::json!({ "issues": self.issues }))
    }

    /// Convert into the error returned when a handler produced an invalid output.
    pub fn into_output_error(self) -> RpcError {
        RpcError::internal("Output validation failed").with_cause(self.to_string())
    }
}

/// Errors raised while defining a contract or building a router against one.
///
/// All of these are start-up failures: a process that hits one should not
/// begin serving requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The same key was registered twice at one level of a tree
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),
    /// A key is not a valid path segment
    #[error("invalid key '{0}': keys must match [A-Za-z_][A-Za-z0-9_-]*")]
    InvalidKey(String),
    /// A sub-tree has no procedures
    #[error("'{0}' has no procedures")]
    EmptyTree(String),
    /// Lookup of a path that is not a procedure in the contract
    #[error("'{0}' is not a procedure in the contract")]
    UnknownProcedure(String),
    /// The requested input/output types differ from the registered schemas
    #[error("schema mismatch at '{path}': expected {expected}, found {found}")]
    SchemaMismatch {
        /// Procedure path
        path: String,
        /// Registered schema types
        expected: String,
        /// Requested schema types
        found: String,
    },
    /// The router is missing a key the contract declares
    #[error("router is missing '{0}' declared by the contract")]
    MissingKey(String),
    /// The router has a key the contract does not declare
    #[error("router declares '{0}' which is not in the contract")]
    UnexpectedKey(String),
    /// The router has a procedure where the contract has a sub-tree, or the reverse
    #[error("shape mismatch at '{path}': contract has a {expected}, router has a {found}")]
    ShapeMismatch {
        /// Path of the mismatching node
        path: String,
        /// What the contract has there
        expected: &'static str,
        /// What the router has there
        found: &'static str,
    },
    /// A procedure implementing one contract path was mounted at another
    #[error("procedure implementing '{implemented}' is mounted at '{mounted}'")]
    MisplacedProcedure {
        /// Contract path the procedure implements
        implemented: String,
        /// Router position it was registered at
        mounted: String,
    },
}

/// Errors a typed client call can fail with.
///
/// A server-side failure arrives as [`ClientError::Rpc`] carrying the same
/// kind the server produced; everything else is local to the client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The server answered with an error body
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The input did not satisfy the contract's input schema; nothing was sent
    #[error("invalid input: {0}")]
    InvalidInput(SchemaError),
    /// The input could not be encoded in the procedure's body format
    #[error("failed to encode request: {0}")]
    Encode(String),
    /// The response could not be decoded or failed output validation
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// The request could not be sent or the response could not be read
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// The server-side error kind, if the server produced this error.
    pub fn kind(&self) -> Option<RpcErrorKind> {
        match self {
            Self::Rpc(err) => Some(err.kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
