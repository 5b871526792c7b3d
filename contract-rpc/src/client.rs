//! Typed client
//!
//! A [`ContractClient`] turns contract handles into callable
//! [`ProcedureClient`]s. Calls go through a [`Link`]; [`FetchLink`] is the
//! HTTP link, POSTing to `{url}/{segment}/{segment}` with the body encoded in
//! the procedure's [`BodyFormat`] (see [`encode_body`]).
//!
//! ```rust,ignore
//! let link = FetchLink::new("http://localhost:3000/rpc").with_headers(|| {
//!     let mut headers = HeaderMap::new();
//!     if let Some(token) = current_token() {
//!         headers.insert(COOKIE, format!("session_token={}", token).parse().unwrap());
//!     }
//!     headers
//! });
//!
//! let client = ContractClient::new(link);
//! let greeting = client.procedure(&contract.procedure::<GreetingInput, GreetingOutput>("public.greeting")?);
//! let output = greeting.call(&GreetingInput { name: Some("Ada".into()) }).await?;
//! ```

use crate::contract::{BodyFormat, ContractLeaf, ContractProcedure};
use crate::error::{ClientError, RpcError, RpcErrorKind};
use crate::query::{QueryKey, QueryOptions};
use crate::schema::SchemaType;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace};

// =============================================================================
// Link
// =============================================================================

/// Transport used by clients to reach the server.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Call the procedure at `path` with an already validated `input`,
    /// sending it in `format`.
    async fn call(&self, path: &[String], format: BodyFormat, input: Value) -> Result<Value, ClientError>;
}

// =============================================================================
// Body Encoding
// =============================================================================

/// A request body ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// `Content-Type` header value
    pub content_type: &'static str,
    /// Body bytes
    pub bytes: Vec<u8>,
}

/// Encode `input` the way the server reads a body in `format`.
///
/// `Form` takes a flat object whose values are strings, numbers or booleans
/// (`null` fields are left out). `Text` takes a string. For both, a `null`
/// input is an empty body.
pub fn encode_body(format: BodyFormat, input: &Value) -> Result<EncodedBody, ClientError> {
    match format {
        BodyFormat::Json => {
            let bytes = serde_json::to_vec(input)
                .map_err(|e| ClientError::Encode(format!("invalid JSON input: {}", e)))?;
            Ok(EncodedBody {
                content_type: "application/json",
                bytes,
            })
        }
        BodyFormat::Form => {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            match input {
                Value::Null => {}
                Value::Object(fields) => {
                    for (key, value) in fields {
                        match value {
                            Value::Null => {}
                            Value::String(text) => {
                                form.append_pair(key, text);
                            }
                            Value::Bool(_) | Value::Number(_) => {
                                form.append_pair(key, &value.to_string());
                            }
                            Value::Array(_) | Value::Object(_) => {
                                return Err(ClientError::Encode(format!(
                                    "form field '{}' is not a scalar",
                                    key
                                )));
                            }
                        }
                    }
                }
                _ => return Err(ClientError::Encode("form input must be an object".to_string())),
            }
            Ok(EncodedBody {
                content_type: "application/x-www-form-urlencoded",
                bytes: form.finish().into_bytes(),
            })
        }
        BodyFormat::Text => {
            let bytes = match input {
                Value::Null => Vec::new(),
                Value::String(text) => text.clone().into_bytes(),
                _ => return Err(ClientError::Encode("text input must be a string".to_string())),
            };
            Ok(EncodedBody {
                content_type: "text/plain; charset=utf-8",
                bytes,
            })
        }
    }
}

type HeaderSupplier = Arc<dyn Fn() -> HeaderMap + Send + Sync>;

/// HTTP link over `reqwest`.
#[derive(Clone)]
pub struct FetchLink {
    client: reqwest::Client,
    url: String,
    headers: Option<HeaderSupplier>,
}

impl FetchLink {
    /// Link to `url`, which must include the mount prefix (`http://host/rpc`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            headers: None,
        }
    }

    /// Use a preconfigured `reqwest` client (timeouts, TLS, proxies).
    #[must_use = "This method returns a new FetchLink and does not modify self"]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Headers to attach, produced fresh for every call.
    #[must_use = "This method returns a new FetchLink and does not modify self"]
    pub fn with_headers<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> HeaderMap + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(supplier));
        self
    }

    /// Base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &[String]) -> String {
        format!("{}/{}", self.url, path.join("/"))
    }
}

impl fmt::Debug for FetchLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchLink")
            .field("url", &self.url)
            .field("headers", &self.headers.is_some())
            .finish()
    }
}

#[async_trait]
impl Link for FetchLink {
    async fn call(&self, path: &[String], format: BodyFormat, input: Value) -> Result<Value, ClientError> {
        let endpoint = self.endpoint(path);
        let body = encode_body(format, &input)?;
        let mut request = self
            .client
            .post(&endpoint)
            .header(CONTENT_TYPE, body.content_type)
            .body(body.bytes);
        if let Some(supplier) = &self.headers {
            request = request.headers(supplier());
        }

        trace!(endpoint = %endpoint, "Sending RPC request");
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body)
                .map_err(|e| ClientError::Decode(format!("invalid JSON response: {}", e)));
        }

        let error = serde_json::from_slice::<RpcError>(&body).unwrap_or_else(|_| {
            RpcError::new(
                RpcErrorKind::from_status(status),
                format!("Request failed with status {}", status),
            )
        });
        debug!(endpoint = %endpoint, status = status.as_u16(), kind = %error.kind, "RPC call failed");
        Err(ClientError::Rpc(error))
    }
}

// =============================================================================
// Contract Client
// =============================================================================

/// Factory of typed procedure clients sharing one link.
#[derive(Clone)]
pub struct ContractClient {
    link: Arc<dyn Link>,
}

impl ContractClient {
    /// Client over `link`.
    pub fn new<L: Link>(link: L) -> Self {
        Self {
            link: Arc::new(link),
        }
    }

    /// Client over an already shared link.
    pub fn from_shared(link: Arc<dyn Link>) -> Self {
        Self { link }
    }

    /// Typed client for `declared`.
    pub fn procedure<I, O>(&self, declared: &ContractProcedure<I, O>) -> ProcedureClient<I, O>
    where
        I: SchemaType,
        O: SchemaType,
    {
        ProcedureClient {
            link: Arc::clone(&self.link),
            leaf: Arc::clone(declared.leaf()),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for ContractClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractClient").finish_non_exhaustive()
    }
}

/// Callable client of one procedure.
pub struct ProcedureClient<I, O> {
    link: Arc<dyn Link>,
    leaf: Arc<ContractLeaf>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> ProcedureClient<I, O>
where
    I: SchemaType,
    O: SchemaType,
{
    /// Path segments of the procedure.
    pub fn path(&self) -> &[String] {
        self.leaf.path()
    }

    /// Call the procedure.
    ///
    /// The input is checked against the input schema before anything is
    /// sent; the output is checked against the output schema on arrival.
    pub async fn call(&self, input: &I) -> Result<O, ClientError> {
        let input = self.prepare(input)?;
        self.send(input).await
    }

    /// Key and fetch function for an external query cache.
    pub fn query_options(&self, input: &I) -> QueryOptions<O> {
        let prepared = self.prepare(input);
        let key = match &prepared {
            Ok(value) => QueryKey::new(self.leaf.path(), value),
            Err(_) => QueryKey::new(
                self.leaf.path(),
                &serde_json::to_value(input).unwrap_or(Value::Null),
            ),
        };

        let client = self.clone();
        QueryOptions::new(
            key,
            Arc::new(move || {
                let client = client.clone();
                let prepared = prepared.clone();
                Box::pin(async move { client.send(prepared?).await })
            }),
        )
    }

    /// Prefix key covering every call of this procedure.
    pub fn key(&self) -> QueryKey {
        QueryKey::prefix(self.leaf.path())
    }

    fn prepare(&self, input: &I) -> Result<Value, ClientError> {
        let value = serde_json::to_value(input)
            .map_err(|e| ClientError::Encode(format!("failed to serialize input: {}", e)))?;
        self.leaf
            .input()
            .parse(value)
            .map_err(ClientError::InvalidInput)
    }

    async fn send(&self, input: Value) -> Result<O, ClientError> {
        let output = self
            .link
            .call(self.leaf.path(), self.leaf.body_format(), input)
            .await?;
        self.leaf
            .output()
            .parse_as::<O>(output)
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

impl<I, O> Clone for ProcedureClient<I, O> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            leaf: Arc::clone(&self.leaf),
            _marker: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for ProcedureClient<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProcedureClient")
            .field(&self.leaf.dotted_path())
            .finish()
    }
}
