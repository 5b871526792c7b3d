//! Query adapter
//!
//! Wraps a procedure call into what an external query cache needs: a
//! deterministic key and a fetch function. No caching happens here.
//!
//! ```rust,ignore
//! let options = client.public.greeting.query_options(&GreetingInput { name: None });
//! let cached = cache.get_or_fetch(options.key.to_string(), || options.fetch()).await?;
//!
//! // After a mutation, drop everything under `public.greeting`:
//! cache.retain(|key| !key.starts_with(&client.public.greeting.key()));
//! ```

use crate::error::ClientError;
use crate::middleware::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Deterministic key of a call: its path plus its normalized input.
///
/// A key without input is a prefix key matching every call to the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    path: Vec<String>,
    input: Option<String>,
}

impl QueryKey {
    /// Key for one call of `path` with `input`.
    pub fn new(path: &[String], input: &Value) -> Self {
        Self {
            path: path.to_vec(),
            input: Some(normalize_json(input)),
        }
    }

    /// Key matching every call of `path`.
    pub fn prefix(path: &[String]) -> Self {
        Self {
            path: path.to_vec(),
            input: None,
        }
    }

    /// Path segments.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Normalized input, absent for prefix keys.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// Whether `prefix` covers this key.
    ///
    /// A prefix key covers keys whose path starts with its path; a full key
    /// covers only itself.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        if !self.path.starts_with(&prefix.path) {
            return false;
        }
        match &prefix.input {
            None => true,
            Some(input) => prefix.path.len() == self.path.len() && self.input.as_ref() == Some(input),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.input {
            Some(input) => write!(f, "{}:{}", self.path.join("."), input),
            None => write!(f, "{}", self.path.join(".")),
        }
    }
}

/// Generate a cache key string from a dotted path and input.
///
/// Object keys are sorted, so structurally equal inputs produce equal keys.
pub fn generate_query_key(path: &str, input: &Value) -> String {
    format!("{}:{}", path, normalize_json(input))
}

/// Normalize JSON for deterministic key generation
fn normalize_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(normalize_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(fields) => {
            let mut pairs: Vec<_> = fields.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            let items: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String((*k).clone()), normalize_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

type FetchFn<O> = Arc<dyn Fn() -> BoxFuture<Result<O, ClientError>> + Send + Sync>;

/// Key and fetch function for one call, ready for an external cache.
pub struct QueryOptions<O> {
    /// Cache key
    pub key: QueryKey,
    fetch: FetchFn<O>,
}

impl<O> QueryOptions<O> {
    pub(crate) fn new(key: QueryKey, fetch: FetchFn<O>) -> Self {
        Self { key, fetch }
    }

    /// The cache key.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Perform the call. Every invocation issues a new request.
    pub fn fetch(&self) -> BoxFuture<Result<O, ClientError>> {
        (self.fetch)()
    }
}

impl<O> Clone for QueryOptions<O> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            fetch: Arc::clone(&self.fetch),
        }
    }
}

impl<O> fmt::Debug for QueryOptions<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn key_ignores_object_key_order() {
        let a = json!({ "b": 1, "a": { "y": [1, 2], "x": null } });
        let b = json!({ "a": { "x": null, "y": [1, 2] }, "b": 1 });
        assert_eq!(generate_query_key("users.get", &a), generate_query_key("users.get", &b));
        assert_eq!(QueryKey::new(&path("users.get"), &a), QueryKey::new(&path("users.get"), &b));
    }

    #[test]
    fn key_changes_with_input_and_path() {
        let input = json!({ "name": "Ada" });
        let key = generate_query_key("public.greeting", &input);
        assert_ne!(key, generate_query_key("public.greeting", &json!({ "name": "Bob" })));
        assert_ne!(key, generate_query_key("private.greeting", &input));
        assert_eq!(key, r#"public.greeting:{"name":"Ada"}"#);
    }

    #[test]
    fn strings_are_escaped() {
        let a = generate_query_key("p", &json!({ "k": "a\",\"b" }));
        let b = generate_query_key("p", &json!({ "k": "a", "b": "" }));
        assert_ne!(a, b);
    }

    #[test]
    fn prefix_keys_match_calls() {
        let call = QueryKey::new(&path("public.greeting"), &json!({}));
        assert!(call.starts_with(&QueryKey::prefix(&path("public.greeting"))));
        assert!(call.starts_with(&QueryKey::prefix(&path("public"))));
        assert!(call.starts_with(&call));
        assert!(!call.starts_with(&QueryKey::prefix(&path("private"))));
        assert!(!call.starts_with(&QueryKey::new(&path("public.greeting"), &json!({ "name": "x" }))));
    }
}
