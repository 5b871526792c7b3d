//! Schema adapter
//!
//! Shapes are Rust types: serde does the structural check and, for types
//! registered with [`SchemaDescriptor::validated`], [`Validate`] checks the
//! contents. A [`SchemaDescriptor`] erases the type so contract trees can hold
//! schemas of different types side by side, while keeping the [`TypeId`] so a
//! typed handle can later prove it refers to the same schema.

use crate::error::SchemaError;
use crate::validation::{FieldError, Validate};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Bound shared by every type usable as an input or output schema.
pub trait SchemaType: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> SchemaType for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

type ParseFn = Arc<dyn Fn(Value) -> Result<Value, SchemaError> + Send + Sync>;

/// Type-erased schema attached to a contract leaf.
#[derive(Clone)]
pub struct SchemaDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    validated: bool,
    parse: ParseFn,
}

impl SchemaDescriptor {
    /// Schema checked by deserialization only.
    pub fn of<T: SchemaType>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            validated: false,
            parse: Arc::new(|value| {
                let typed = deserialize::<T>(value)?;
                reserialize(&typed)
            }),
        }
    }

    /// Schema checked by deserialization and then by [`Validate`].
    pub fn validated<T: SchemaType + Validate>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            validated: true,
            parse: Arc::new(|value| {
                let typed = deserialize::<T>(value)?;
                let result = typed.validate();
                if !result.is_valid() {
                    return Err(SchemaError {
                        schema: std::any::type_name::<T>().to_string(),
                        issues: result.errors,
                    });
                }
                reserialize(&typed)
            }),
        }
    }

    /// Check `value` against the schema, returning its normalized form.
    pub fn parse(&self, value: Value) -> Result<Value, SchemaError> {
        (self.parse)(value)
    }

    /// Check `value` and produce the typed value.
    pub fn parse_as<T: SchemaType>(&self, value: Value) -> Result<T, SchemaError> {
        let normalized = self.parse(value)?;
        deserialize::<T>(normalized)
    }

    /// Whether this schema was built for `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Rust type name of the schema.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether [`Validate`] rules run after deserialization.
    pub fn is_validated(&self) -> bool {
        self.validated
    }
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("type_name", &self.type_name)
            .field("validated", &self.validated)
            .finish()
    }
}

fn deserialize<T: SchemaType>(value: Value) -> Result<T, SchemaError> {
    serde_json::from_value(value).map_err(|e| SchemaError {
        schema: std::any::type_name::<T>().to_string(),
        issues: vec![FieldError::invalid_type(e.to_string())],
    })
}

fn reserialize<T: SchemaType>(typed: &T) -> Result<Value, SchemaError> {
    serde_json::to_value(typed).map_err(|e| SchemaError {
        schema: std::any::type_name::<T>().to_string(),
        issues: vec![FieldError::invalid_type(e.to_string())],
    })
}
