//! Common schema types

use crate::validation::{Validate, ValidationResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Input for procedures that take no arguments.
///
/// Accepts both `null` and `{}` on the wire and always serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoInput;

impl Serialize for NoInput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        serializer.serialize_map(Some(0))?.end()
    }
}

impl<'de> Deserialize<'de> for NoInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(NoInput),
            serde_json::Value::Object(map) if map.is_empty() => Ok(NoInput),
            other => Err(serde::de::Error::custom(format!(
                "expected null or an empty object, got {}",
                other
            ))),
        }
    }
}

impl Validate for NoInput {
    fn validate(&self) -> ValidationResult {
        ValidationResult::ok()
    }
}
