//! Content rules for schema types.
//!
//! Deserialization only checks shape. A type registered through
//! [`SchemaDescriptor::validated`](crate::SchemaDescriptor::validated) also
//! has its [`Validate`] rules run, on the server before the handler and on
//! the client before the request leaves.
//!
//! ```rust,ignore
//! impl Validate for GreetingInput {
//!     fn validate(&self) -> ValidationResult {
//!         ValidationRules::new()
//!             .required_if_present("name", self.name.as_deref())
//!             .max_length("name", self.name.as_deref().unwrap_or_default(), 64)
//!             .build()
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One rule violation, reported as an issue of a BAD_REQUEST error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field; empty when the whole value is at fault
    pub field: String,
    pub message: String,
    /// Stable machine-readable code (`required`, `max_length`, ...)
    pub code: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{} is required", field);
        Self::new(field, message, "required")
    }

    pub fn max_length(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        let message = format!("{} must be at most {} characters", field, max);
        Self::new(field, message, "max_length")
    }

    pub fn range(field: impl Into<String>, min: i64, max: i64) -> Self {
        let field = field.into();
        let message = format!("{} must be between {} and {}", field, min, max);
        Self::new(field, message, "range")
    }

    pub fn email(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{} must be a valid email address", field);
        Self::new(field, message, "email")
    }

    /// The value could not be deserialized into the schema type.
    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self::new("", message, "invalid_type")
    }
}

/// Outcome of [`Validate::validate`]; valid when no errors were collected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            debug!(error_count = errors.len(), ?fields, "Validation failed");
        }
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Constraints on a value beyond its serde shape.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// Collects every failing rule instead of stopping at the first.
#[derive(Debug, Default)]
pub struct ValidationRules {
    errors: Vec<FieldError>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank (whitespace-only) strings fail.
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            trace!(field, "Required field is blank");
            self.errors.push(FieldError::required(field));
        }
        self
    }

    /// Like [`required`](Self::required), but an absent value passes.
    pub fn required_if_present(self, field: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.required(field, value),
            None => self,
        }
    }

    /// Length is counted in characters, not bytes.
    pub fn max_length(mut self, field: &str, value: &str, max: usize) -> Self {
        if value.chars().count() > max {
            self.errors.push(FieldError::max_length(field, max));
        }
        self
    }

    /// Inclusive on both ends.
    pub fn range(mut self, field: &str, value: i64, min: i64, max: i64) -> Self {
        if !(min..=max).contains(&value) {
            self.errors.push(FieldError::range(field, min, max));
        }
        self
    }

    pub fn email(mut self, field: &str, value: &str) -> Self {
        let looks_valid = value.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
        if !looks_valid {
            self.errors.push(FieldError::email(field));
        }
        self
    }

    pub fn build(self) -> ValidationResult {
        ValidationResult::from_errors(self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_collect_every_failure() {
        let result = ValidationRules::new()
            .required("name", "   ")
            .max_length("bio", "abcdef", 3)
            .email("email", "not-an-email")
            .range("age", 200, 0, 150)
            .build();

        assert!(!result.is_valid());
        let codes: Vec<_> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["required", "max_length", "email", "range"]);
    }

    #[test]
    fn email_rule_accepts_plain_addresses() {
        assert!(ValidationRules::new().email("e", "ada@example.com").build().is_valid());
        assert!(!ValidationRules::new().email("e", "@example.com").build().is_valid());
        assert!(!ValidationRules::new().email("e", "ada@example.").build().is_valid());
        assert!(!ValidationRules::new().email("e", "a@b@c.com").build().is_valid());
    }

    #[test]
    fn required_if_present_ignores_absent_values() {
        assert!(ValidationRules::new().required_if_present("name", None).build().is_valid());
        assert!(!ValidationRules::new().required_if_present("name", Some(" ")).build().is_valid());
    }

    #[test]
    fn max_length_counts_characters() {
        assert!(ValidationRules::new().max_length("name", "ñañaña", 6).build().is_valid());
        let result = ValidationRules::new().max_length("name", "ñañañañ", 6).build();
        assert_eq!(result.errors, vec![FieldError::max_length("name", 6)]);
    }
}
