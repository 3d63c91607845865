//! The opaque schema collaborator contract.
//!
//! Schemas come from an external subsystem; the invocation core never looks
//! inside one. It attaches a schema to a [`crate::Function`] at registration
//! and hands it back out on resolution, nothing more.

use std::sync::Arc;

use serde_json::Value;

/// One validation failure, pointing at the offending location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// JSON-pointer-ish path to the failing value.
    pub path: String,
    pub message: String,
}

/// Outcome of validating a value against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Descriptive schema metadata, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
}

/// Contract the external schema subsystem fulfills.
pub trait Schema: Send + Sync {
    fn validate(&self, value: &Value) -> ValidationResult;

    fn to_json_schema(&self) -> Value;

    fn generate_example(&self) -> Value;

    fn metadata(&self) -> SchemaMetadata {
        SchemaMetadata::default()
    }

    /// Object-safe clone; portals share schemas behind `Arc` and only reach
    /// for this when they need an owned copy.
    fn clone_schema(&self) -> Arc<dyn Schema>;
}

/// Schema that accepts any value. Useful as a default and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySchema;

impl Schema for AnySchema {
    fn validate(&self, _value: &Value) -> ValidationResult {
        ValidationResult::ok()
    }

    fn to_json_schema(&self) -> Value {
        serde_json::json!({})
    }

    fn generate_example(&self) -> Value {
        Value::Null
    }

    fn clone_schema(&self) -> Arc<dyn Schema> {
        Arc::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_schema_accepts_everything() {
        let schema = AnySchema;
        assert!(schema.validate(&serde_json::json!({"x": 1})).valid);
        assert!(schema.validate(&Value::Null).valid);
        assert_eq!(schema.to_json_schema(), serde_json::json!({}));
    }
}
