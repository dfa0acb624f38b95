//! Minimal configuration schema for broker registrations.
//!
//! Checks required fields and primitive JSON types; nothing more.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// JSON string.
    String,
    /// JSON integer.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Top-level key.
    pub name: String,
    /// Expected type.
    pub field_type: FieldType,
    /// Whether the key must be present.
    pub required: bool,
}

/// Configuration schema of a registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Declared fields. Undeclared keys are allowed.
    pub fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    /// Empty schema; accepts any object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    /// Add an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    /// Validate a configuration value. Returns one message per violation.
    #[must_use]
    pub fn validate(&self, config: &Value) -> Vec<String> {
        let Some(object) = config.as_object() else {
            if config.is_null() && !self.fields.iter().any(|f| f.required) {
                return Vec::new();
            }
            return vec!["configuration must be an object".to_string()];
        };

        let mut errors = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    errors.push(format!("missing required field '{}'", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.field_type.matches(value) => {
                    errors.push(format!(
                        "field '{}' must be of type {}",
                        field.name,
                        field.field_type.name()
                    ));
                }
                Some(_) => {}
            }
        }
        errors
    }
}
