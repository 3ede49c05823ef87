//! Startup validation of the config document against a small JSON schema

use crate::config::{API_KEY_KEY, CITY_KEY, DELAY_KEY, ENDPOINT_KEY};
use crate::error::ConfigError;
use serde_json::{json, Value};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Schema for the capture daemon's config file.
///
/// `acquisition_delay` is only required when the delay is not overridden on
/// the command line.
pub fn config_schema(require_delay: bool) -> Value {
    let mut required = vec![CITY_KEY, API_KEY_KEY];
    if require_delay {
        required.push(DELAY_KEY);
    }

    json!({
        "type": "object",
        "required": required,
        "properties": {
            CITY_KEY: { "type": "string" },
            API_KEY_KEY: { "type": "string" },
            DELAY_KEY: { "type": "integer" },
            ENDPOINT_KEY: { "type": "string" }
        }
    })
}

/// Validate a config document against a schema
pub fn validate_config(document: &Value, schema: &Value) -> Result<()> {
    if !document.is_object() {
        return Err(ConfigError::WrongType {
            key: "<root>".to_string(),
            expected: "object",
        });
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field_name in required {
            let Some(field_str) = field_name.as_str() else {
                continue;
            };
            if document.get(field_str).is_none() {
                return Err(ConfigError::MissingKey(field_str.to_string()));
            }
        }
    }

    if let (Some(properties), Some(doc)) = (
        schema.get("properties").and_then(|p| p.as_object()),
        document.as_object(),
    ) {
        for (key, value) in doc {
            if let Some(prop_schema) = properties.get(key) {
                validate_type(key, value, prop_schema)?;
            }
        }
    }

    Ok(())
}

fn validate_type(key: &str, value: &Value, schema: &Value) -> Result<()> {
    let Some(expected_type) = schema.get("type").and_then(|t| t.as_str()) else {
        return Ok(());
    };

    let (valid, expected) = match expected_type {
        "string" => (value.is_string(), "string"),
        "integer" => (value.is_u64() || value.is_i64(), "integer"),
        "number" => (value.is_number(), "number"),
        "boolean" => (value.is_boolean(), "boolean"),
        "object" => (value.is_object(), "object"),
        _ => (true, "any"),
    };

    if valid {
        Ok(())
    } else {
        Err(ConfigError::WrongType {
            key: key.to_string(),
            expected,
        })
    }
}
