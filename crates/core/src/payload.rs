//! Configuration payload type and the sanity checks applied before a payload
//! is persisted.
//!
//! Field-level rules (enums, ranges, colour formats) belong to the request
//! validator in front of the core. Here we only make sure the payload is a
//! non-empty JSON object of reasonable size.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum serialized size of a configuration payload.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Maximum length of an audit note attached to a version.
pub const MAX_NOTES_LENGTH: usize = 1000;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// An immutable map of named widget settings (theme, colours, texts,
/// knowledge-base sub-config, free-form extras).
///
/// Deserialization goes through [`ConfigPayload::from_map`], so a decoded
/// payload satisfies the same checks as one built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ConfigPayload(Map<String, Value>);

impl TryFrom<Map<String, Value>> for ConfigPayload {
    type Error = CoreError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_map(map)
    }
}

impl From<ConfigPayload> for Map<String, Value> {
    fn from(payload: ConfigPayload) -> Self {
        payload.0
    }
}

impl ConfigPayload {
    /// Build a payload from an arbitrary JSON value, rejecting anything that
    /// is not a non-empty object within [`MAX_PAYLOAD_BYTES`].
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(CoreError::Validation(format!(
                "Configuration payload must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self, CoreError> {
        if map.is_empty() {
            return Err(CoreError::Validation(
                "Configuration payload must not be empty".to_string(),
            ));
        }
        if map.keys().any(|k| k.trim().is_empty()) {
            return Err(CoreError::Validation(
                "Configuration field names must not be blank".to_string(),
            ));
        }
        let size = serde_json::to_vec(&map)
            .map_err(|e| CoreError::Internal(format!("payload serialization failed: {e}")))?
            .len();
        if size > MAX_PAYLOAD_BYTES {
            return Err(CoreError::Validation(format!(
                "Configuration payload is {size} bytes, maximum is {MAX_PAYLOAD_BYTES}"
            )));
        }
        Ok(Self(map))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Validate an optional audit note: trimmed length within [`MAX_NOTES_LENGTH`].
pub fn validate_notes(notes: Option<&str>) -> Result<(), CoreError> {
    if let Some(notes) = notes {
        if notes.trim().chars().count() > MAX_NOTES_LENGTH {
            return Err(CoreError::Validation(format!(
                "Notes exceed maximum length of {MAX_NOTES_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
