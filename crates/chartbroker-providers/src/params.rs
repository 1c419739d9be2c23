//! Provisioning and binding parameters
//!
//! Parameters are opaque JSON objects supplied by the platform. Providers
//! read individual values with dotted paths such as `auth.database`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A parameter had a value of the wrong type
#[derive(Debug, Error, PartialEq, Eq)]
#[error("parameter {path} must be a string, found {found}")]
pub struct ParamError {
    /// Dotted path of the offending parameter
    pub path: String,
    /// JSON type that was found instead
    pub found: &'static str,
}

/// Opaque JSON parameters for a provision or bind request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Value);

impl Default for Params {
    fn default() -> Self {
        Self(Value::Object(Default::default()))
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl Params {
    /// Empty parameter object
    pub fn empty() -> Self {
        Self::default()
    }

    /// The raw JSON value
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the raw JSON value
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Follow a dotted path; `None` if any segment is missing or not an object
    pub fn dig(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.0, |value, segment| value.as_object()?.get(segment))
    }

    /// String value at `path`; `None` when absent or null
    pub fn dig_str(&self, path: &str) -> Result<Option<&str>, ParamError> {
        match self.dig(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(ParamError {
                path: path.to_string(),
                found: json_type(other),
            }),
        }
    }

    /// First present, non-empty string among `paths`, else `default`
    ///
    /// Charts rename parameters between versions, so callers list the current
    /// path first and older spellings after it.
    pub fn dig_string_alt_or(&self, paths: &[&str], default: &str) -> Result<String, ParamError> {
        for path in paths {
            if let Some(value) = self.dig_str(path)? {
                if !value.is_empty() {
                    return Ok(value.to_string());
                }
            }
        }
        Ok(default.to_string())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
