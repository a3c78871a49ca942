//! Typed access to tool call arguments.

use crate::error::TurnstileError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, TurnstileError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("string", key))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, TurnstileError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing("integer", key))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, TurnstileError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| missing("float", key))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, TurnstileError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| missing("boolean", key))
    }

    /// Get an array argument.
    pub fn get_array(&self, key: &str) -> Result<&Vec<serde_json::Value>, TurnstileError> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| missing("array", key))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, TurnstileError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            TurnstileError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

fn missing(kind: &str, key: &str) -> TurnstileError {
    TurnstileError::InvalidArgument(format!("Missing {kind} argument: {key}"))
}
