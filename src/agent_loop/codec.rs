//! Versioned JSON codecs for paused runs.
//!
//! [`ContinuationCodec`] persists a whole [`Continuation`];
//! [`ToolTaskCodec`] exports only the deferred tool calls for external
//! workers. Both stamp `schema_version` and refuse any version they were not
//! written for.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::continuation::Continuation;
use super::executor::PendingToolExecution;
use super::types::{PauseReason, RunId};
use crate::error::{CodecError, TurnstileError};
use crate::tools::output::truncate_utf8;

pub const CONTINUATION_SCHEMA_VERSION: u32 = 1;
pub const TOOL_TASK_SCHEMA_VERSION: u32 = 1;
/// Byte budget for each persisted context attribute.
pub const MAX_CONTEXT_ATTRIBUTE_BYTES: usize = 1024;

/// Which context attributes a codec writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AttributeSelection {
    #[default]
    None,
    All,
    Keys(BTreeSet<String>),
}

impl AttributeSelection {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }

    fn includes(&self, key: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }

    /// Selected attributes, each cut to `max_bytes`.
    fn apply(
        &self,
        attributes: &BTreeMap<String, serde_json::Value>,
        max_bytes: usize,
    ) -> BTreeMap<String, serde_json::Value> {
        attributes
            .iter()
            .filter(|(key, _)| self.includes(key))
            .map(|(key, value)| (key.clone(), truncate_attribute(value, max_bytes)))
            .collect()
    }
}

fn truncate_attribute(value: &serde_json::Value, max_bytes: usize) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => {
            serde_json::Value::String(truncate_utf8(text, max_bytes).to_string())
        }
        other => {
            let rendered = serde_json::to_string(other).unwrap_or_default();
            if rendered.len() <= max_bytes {
                other.clone()
            } else {
                serde_json::Value::String(truncate_utf8(&rendered, max_bytes).to_string())
            }
        }
    }
}

fn check_schema_version(value: &serde_json::Value, supported: u32) -> Result<(), CodecError> {
    let version = value
        .get("schema_version")
        .ok_or(CodecError::MissingSchemaVersion)?;
    if version.as_u64() == Some(u64::from(supported)) {
        return Ok(());
    }
    Err(CodecError::UnsupportedSchemaVersion {
        found: version.to_string(),
        supported,
    })
}

#[derive(Serialize)]
struct ContinuationEnvelope<'a> {
    schema_version: u32,
    #[serde(flatten)]
    continuation: &'a Continuation,
}

/// Dumps and loads continuations as plain JSON values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationCodec {
    attributes: AttributeSelection,
    max_attribute_bytes: usize,
}

impl Default for ContinuationCodec {
    fn default() -> Self {
        Self {
            attributes: AttributeSelection::None,
            max_attribute_bytes: MAX_CONTEXT_ATTRIBUTE_BYTES,
        }
    }
}

impl ContinuationCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, selection: AttributeSelection) -> Self {
        self.attributes = selection;
        self
    }

    pub fn dump(&self, continuation: &Continuation) -> Result<serde_json::Value, TurnstileError> {
        let mut persisted = continuation.clone();
        persisted.context_attributes = self
            .attributes
            .apply(&continuation.context_attributes, self.max_attribute_bytes);
        let envelope = ContinuationEnvelope {
            schema_version: CONTINUATION_SCHEMA_VERSION,
            continuation: &persisted,
        };
        Ok(serde_json::to_value(envelope)?)
    }

    pub fn dump_string(&self, continuation: &Continuation) -> Result<String, TurnstileError> {
        Ok(serde_json::to_string(&self.dump(continuation)?)?)
    }

    /// Rebuild a continuation, rejecting unknown versions and broken invariants.
    pub fn load(&self, value: serde_json::Value) -> Result<Continuation, TurnstileError> {
        check_schema_version(&value, CONTINUATION_SCHEMA_VERSION)?;
        let mut value = value;
        if let Some(object) = value.as_object_mut() {
            object.remove("schema_version");
        }
        let continuation: Continuation =
            serde_json::from_value(value).map_err(CodecError::Malformed)?;
        continuation.validate()?;
        Ok(continuation)
    }

    pub fn load_str(&self, raw: &str) -> Result<Continuation, TurnstileError> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(CodecError::Malformed)?;
        self.load(value)
    }
}

/// Deferred tool calls of one paused turn, for an external worker fleet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolTaskBatch {
    pub schema_version: u32,
    pub run_id: RunId,
    pub turn_number: u32,
    pub tasks: Vec<PendingToolExecution>,
    #[serde(default)]
    pub context_attributes: BTreeMap<String, serde_json::Value>,
    pub max_tool_output_bytes: usize,
}

/// Exports pending executions of a continuation paused on tool results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolTaskCodec {
    attributes: AttributeSelection,
}

impl ToolTaskCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, selection: AttributeSelection) -> Self {
        self.attributes = selection;
        self
    }

    pub fn batch(&self, continuation: &Continuation) -> Result<ToolTaskBatch, TurnstileError> {
        if continuation.pause_reason != PauseReason::AwaitingToolResults {
            return Err(
                CodecError::NotAwaitingToolResults(continuation.pause_reason.to_string()).into(),
            );
        }
        Ok(ToolTaskBatch {
            schema_version: TOOL_TASK_SCHEMA_VERSION,
            run_id: continuation.run_id,
            turn_number: continuation.turn,
            tasks: continuation.pending_tool_executions.clone(),
            context_attributes: self
                .attributes
                .apply(&continuation.context_attributes, MAX_CONTEXT_ATTRIBUTE_BYTES),
            max_tool_output_bytes: continuation.max_tool_output_bytes,
        })
    }

    pub fn dump(&self, continuation: &Continuation) -> Result<serde_json::Value, TurnstileError> {
        Ok(serde_json::to_value(self.batch(continuation)?)?)
    }

    pub fn load(&self, value: serde_json::Value) -> Result<ToolTaskBatch, TurnstileError> {
        check_schema_version(&value, TOOL_TASK_SCHEMA_VERSION)?;
        Ok(serde_json::from_value(value).map_err(CodecError::Malformed)?)
    }
}
