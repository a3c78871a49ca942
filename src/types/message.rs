//! Message types exchanged with the model.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A message in a run's transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Set on `tool_result` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name on `tool_result` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set on assistant messages that request tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Marks a `tool_result` message produced from an error result.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    fn text_message(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
            is_error: false,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text)
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::Text { text }]
        };
        Self {
            role: Role::Assistant,
            content,
            tool_call_id: None,
            name: None,
            tool_calls,
            is_error: false,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        result: &ToolResult,
    ) -> Self {
        Self {
            role: Role::ToolResult,
            content: result.content.clone(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            tool_calls: Vec::new(),
            is_error: result.is_error,
        }
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// True when the message carries no visible text.
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image(ImageContent),
    Json { value: serde_json::Value },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Image content embedded in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}

/// A tool call requested by the model.
///
/// Calls whose arguments failed to parse are kept (so the model can be told
/// about the failure) but carry a `parse_error` and are never executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            parse_error: None,
        }
    }

    /// Build a call from the raw argument text a provider streamed back.
    ///
    /// Empty text means "no arguments". Text longer than `max_bytes`, malformed
    /// JSON, and non-object JSON produce an invalid call.
    pub fn from_raw(
        id: impl Into<String>,
        name: impl Into<String>,
        raw_arguments: &str,
        max_bytes: usize,
    ) -> Self {
        let id = id.into();
        let name = name.into();
        if raw_arguments.len() > max_bytes {
            let reason = format!(
                "arguments are {} bytes, limit is {max_bytes} bytes",
                raw_arguments.len()
            );
            return Self::invalid(id, name, reason);
        }
        let trimmed = raw_arguments.trim();
        if trimmed.is_empty() {
            return Self::new(id, name, serde_json::json!({}));
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value @ serde_json::Value::Object(_)) => Self::new(id, name, value),
            Ok(other) => {
                let reason = format!(
                    "arguments must be a JSON object, got {}",
                    json_type_name(&other)
                );
                Self::invalid(id, name, reason)
            }
            Err(err) => Self::invalid(id, name, format!("invalid JSON arguments: {err}")),
        }
    }

    /// A call the runner must refuse without executing.
    pub fn invalid(id: impl Into<String>, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: serde_json::Value::Null,
            parse_error: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.parse_error.is_none()
    }
}

/// Result of executing (or refusing) a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolResult {
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    /// Successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(text)],
            is_error: false,
            metadata: serde_json::Map::new(),
        }
    }

    /// Successful structured result.
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content: vec![ContentPart::Json { value }],
            is_error: false,
            metadata: serde_json::Map::new(),
        }
    }

    /// Error result with a text explanation.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(text)],
            is_error: true,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenated text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
