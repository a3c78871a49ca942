//! Token counting for the context-window preflight.

use crate::types::{ContentPart, Message};

use super::ToolDefinition;

/// Estimates how many prompt tokens a request will consume.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, messages: &[Message], tools: &[ToolDefinition]) -> usize;
}

/// Character-based estimator (about four characters per token).
///
/// Good enough to catch requests that are clearly too large when no real
/// tokenizer is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatingTokenCounter;

const MESSAGE_OVERHEAD_TOKENS: usize = 4;
const PART_OVERHEAD_TOKENS: usize = 8;

pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = MESSAGE_OVERHEAD_TOKENS;
    for part in &message.content {
        tokens += match part {
            ContentPart::Text { text } => estimate_text_tokens(text),
            ContentPart::Image(image) => estimate_text_tokens(&image.data) + PART_OVERHEAD_TOKENS,
            ContentPart::Json { value } => {
                let payload = serde_json::to_string(value).unwrap_or_default();
                estimate_text_tokens(&payload) + PART_OVERHEAD_TOKENS
            }
        };
    }
    for call in &message.tool_calls {
        let args = serde_json::to_string(&call.arguments).unwrap_or_default();
        tokens += estimate_text_tokens(&call.name) + estimate_text_tokens(&args) + PART_OVERHEAD_TOKENS;
    }
    if let Some(id) = &message.tool_call_id {
        tokens += estimate_text_tokens(id);
    }
    if let Some(name) = &message.name {
        tokens += estimate_text_tokens(name);
    }
    tokens
}

pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    let schema = serde_json::to_string(&tool.parameters).unwrap_or_default();
    estimate_text_tokens(&tool.name)
        + estimate_text_tokens(&tool.description)
        + estimate_text_tokens(&schema)
        + PART_OVERHEAD_TOKENS
}

impl TokenCounter for EstimatingTokenCounter {
    fn count_tokens(&self, messages: &[Message], tools: &[ToolDefinition]) -> usize {
        messages.iter().map(estimate_message_tokens).sum::<usize>()
            + tools.iter().map(estimate_tool_tokens).sum::<usize>()
    }
}
