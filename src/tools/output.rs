//! Output shaping for tool results and summaries for observability.
//!
//! Byte budgets are measured on the JSON serialization of a result's content
//! blocks. Metadata is not counted, so the markers written by
//! [`limit_tool_result`] never push a limited result back over budget.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::message::json_type_name;
use crate::types::{ContentPart, ToolResult};

/// Smallest budget the limiter can always honor.
pub const MIN_TOOL_OUTPUT_BYTES: usize = 64;

const OMITTED_NOTICE: &str = "[Tool output omitted]";
const MAX_SUMMARY_KEYS: usize = 8;
const DEBUG_PREVIEW_BYTES: usize = 256;

/// Fidelity of argument/result summaries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SummaryMode {
    /// Shape only: types, key names, counts, byte sizes.
    #[default]
    Safe,
    /// Bounded content preview.
    Debug,
}

/// Serialized size of a result's content blocks.
pub fn estimate_result_bytes(result: &ToolResult) -> usize {
    serde_json::to_vec(&result.content)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}

/// Bound a tool result to `max_bytes`.
///
/// Results within budget are returned unchanged. Oversized results have their
/// content replaced by a notice (or nothing, when even the notice does not
/// fit); the error flag is kept and `truncated`, `estimated_bytes` and
/// `max_bytes` are recorded in metadata. Applying it twice is a no-op.
pub fn limit_tool_result(result: ToolResult, max_bytes: usize) -> ToolResult {
    let estimated = estimate_result_bytes(&result);
    if estimated <= max_bytes {
        return result;
    }

    let notice = format!(
        "[Tool output truncated: {estimated} bytes exceeds limit of {max_bytes} bytes]"
    );
    let content = [notice.as_str(), OMITTED_NOTICE]
        .into_iter()
        .map(|text| vec![ContentPart::text(text)])
        .find(|candidate| content_bytes(candidate) <= max_bytes)
        .unwrap_or_default();

    let mut metadata = result.metadata;
    metadata.insert("truncated".into(), serde_json::Value::Bool(true));
    metadata.insert("estimated_bytes".into(), estimated.into());
    metadata.insert("max_bytes".into(), max_bytes.into());

    ToolResult {
        content,
        is_error: result.is_error,
        metadata,
    }
}

fn content_bytes(content: &[ContentPart]) -> usize {
    serde_json::to_vec(content)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}

/// Summary of tool arguments for traces and events.
pub fn summarize_tool_arguments(arguments: &serde_json::Value, mode: SummaryMode) -> String {
    guarded(|| summarize_value(arguments, mode), || {
        json_type_name(arguments).to_string()
    })
}

/// Summary of a tool result for traces and events.
pub fn summarize_tool_result(result: &ToolResult, mode: SummaryMode) -> String {
    guarded(
        || match mode {
            SummaryMode::Safe => {
                let parts: Vec<String> = result.content.iter().map(summarize_part).collect();
                format!("result(error={}, parts=[{}])", result.is_error, parts.join(", "))
            }
            SummaryMode::Debug => {
                let rendered = serde_json::to_string(&result.content).unwrap_or_default();
                format!("result(error={}): {}", result.is_error, preview(&rendered))
            }
        },
        || "result".to_string(),
    )
}

fn guarded(summary: impl FnOnce() -> String, fallback: impl FnOnce() -> String) -> String {
    catch_unwind(AssertUnwindSafe(summary)).unwrap_or_else(|_| fallback())
}

fn summarize_part(part: &ContentPart) -> String {
    match part {
        ContentPart::Text { text } => format!("text(bytes={})", text.len()),
        ContentPart::Image(image) => {
            format!("image(mime={}, bytes={})", image.mime_type, image.data.len())
        }
        ContentPart::Json { value } => format!("json({})", summarize_value(value, SummaryMode::Safe)),
    }
}

fn summarize_value(value: &serde_json::Value, mode: SummaryMode) -> String {
    let rendered = serde_json::to_string(value).unwrap_or_default();
    if mode == SummaryMode::Debug {
        return preview(&rendered);
    }
    let bytes = rendered.len();
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).take(MAX_SUMMARY_KEYS).collect();
            let hidden = map.len().saturating_sub(MAX_SUMMARY_KEYS);
            let more = if hidden > 0 {
                format!(", +{hidden} more")
            } else {
                String::new()
            };
            keys.sort_unstable();
            format!("object(keys=[{}{more}], bytes={bytes})", keys.join(", "))
        }
        serde_json::Value::Array(items) => format!("array(len={}, bytes={bytes})", items.len()),
        serde_json::Value::String(text) => format!("string(bytes={})", text.len()),
        other => json_type_name(other).to_string(),
    }
}

fn preview(rendered: &str) -> String {
    if rendered.len() <= DEBUG_PREVIEW_BYTES {
        return rendered.to_string();
    }
    format!(
        "{}... ({} bytes)",
        truncate_utf8(rendered, DEBUG_PREVIEW_BYTES),
        rendered.len()
    )
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a char.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
