//! Messages, parts, tool calls, and model responses.
//!
//! A conversation is an ordered list of [`Message`]s. Each message has a
//! [`Role`] and a sequence of [`Part`]s: text, images, tool calls made by
//! the assistant, or results sent back by the tool role.
//!
//! ```rust
//! use stepflow_core::{Message, Part, ToolCall};
//!
//! let call = ToolCall::new("call_1", "add", serde_json::json!({"a": 1, "b": 2}));
//! let assistant = Message::assistant_with_calls("Let me add that.", vec![call]);
//! assert_eq!(assistant.tool_calls().count(), 1);
//! ```

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::usage::Usage;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that steer the model.
    System,
    /// The human (or calling program).
    User,
    /// The model.
    Assistant,
    /// Results of tool executions.
    Tool,
}

/// One entry in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this message.
    pub role: Role,
    /// The ordered content parts.
    pub content: Vec<Part>,
}

impl Message {
    /// A system message with a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// A user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// An assistant message with a single text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// An assistant message with optional text followed by tool calls.
    ///
    /// Empty text is omitted so providers never see a blank text part.
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(Part::Text(text));
        }
        content.extend(calls.into_iter().map(Part::ToolCall));
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// A tool message carrying one or more results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            content: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![Part::Text(text.into())],
        }
    }

    /// Concatenation of all text parts.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Iterates over the tool calls in this message.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|p| match p {
            Part::ToolCall(call) => Some(call),
            _ => None,
        })
    }
}

/// A single piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Part {
    /// Plain text.
    Text(String),
    /// An image supplied inline or by URL.
    Image {
        /// Where the image bytes come from.
        source: ImageSource,
    },
    /// A tool invocation requested by the model.
    ToolCall(ToolCall),
    /// The outcome of a tool invocation.
    ToolResult(ToolResult),
}

/// Location of image data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageSource {
    /// Base64-encoded bytes.
    Base64 {
        /// MIME type, e.g. `"image/png"`.
        media_type: String,
        /// The encoded data.
        data: String,
    },
    /// A URL the provider fetches itself.
    Url {
        /// The image URL.
        url: String,
    },
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier; tool results reference it.
    pub id: String,
    /// The tool's name.
    pub name: String,
    /// Arguments as an opaque JSON value.
    pub arguments: Value,
}

impl ToolCall {
    /// Builds a tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of executing one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The [`ToolCall::id`] this result answers.
    pub tool_call_id: String,
    /// Name of the tool that ran.
    pub tool_name: String,
    /// The arguments the tool ran with.
    pub args: Value,
    /// The tool's output, or the error message when `is_error` is set.
    pub result: Value,
    /// Whether the executor failed.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result for `call`.
    pub fn success(call: &ToolCall, result: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            result,
            is_error: false,
        }
    }

    /// A failed result for `call`; `message` becomes the result value.
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
            result: Value::String(message.into()),
            is_error: true,
        }
    }
}

/// Why a model call stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model reached a natural stop.
    Stop,
    /// The output token limit was hit.
    Length,
    /// The model stopped to call tools.
    ToolCalls,
    /// A safety filter stopped generation.
    ContentFilter,
    /// The provider reported an error.
    Error,
    /// A provider-specific reason.
    Other,
    /// The provider did not say.
    #[default]
    Unknown,
}

/// Identity of one model response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Provider response id.
    pub id: Option<String>,
    /// The model that actually served the request.
    pub model_id: Option<String>,
    /// When the provider started the response.
    pub timestamp: Option<SystemTime>,
}

impl ResponseMetadata {
    /// Overlays the fields that `other` sets.
    pub fn merge(&mut self, other: ResponseMetadata) {
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.model_id.is_some() {
            self.model_id = other.model_id;
        }
        if other.timestamp.is_some() {
            self.timestamp = other.timestamp;
        }
    }
}

/// Something the provider ignored or could not honor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum CallWarning {
    /// A request setting the model does not support.
    UnsupportedSetting {
        /// The setting name, e.g. `"top_k"`.
        setting: String,
        /// Extra detail from the provider.
        details: Option<String>,
    },
    /// A tool the model could not accept.
    UnsupportedTool {
        /// The tool name.
        tool_name: String,
        /// Extra detail from the provider.
        details: Option<String>,
    },
    /// Free-form warning text.
    Other {
        /// The warning.
        message: String,
    },
}

/// The complete result of a non-streaming model call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text, if any.
    pub text: Option<String>,
    /// Tool calls the model made, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Token counts for this call.
    pub usage: Usage,
    /// Provider warnings.
    pub warnings: Vec<CallWarning>,
    /// Response identity.
    pub response: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_with_calls_skips_empty_text() {
        let call = ToolCall::new("c1", "add", json!({}));
        let msg = Message::assistant_with_calls("", vec![call.clone()]);
        assert_eq!(msg.content, vec![Part::ToolCall(call)]);
    }

    #[test]
    fn test_text_content_joins_parts() {
        let msg = Message {
            role: Role::Assistant,
            content: vec![
                Part::Text("Hello, ".into()),
                Part::ToolCall(ToolCall::new("c1", "t", json!({}))),
                Part::Text("world".into()),
            ],
        };
        assert_eq!(msg.text_content(), "Hello, world");
        assert_eq!(msg.tool_calls().count(), 1);
    }

    #[test]
    fn test_tool_result_error_carries_message() {
        let call = ToolCall::new("c1", "fail", json!({"x": 1}));
        let result = ToolResult::error(&call, "boom");
        assert!(result.is_error);
        assert_eq!(result.result, json!("boom"));
        assert_eq!(result.tool_call_id, "c1");
        assert_eq!(result.args, json!({"x": 1}));
    }

    #[test]
    fn test_finish_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(FinishReason::ToolCalls).unwrap(),
            json!("tool-calls")
        );
        assert_eq!(
            serde_json::to_value(FinishReason::ContentFilter).unwrap(),
            json!("content-filter")
        );
        assert_eq!(FinishReason::default(), FinishReason::Unknown);
    }

    #[test]
    fn test_response_metadata_merge_keeps_unset_fields() {
        let mut meta = ResponseMetadata {
            id: Some("resp-1".into()),
            model_id: Some("m".into()),
            timestamp: None,
        };
        meta.merge(ResponseMetadata {
            id: None,
            model_id: Some("m-2".into()),
            timestamp: None,
        });
        assert_eq!(meta.id.as_deref(), Some("resp-1"));
        assert_eq!(meta.model_id.as_deref(), Some("m-2"));
    }

    #[test]
    fn test_part_serializes_with_tag() {
        let part = Part::Image {
            source: ImageSource::Url {
                url: "https://example.com/cat.png".into(),
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["value"]["source"]["kind"], "url");
    }
}
