//! Streaming model output.
//!
//! A streaming model call yields [`StreamPart`]s through a
//! [`ModelStream`]. Parts arrive in the provider's order: text deltas,
//! tool-call argument fragments, complete tool calls, response metadata,
//! and a closing [`Finish`](StreamPart::Finish) carrying the finish reason
//! and usage.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use stepflow_core::{ModelStream, StreamPart};
//!
//! async fn print_stream(mut stream: ModelStream) {
//!     while let Some(part) = stream.next().await {
//!         match part {
//!             Ok(StreamPart::TextDelta(text)) => print!("{text}"),
//!             Ok(StreamPart::Finish { reason, .. }) => println!("\n[{reason:?}]"),
//!             Err(e) => eprintln!("stream error: {e}"),
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! # Tool calls
//!
//! A tool call may be announced through any number of
//! [`ToolCallDelta`](StreamPart::ToolCallDelta) fragments sharing one
//! `id`, and always ends with a single [`ToolCall`](StreamPart::ToolCall)
//! holding the parsed arguments. Consumers that only care about complete
//! calls can ignore the deltas.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::chat::{FinishReason, ModelResponse, ResponseMetadata, ToolCall};
use crate::error::Error;
use crate::usage::Usage;

/// A pinned, boxed, `Send` stream of [`StreamPart`] results.
///
/// `Err` items are transport failures; in-band provider errors arrive as
/// [`StreamPart::Error`].
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamPart, Error>> + Send>>;

/// One incremental piece of a streaming model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum StreamPart {
    /// A fragment of generated text.
    TextDelta(String),
    /// A fragment of a tool call's JSON arguments.
    ToolCallDelta {
        /// The tool call this fragment belongs to.
        id: String,
        /// The tool being called.
        name: String,
        /// Raw argument text to append.
        args_delta: String,
    },
    /// A complete tool call with parsed arguments.
    ToolCall(ToolCall),
    /// Response identity, usually sent once near the start.
    ResponseMetadata(ResponseMetadata),
    /// The model stopped producing output.
    Finish {
        /// Why the model stopped.
        reason: FinishReason,
        /// Token counts for the whole call.
        usage: Usage,
    },
    /// The provider reported an error inside the stream.
    Error {
        /// Provider-supplied description.
        message: String,
    },
}

/// Replays a complete response as the parts a streaming call would yield.
///
/// Order: metadata, text, tool calls, finish. Lets code written against
/// streams consume non-streaming responses unchanged.
pub fn response_into_parts(response: ModelResponse) -> Vec<StreamPart> {
    let ModelResponse {
        text,
        tool_calls,
        finish_reason,
        usage,
        warnings: _,
        response,
    } = response;

    let mut parts = Vec::with_capacity(tool_calls.len() + 3);
    parts.push(StreamPart::ResponseMetadata(response));
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        parts.push(StreamPart::TextDelta(text));
    }
    parts.extend(tool_calls.into_iter().map(StreamPart::ToolCall));
    parts.push(StreamPart::Finish {
        reason: finish_reason,
        usage,
    });
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_response_into_parts_order() {
        let response = ModelResponse {
            text: Some("checking".into()),
            tool_calls: vec![
                ToolCall::new("c1", "a", json!({})),
                ToolCall::new("c2", "b", json!({})),
            ],
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::new(3, 4),
            ..Default::default()
        };
        let parts = response_into_parts(response);
        assert_eq!(parts.len(), 5);
        assert!(matches!(parts[0], StreamPart::ResponseMetadata(_)));
        assert_eq!(parts[1], StreamPart::TextDelta("checking".into()));
        assert!(matches!(&parts[2], StreamPart::ToolCall(c) if c.id == "c1"));
        assert!(matches!(&parts[3], StreamPart::ToolCall(c) if c.id == "c2"));
        assert_eq!(
            parts[4],
            StreamPart::Finish {
                reason: FinishReason::ToolCalls,
                usage: Usage::new(3, 4),
            }
        );
    }

    #[test]
    fn test_response_into_parts_skips_empty_text() {
        let parts = response_into_parts(ModelResponse {
            text: Some(String::new()),
            finish_reason: FinishReason::Stop,
            ..Default::default()
        });
        assert_eq!(parts.len(), 2);
    }

    #[tokio::test]
    async fn test_model_stream_error_mid_stream() {
        let parts = vec![
            Ok(StreamPart::TextDelta("hello".into())),
            Err(Error::Http {
                status: Some(http::StatusCode::INTERNAL_SERVER_ERROR),
                message: "server error".into(),
                retryable: true,
            }),
        ];
        let stream: ModelStream = Box::pin(futures::stream::iter(parts));
        let collected: Vec<_> = stream.collect().await;
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }

    #[test]
    fn test_model_stream_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ModelStream>();
    }
}
