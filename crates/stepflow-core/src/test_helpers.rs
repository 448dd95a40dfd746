//! Pre-built helpers for testing code that uses `stepflow-core` types.
//!
//! Available with the `test-utils` feature so downstream crates can reuse
//! them, and compiled under `#[cfg(test)]` for this crate's own tests.

use std::collections::HashSet;

use futures::StreamExt;

use crate::chat::{FinishReason, Message, ModelResponse, ToolCall};
use crate::error::Error;
use crate::mock::MockModel;
use crate::model::{Capability, ModelMetadata};
use crate::stream::{ModelStream, StreamPart};
use crate::usage::Usage;

/// A text response with [`FinishReason::Stop`] and [`sample_usage`].
pub fn sample_response(text: &str) -> ModelResponse {
    ModelResponse {
        text: Some(text.into()),
        finish_reason: FinishReason::Stop,
        usage: sample_usage(),
        ..Default::default()
    }
}

/// A response carrying `calls` with [`FinishReason::ToolCalls`].
pub fn sample_tool_response(calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse {
        tool_calls: calls,
        finish_reason: FinishReason::ToolCalls,
        usage: sample_usage(),
        ..Default::default()
    }
}

/// 100 prompt tokens, 50 completion tokens.
pub fn sample_usage() -> Usage {
    Usage::new(100, 50)
}

/// Shorthand for [`Message::user`].
pub fn user_msg(text: &str) -> Message {
    Message::user(text)
}

/// Text deltas followed by a finish part with [`sample_usage`].
pub fn text_stream_parts(deltas: &[&str], reason: FinishReason) -> Vec<StreamPart> {
    deltas
        .iter()
        .map(|d| StreamPart::TextDelta((*d).to_owned()))
        .chain(std::iter::once(StreamPart::Finish {
            reason,
            usage: sample_usage(),
        }))
        .collect()
}

/// Collects a stream, keeping errors.
pub async fn collect_stream_results(stream: ModelStream) -> Vec<Result<StreamPart, Error>> {
    stream.collect::<Vec<_>>().await
}

/// Collects a stream, panicking on any error.
pub async fn collect_stream(stream: ModelStream) -> Vec<StreamPart> {
    stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .map(|r| r.expect("stream part should be Ok"))
        .collect()
}

/// A [`MockModel`] named `model_id` with [`Capability::Tools`].
pub fn mock_model(model_id: &str) -> MockModel {
    MockModel::new(ModelMetadata {
        provider: "mock".into(),
        model_id: model_id.into(),
        capabilities: HashSet::from([Capability::Tools]),
    })
}

/// A [`MockModel`] with the given capabilities.
pub fn mock_model_with(model_id: &str, capabilities: &[Capability]) -> MockModel {
    MockModel::new(ModelMetadata {
        provider: "mock".into(),
        model_id: model_id.into(),
        capabilities: capabilities.iter().copied().collect(),
    })
}
