//! # stepflow-core
//!
//! Shared vocabulary for the `stepflow` orchestration crate.
//!
//! This crate holds the types that every layer speaks: messages, stream
//! parts, tool calls, usage, errors, JSON schemas and the
//! [`LanguageModel`] port that model backends implement. It contains no
//! orchestration logic; the step loop, the tool-call merge and streaming
//! object generation live in `stepflow`.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chat`] | Messages, parts, tool calls, finish reasons and responses |
//! | [`error`] | The unified [`Error`] type |
//! | [`id`] | Identifier generators |
//! | [`model`] | The [`LanguageModel`] port and [`ModelRequest`] |
//! | [`schema`] | [`JsonSchema`] and the [`SchemaValidator`] seam |
//! | [`stream`] | [`StreamPart`] and the [`ModelStream`] alias |
//! | [`usage`] | Token counts |

#![warn(missing_docs)]

pub mod chat;
pub mod error;
pub mod id;
pub mod model;
pub mod schema;
pub mod stream;
pub mod usage;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use chat::{
    CallWarning, FinishReason, ImageSource, Message, ModelResponse, Part, ResponseMetadata, Role,
    ToolCall, ToolResult,
};
pub use error::{Error, RetryReason};
pub use id::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use model::{
    Capability, DynLanguageModel, LanguageModel, ModelMetadata, ModelRequest, ResponseFormat,
    ToolChoice, ToolDefinition,
};
pub use schema::{FnValidator, JsonSchema, SchemaValidator, validator_fn};
pub use stream::{ModelStream, StreamPart, response_into_parts};
pub use usage::Usage;
