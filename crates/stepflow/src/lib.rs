//! # stepflow
//!
//! Step-loop orchestration for language models: multi-step tool use,
//! continuation of cut-off answers, concurrent tool execution and
//! streaming structured output.
//!
//! Model backends implement [`LanguageModel`] from `stepflow-core`
//! (re-exported here). Everything above a single model call lives in this
//! crate.
//!
//! # Architecture
//!
//! ```text
//!   generate_text / stream_text          generate_object / stream_object
//!              │                                      │
//!              ▼                                      ▼
//!   ┌─────────────────────┐                ┌─────────────────────┐
//!   │   step loop         │                │   Materializer      │
//!   │   (generate)        │                │   (object, json)    │
//!   └──────────┬──────────┘                └──────────┬──────────┘
//!              │                                      │
//!              ▼                                      │
//!   ┌─────────────────────┐                           │
//!   │   merge + tools     │                           │
//!   └──────────┬──────────┘                           │
//!              └─────────────┬────────────────────────┘
//!                            ▼
//!               RetryPolicy → dyn DynLanguageModel
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::{Value, json};
//! use stepflow::tool::{ToolError, tool_fn};
//! use stepflow::{
//!     GenerateTextConfig, JsonSchema, Message, ModelRequest, ToolDefinition, ToolRegistry,
//!     generate_text,
//! };
//!
//! # async fn example(model: &dyn stepflow::DynLanguageModel) -> Result<(), stepflow::Error> {
//! let mut tools = ToolRegistry::new();
//! tools.register(tool_fn(
//!     ToolDefinition {
//!         name: "add".into(),
//!         description: "Add two numbers".into(),
//!         parameters: JsonSchema::new(json!({
//!             "type": "object",
//!             "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
//!             "required": ["a", "b"]
//!         })),
//!     },
//!     |args: Value| async move {
//!         let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
//!         Ok::<_, ToolError>(json!(sum))
//!     },
//! ));
//!
//! let request = ModelRequest {
//!     messages: vec![Message::user("What is 2 + 3?")],
//!     ..Default::default()
//! };
//! let config = GenerateTextConfig { max_steps: 3, ..Default::default() };
//! let result = generate_text(model, Arc::new(tools), request, config).await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`generate`] | The step loop: [`generate_text`] and [`stream_text`] |
//! | [`merge`] | Concurrent tool execution over a model stream |
//! | [`tool`] | Tool handlers and the [`ToolRegistry`] |
//! | [`object`] | Structured output and the incremental [`Materializer`](object::Materializer) |
//! | [`json`] | Repair and parsing of truncated JSON |
//! | [`retry`] | Exponential-backoff [`RetryPolicy`] |
//! | [`deferred`] | Write-once result handles |

#![warn(missing_docs)]

pub mod deferred;
pub mod generate;
pub mod json;
pub mod merge;
pub mod object;
pub mod retry;
pub mod tool;

pub use stepflow_core::{chat, error, id, model, schema, stream, usage};

#[cfg(any(test, feature = "test-utils"))]
pub use stepflow_core::{mock, test_helpers};

// Vocabulary from stepflow-core.
pub use stepflow_core::{
    CallWarning, Capability, DynLanguageModel, Error, FinishReason, FnValidator, IdGenerator,
    ImageSource, JsonSchema, LanguageModel, Message, ModelMetadata, ModelRequest, ModelResponse,
    ModelStream, Part, RandomIdGenerator, ResponseFormat, ResponseMetadata, RetryReason, Role,
    SchemaValidator, SequentialIdGenerator, StreamPart, ToolCall, ToolChoice, ToolDefinition,
    ToolResult, Usage, response_into_parts, validator_fn,
};

pub use deferred::Deferred;
pub use generate::{
    GenerateTextConfig, GenerateTextResult, StepResult, StepType, TextStream, TextStreamPart,
    generate_text, stream_text,
};
pub use merge::{MergeConfig, OutputPart, merge};
pub use object::{
    GenerateObjectConfig, ObjectMode, ObjectResult, ObjectStream, ObjectStreamPart,
    OutputStrategy, generate_object, stream_object,
};
pub use retry::RetryPolicy;
pub use tool::{ToolHandler, ToolRegistry};
