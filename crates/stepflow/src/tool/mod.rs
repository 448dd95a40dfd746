//! Tools the model may call.
//!
//! ```text
//!   ToolHandler  one tool: declaration + executor
//!       │
//!   ToolRegistry  declared tools by name, validates calls
//!       │
//!   merge()      runs executors concurrently while the model streams
//! ```
//!
//! Tools come in two kinds. Tools with an executor are run by
//! [`merge`](crate::merge::merge) as soon as their call arrives, and their
//! results are fed back to the model on the next step. Declared-only tools
//! are sent to the model but never executed; their calls end up in the
//! result for the caller to resolve.
//!
//! # Example
//!
//! ```rust
//! use stepflow::tool::{ToolRegistry, tool_fn};
//! use stepflow::{JsonSchema, ToolDefinition};
//! use serde_json::{json, Value};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(tool_fn(
//!     ToolDefinition {
//!         name: "add".into(),
//!         description: "Add two numbers".into(),
//!         parameters: JsonSchema::new(json!({
//!             "type": "object",
//!             "properties": {
//!                 "a": {"type": "number"},
//!                 "b": {"type": "number"}
//!             },
//!             "required": ["a", "b"]
//!         })),
//!     },
//!     |input: Value| async move {
//!         let a = input["a"].as_f64().unwrap_or(0.0);
//!         let b = input["b"].as_f64().unwrap_or(0.0);
//!         Ok(a + b)
//!     },
//! ));
//! registry.declare(ToolDefinition {
//!     name: "ask_user".into(),
//!     description: "Ask the user a question".into(),
//!     parameters: JsonSchema::new(json!({"type": "object"})),
//! });
//!
//! assert_eq!(registry.len(), 2);
//! assert!(registry.get("ask_user").is_none());
//! ```

mod error;
pub(crate) mod execution;
mod handler;
mod helpers;
mod registry;

pub use error::ToolError;
pub use handler::{FnToolHandler, NoCtxToolHandler, ToolContext, ToolHandler};
pub use helpers::{tool_fn, tool_fn_with_ctx};
pub use registry::ToolRegistry;
