//! Helper functions for creating tool handlers.

use std::future::Future;

use serde_json::Value;

use super::{FnToolHandler, NoCtxToolHandler, ToolContext, ToolError};
use crate::ToolDefinition;

/// Creates a [`ToolHandler`](super::ToolHandler) from a closure.
///
/// The closure receives the tool's JSON arguments and returns
/// `Result<impl Into<Value>, ToolError>`; strings, numbers and
/// [`Value`]s all work.
///
/// # Example
///
/// ```rust
/// use stepflow::tool::tool_fn;
/// use stepflow::{JsonSchema, ToolDefinition};
/// use serde_json::{json, Value};
///
/// let handler = tool_fn(
///     ToolDefinition {
///         name: "add".into(),
///         description: "Add two numbers".into(),
///         parameters: JsonSchema::new(json!({
///             "type": "object",
///             "properties": {
///                 "a": { "type": "number" },
///                 "b": { "type": "number" }
///             },
///             "required": ["a", "b"]
///         })),
///     },
///     |input: Value| async move {
///         let a = input["a"].as_f64().unwrap_or(0.0);
///         let b = input["b"].as_f64().unwrap_or(0.0);
///         Ok(a + b)
///     },
/// );
/// ```
pub fn tool_fn<F, Fut, O>(definition: ToolDefinition, handler: F) -> NoCtxToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    O: Into<Value> + Send + 'static,
{
    NoCtxToolHandler {
        definition,
        handler,
    }
}

/// Creates a [`ToolHandler`](super::ToolHandler) from a closure that also
/// receives the [`ToolContext`] (call id and cancellation token).
///
/// The returned future must be `'static`: clone what you need out of the
/// context before the `async` block.
///
/// ```rust
/// use stepflow::tool::{tool_fn_with_ctx, ToolContext, ToolError};
/// use stepflow::{JsonSchema, ToolDefinition};
/// use serde_json::{json, Value};
///
/// let handler = tool_fn_with_ctx(
///     ToolDefinition {
///         name: "slow".into(),
///         description: "Waits unless cancelled".into(),
///         parameters: JsonSchema::new(json!({"type": "object"})),
///     },
///     |_input: Value, ctx: &ToolContext| {
///         let cancel = ctx.cancel.clone();
///         async move {
///             tokio::select! {
///                 () = cancel.cancelled() => Err(ToolError::new("cancelled")),
///                 () = tokio::time::sleep(std::time::Duration::from_secs(1)) => Ok("done"),
///             }
///         }
///     },
/// );
/// ```
pub fn tool_fn_with_ctx<F, Fut, O>(definition: ToolDefinition, handler: F) -> FnToolHandler<F>
where
    F: for<'c> Fn(Value, &'c ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    O: Into<Value> + Send + 'static,
{
    FnToolHandler {
        definition,
        handler,
    }
}
