//! Tool handler trait and closure-backed implementations.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::ToolError;
use crate::ToolDefinition;

/// Per-execution context handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Id of the tool call being answered.
    pub call_id: String,
    /// Cancelled when the surrounding call is cancelled. Tools decide
    /// whether to stop early; nothing is force-killed.
    pub cancel: CancellationToken,
}

/// A tool the model can invoke, with an executor attached.
///
/// Implement this trait for tools that need state. For simple tools, wrap
/// a closure with [`super::tool_fn`] or [`super::tool_fn_with_ctx`].
///
/// Tools without an executor are declared through
/// [`ToolRegistry::declare`](super::ToolRegistry::declare) instead; their
/// calls are surfaced to the caller and never produce a result.
///
/// The trait is object-safe (boxed futures) so handlers can be stored as
/// `Arc<dyn ToolHandler>`.
///
/// # Example
///
/// ```rust
/// use stepflow::tool::{ToolContext, ToolError, ToolHandler};
/// use stepflow::{JsonSchema, ToolDefinition};
/// use serde_json::{json, Value};
/// use std::future::Future;
/// use std::pin::Pin;
///
/// struct Clock;
///
/// impl ToolHandler for Clock {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition {
///             name: "now".into(),
///             description: "Current time".into(),
///             parameters: JsonSchema::new(json!({"type": "object"})),
///         }
///     }
///
///     fn execute<'a>(
///         &'a self,
///         _input: Value,
///         ctx: &'a ToolContext,
///     ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
///         Box::pin(async move { Ok(json!({"call": ctx.call_id, "time": "12:00"})) })
///     }
/// }
/// ```
pub trait ToolHandler: Send + Sync {
    /// The tool's name, description and parameter schema.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool with already-validated JSON arguments.
    fn execute<'a>(
        &'a self,
        input: Value,
        ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;
}

/// A tool handler backed by an async closure that receives the context.
///
/// Created via [`super::tool_fn_with_ctx`].
pub struct FnToolHandler<F> {
    pub(crate) definition: ToolDefinition,
    pub(crate) handler: F,
}

impl<F> std::fmt::Debug for FnToolHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnToolHandler")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

impl<F, Fut, O> ToolHandler for FnToolHandler<F>
where
    F: for<'c> Fn(Value, &'c ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    O: Into<Value> + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn execute<'a>(
        &'a self,
        input: Value,
        ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        let fut = (self.handler)(input, ctx);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}

/// A tool handler without context, created by [`super::tool_fn`].
pub struct NoCtxToolHandler<F> {
    pub(crate) definition: ToolDefinition,
    pub(crate) handler: F,
}

impl<F> std::fmt::Debug for NoCtxToolHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoCtxToolHandler")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

impl<F, Fut, O> ToolHandler for NoCtxToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    O: Into<Value> + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn execute<'a>(
        &'a self,
        input: Value,
        _ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        let fut = (self.handler)(input);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}
