//! Running one tool call to a [`ToolResult`].

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::{ToolContext, ToolHandler};
use crate::{ToolCall, ToolResult};

/// Executes `call` with `handler`.
///
/// Always yields a result: an executor failure becomes a result with
/// `is_error` set and the error message as its value.
pub(crate) async fn execute_call(
    handler: Arc<dyn ToolHandler>,
    call: &ToolCall,
    cancel: CancellationToken,
) -> ToolResult {
    let ctx = ToolContext {
        call_id: call.id.clone(),
        cancel,
    };

    tracing::debug!(call_id = %call.id, tool = %call.name, "tool execution started");
    let start = Instant::now();
    let outcome = handler.execute(call.arguments.clone(), &ctx).await;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(value) => {
            tracing::debug!(call_id = %call.id, tool = %call.name, elapsed_ms, "tool execution succeeded");
            ToolResult::success(call, value)
        }
        Err(e) => {
            tracing::debug!(call_id = %call.id, tool = %call.name, elapsed_ms, error = %e, "tool execution failed");
            ToolResult::error(call, e.message)
        }
    }
}
