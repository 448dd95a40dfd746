//! Tool error types.

/// Error returned by a tool executor.
///
/// The message becomes the [`ToolResult::result`](crate::ToolResult::result)
/// of a failed call, so the model sees it on the next step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    /// Human-readable error description.
    pub message: String,
}

impl ToolError {
    /// Creates a new tool error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("invalid tool arguments: {e}"))
    }
}
