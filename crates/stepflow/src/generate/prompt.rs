//! Prompt checks and request preparation.

use std::collections::HashSet;

use crate::tool::ToolRegistry;
use crate::{Error, Message, ModelRequest, Part, Role};

/// Checks a message history before the first model call.
///
/// - the history is not empty;
/// - system messages hold only text;
/// - every tool result answers a tool call made earlier.
pub fn validate_prompt(messages: &[Message]) -> Result<(), Error> {
    if messages.is_empty() {
        return Err(Error::InvalidPrompt("messages must not be empty".into()));
    }

    let mut seen_calls: HashSet<&str> = HashSet::new();
    for (index, message) in messages.iter().enumerate() {
        for part in &message.content {
            match part {
                Part::Text(_) => {}
                _ if message.role == Role::System => {
                    return Err(Error::InvalidPrompt(format!(
                        "system message {index} may only contain text"
                    )));
                }
                Part::ToolCall(call) => {
                    seen_calls.insert(call.id.as_str());
                }
                Part::ToolResult(result) => {
                    if !seen_calls.contains(result.tool_call_id.as_str()) {
                        return Err(Error::InvalidPrompt(format!(
                            "tool result in message {index} references unknown tool call '{}'",
                            result.tool_call_id
                        )));
                    }
                }
                Part::Image { .. } => {}
            }
        }
    }
    Ok(())
}

/// Validates the prompt and declares the registry's tools, unless the
/// request already lists tools.
pub(crate) fn prepare_request(
    mut request: ModelRequest,
    tools: &ToolRegistry,
) -> Result<ModelRequest, Error> {
    validate_prompt(&request.messages)?;
    if request.tools.is_none() && !tools.is_empty() {
        request.tools = Some(tools.definitions());
    }
    Ok(request)
}
