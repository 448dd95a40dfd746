//! The step-loop controller.
//!
//! A top-level call is a bounded sequence of model calls ("steps"). After
//! each step the loop picks the next one:
//!
//! | Condition | Next step |
//! |-----------|-----------|
//! | `continue_steps`, finish reason `Length`, no tool calls | [`StepType::Continue`] |
//! | at least one tool call and every call has a result | [`StepType::ToolResult`] |
//! | otherwise, or `max_steps` reached | done |
//!
//! A tool-result step appends an assistant message with the text and tool
//! calls, then a tool message with the results. A continuation appends
//! its text to the previous assistant message instead, so a response cut
//! off by the token limit ends up as one message.
//!
//! [`generate_text`] runs the loop with blocking model calls and returns
//! the result; [`stream_text`] runs it over streaming calls and forwards
//! events as they happen.

mod config;
mod prompt;
mod step;
mod stream;
mod text;

pub use config::{GenerateTextConfig, StepFinishFn};
pub use prompt::validate_prompt;
pub use step::{GenerateTextResult, StepResult, StepType, remove_text_after_last_whitespace};
pub use stream::{TextStream, TextStreamPart, stream_text};
pub use text::generate_text;

pub(crate) use prompt::prepare_request;
