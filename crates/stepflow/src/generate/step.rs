//! Step bookkeeping shared by the blocking and streaming loops.

use std::sync::Arc;

use super::GenerateTextConfig;
use crate::merge::OutputPart;
use crate::{
    CallWarning, Error, FinishReason, Message, Part, ResponseMetadata, Role, ToolCall, ToolResult,
    Usage,
};

/// What kind of step a model call is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepType {
    /// The first call.
    Initial,
    /// Resumes a response cut off by the token limit.
    Continue,
    /// Feeds tool results back to the model.
    ToolResult,
}

/// The record of one model call.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Kind of this step.
    pub step_type: StepType,
    /// Text this step contributed.
    pub text: String,
    /// Tool calls the model made.
    pub tool_calls: Vec<ToolCall>,
    /// Results of the calls that had an executor.
    pub tool_results: Vec<ToolResult>,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
    /// Tokens used by this call alone.
    pub usage: Usage,
    /// Provider warnings.
    pub warnings: Vec<CallWarning>,
    /// Response identity.
    pub response: ResponseMetadata,
    /// Whether the next step continues this step's text.
    pub is_continued: bool,
    /// Local failures during the step, e.g. calls to undeclared tools.
    pub errors: Vec<Arc<Error>>,
}

/// Collects the merged output of one model call.
#[derive(Debug, Default)]
pub(crate) struct StepCollector {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub warnings: Vec<CallWarning>,
    pub response: ResponseMetadata,
    pub errors: Vec<Arc<Error>>,
}

impl StepCollector {
    pub fn absorb(&mut self, part: &OutputPart) {
        match part {
            OutputPart::TextDelta(text) => self.text.push_str(text),
            OutputPart::ToolCall(call) => self.tool_calls.push(call.clone()),
            OutputPart::ToolResult(result) => self.tool_results.push(result.clone()),
            OutputPart::ResponseMetadata(meta) => self.response.merge(meta.clone()),
            OutputPart::Finish { reason, usage } => {
                self.finish_reason = *reason;
                self.usage = *usage;
            }
            OutputPart::Error(e) => self.errors.push(Arc::clone(e)),
            OutputPart::ToolCallStreamingStart { .. } | OutputPart::ToolCallDelta { .. } => {}
        }
    }
}

/// Drops everything after the last whitespace, keeping the whitespace.
///
/// Text without whitespace is returned unchanged.
pub fn remove_text_after_last_whitespace(text: &str) -> &str {
    match text.rfind(char::is_whitespace) {
        Some(index) => {
            let ws_len = text[index..].chars().next().map_or(1, char::len_utf8);
            &text[..index + ws_len]
        }
        None => text,
    }
}

/// Splits at the last whitespace run: `(prefix + whitespace, suffix)`.
pub(crate) fn split_on_last_whitespace(text: &str) -> Option<(&str, &str)> {
    let index = text.rfind(char::is_whitespace)?;
    let ws_len = text[index..].chars().next().map_or(1, char::len_utf8);
    Some(text.split_at(index + ws_len))
}

/// State of one top-level call, owned by the loop and changed only
/// between steps.
#[derive(Debug)]
pub(crate) struct StepLoop {
    pub messages: Vec<Message>,
    pub initial_len: usize,
    pub steps: Vec<StepResult>,
    pub usage: Usage,
    /// Text of the current logical assistant message.
    pub text: String,
    pub step_type: StepType,
    step_count: u32,
}

impl StepLoop {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            initial_len: messages.len(),
            messages,
            steps: Vec::new(),
            usage: Usage::default(),
            text: String::new(),
            step_type: StepType::Initial,
            step_count: 0,
        }
    }

    pub fn step_number(&self) -> u32 {
        self.step_count + 1
    }

    /// Counts the finished step and decides what comes next. `None` means
    /// the loop is done.
    pub fn next_step_type(
        &mut self,
        collected: &StepCollector,
        config: &GenerateTextConfig,
    ) -> Option<StepType> {
        self.step_count += 1;
        if self.step_count >= config.max_steps {
            return None;
        }
        let calls = collected.tool_calls.len();
        if config.continue_steps && collected.finish_reason == FinishReason::Length && calls == 0 {
            Some(StepType::Continue)
        } else if calls > 0 && collected.tool_results.len() == calls {
            Some(StepType::ToolResult)
        } else {
            None
        }
    }

    /// Whether a continuation step should drop its leading whitespace.
    pub fn trims_leading_whitespace(&self) -> bool {
        self.step_type == StepType::Continue && self.text.ends_with(char::is_whitespace)
    }

    /// The text a step contributes, given its raw model output.
    pub fn shape_text<'a>(&self, raw: &'a str, next: Option<StepType>) -> &'a str {
        let text = if self.trims_leading_whitespace() {
            raw.trim_start()
        } else {
            raw
        };
        if next == Some(StepType::Continue) {
            remove_text_after_last_whitespace(text)
        } else {
            text
        }
    }

    /// Records a finished step: text, history, usage, step list.
    pub fn commit(
        &mut self,
        collected: StepCollector,
        step_text: String,
        next: Option<StepType>,
        config: &GenerateTextConfig,
    ) -> &StepResult {
        let continuing = self.step_type == StepType::Continue;
        if continuing {
            self.text.push_str(&step_text);
        } else {
            self.text.clone_from(&step_text);
        }

        match self.messages.last_mut() {
            Some(last) if continuing && last.role == Role::Assistant => {
                append_text(last, &step_text);
                last.content
                    .extend(collected.tool_calls.iter().cloned().map(Part::ToolCall));
                if !collected.tool_results.is_empty() {
                    self.messages
                        .push(Message::tool_results(collected.tool_results.clone()));
                }
            }
            _ => {
                self.messages.push(Message::assistant_with_calls(
                    self.text.clone(),
                    collected.tool_calls.clone(),
                ));
                if !collected.tool_results.is_empty() {
                    self.messages
                        .push(Message::tool_results(collected.tool_results.clone()));
                }
            }
        }

        self.usage += collected.usage;
        self.steps.push(StepResult {
            step_type: self.step_type,
            text: step_text,
            tool_calls: collected.tool_calls,
            tool_results: collected.tool_results,
            finish_reason: collected.finish_reason,
            usage: collected.usage,
            warnings: collected.warnings,
            response: collected.response,
            is_continued: next == Some(StepType::Continue),
            errors: collected.errors,
        });
        if let Some(next) = next {
            self.step_type = next;
        }

        let step = &self.steps[self.steps.len() - 1];
        if let Some(callback) = &config.on_step_finish {
            callback(step);
        }
        step
    }

    /// Builds the final result from the last step.
    pub fn into_result(self) -> GenerateTextResult {
        let last = self.steps.last().cloned();
        let (tool_calls, tool_results, finish_reason, warnings, response) = match last {
            Some(step) => (
                step.tool_calls,
                step.tool_results,
                step.finish_reason,
                step.warnings,
                step.response,
            ),
            None => Default::default(),
        };
        GenerateTextResult {
            text: self.text,
            tool_calls,
            tool_results,
            finish_reason,
            usage: self.usage,
            warnings,
            response,
            messages: self.messages,
            initial_len: self.initial_len,
            steps: self.steps,
        }
    }
}

fn append_text(message: &mut Message, text: &str) {
    if text.is_empty() {
        return;
    }
    match message.content.last_mut() {
        Some(Part::Text(existing)) => existing.push_str(text),
        _ => message.content.push(Part::Text(text.to_owned())),
    }
}

/// The outcome of a multi-step call.
#[derive(Debug, Clone)]
pub struct GenerateTextResult {
    /// Text of the final assistant message, continuations included.
    pub text: String,
    /// Tool calls of the last step.
    pub tool_calls: Vec<ToolCall>,
    /// Tool results of the last step.
    pub tool_results: Vec<ToolResult>,
    /// Finish reason of the last step.
    pub finish_reason: FinishReason,
    /// Usage summed over every step.
    pub usage: Usage,
    /// Warnings of the last step.
    pub warnings: Vec<CallWarning>,
    /// Response identity of the last step.
    pub response: ResponseMetadata,
    /// The full transcript: the prompt followed by generated messages.
    pub messages: Vec<Message>,
    initial_len: usize,
    /// Every step, in order.
    pub steps: Vec<StepResult>,
}

impl GenerateTextResult {
    /// The messages generated during the call, without the prompt.
    pub fn response_messages(&self) -> &[Message] {
        &self.messages[self.initial_len.min(self.messages.len())..]
    }
}
