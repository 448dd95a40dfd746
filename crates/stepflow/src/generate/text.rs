//! The blocking step loop.

use std::sync::Arc;

use futures::StreamExt;

use super::prompt::prepare_request;
use super::step::{StepCollector, StepLoop};
use super::{GenerateTextConfig, GenerateTextResult};
use crate::merge::merge;
use crate::tool::ToolRegistry;
use crate::{DynLanguageModel, Error, ModelRequest, ModelStream, response_into_parts};

/// Runs the step loop to completion with non-streaming model calls.
///
/// Each step sends the transcript so far, runs the tools the model calls
/// (concurrently, through [`merge`]) and decides whether to go again:
/// tool results are fed back when every call got one, and with
/// [`continue_steps`](GenerateTextConfig::continue_steps) a response cut
/// off by the token limit is continued in the same assistant message. The
/// loop never makes more than [`max_steps`](GenerateTextConfig::max_steps)
/// model calls.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] for `max_steps < 1` and
///   [`Error::InvalidPrompt`] for a malformed history, before any call.
/// - The model's error (wrapped by the retry policy) when a call fails.
/// - [`Error::Cancelled`] when the config's token fires.
///
/// Tool failures and calls to undeclared tools are not errors here; see
/// [`StepResult::tool_results`](super::StepResult::tool_results) and
/// [`StepResult::errors`](super::StepResult::errors).
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use stepflow::{GenerateTextConfig, Message, ModelRequest, ToolRegistry, generate_text};
///
/// # async fn example(model: &dyn stepflow::DynLanguageModel) -> Result<(), stepflow::Error> {
/// let request = ModelRequest {
///     messages: vec![Message::user("What is 2 + 3?")],
///     ..Default::default()
/// };
/// let config = GenerateTextConfig { max_steps: 3, ..Default::default() };
/// let result = generate_text(model, Arc::new(ToolRegistry::new()), request, config).await?;
/// println!("{} ({} steps)", result.text, result.steps.len());
/// # Ok(())
/// # }
/// ```
pub async fn generate_text(
    model: &dyn DynLanguageModel,
    tools: Arc<ToolRegistry>,
    request: ModelRequest,
    config: GenerateTextConfig,
) -> Result<GenerateTextResult, Error> {
    config.validate()?;
    let mut request = prepare_request(request, &tools)?;
    request.cancel = Some(config.cancel.clone());

    let mut state = StepLoop::new(std::mem::take(&mut request.messages));
    loop {
        if config.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(
            step = state.step_number(),
            step_type = ?state.step_type,
            messages = state.messages.len(),
            "step started"
        );

        let step_request = ModelRequest {
            messages: state.messages.clone(),
            ..request.clone()
        };
        let response = config
            .retry
            .execute(&config.cancel, || model.generate_boxed(&step_request))
            .await?;

        let mut collected = StepCollector {
            warnings: response.warnings.clone(),
            ..StepCollector::default()
        };
        let upstream: ModelStream = Box::pin(futures::stream::iter(
            response_into_parts(response).into_iter().map(Ok),
        ));
        let mut merged = merge(
            upstream,
            Arc::clone(&tools),
            config.merge_config(false),
            config.cancel.clone(),
        );
        while let Some(part) = merged.next().await {
            collected.absorb(&part);
        }
        if config.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let next = state.next_step_type(&collected, &config);
        let step_text = state.shape_text(&collected.text, next).to_owned();
        let step = state.commit(collected, step_text, next, &config);
        tracing::debug!(
            finish_reason = ?step.finish_reason,
            tool_calls = step.tool_calls.len(),
            next = ?next,
            "step finished"
        );

        if next.is_none() {
            return Ok(state.into_result());
        }
    }
}
