//! The streaming step loop.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::prompt::prepare_request;
use super::step::{StepCollector, StepLoop, StepType, split_on_last_whitespace};
use super::{GenerateTextConfig, GenerateTextResult};
use crate::deferred::{Deferred, deferred};
use crate::merge::{OutputPart, merge};
use crate::tool::ToolRegistry;
use crate::{
    DynLanguageModel, Error, FinishReason, ModelRequest, ResponseMetadata, ToolCall, ToolResult,
    Usage,
};

/// One event of a [`TextStream`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum TextStreamPart {
    /// Generated text.
    TextDelta(String),
    /// A streamed tool call begins.
    ToolCallStreamingStart {
        /// The tool call id.
        id: String,
        /// The tool being called.
        name: String,
    },
    /// A fragment of a streamed tool call's arguments.
    ToolCallDelta {
        /// The tool call id.
        id: String,
        /// The tool being called.
        name: String,
        /// Raw argument text to append.
        args_delta: String,
    },
    /// A complete tool call.
    ToolCall(ToolCall),
    /// A tool finished.
    ToolResult(ToolResult),
    /// A step finished.
    StepFinish {
        /// Kind of the finished step.
        step_type: StepType,
        /// Why the model stopped.
        finish_reason: FinishReason,
        /// Tokens used by the step.
        usage: Usage,
        /// Response identity.
        response: ResponseMetadata,
        /// Whether the next step continues this step's text.
        is_continued: bool,
    },
    /// The whole call finished.
    Finish {
        /// Finish reason of the last step.
        finish_reason: FinishReason,
        /// Usage summed over all steps.
        usage: Usage,
    },
    /// A failure. Local failures (tools, mid-stream transport errors) are
    /// followed by more parts; a fatal one is the last part.
    Error(Arc<Error>),
}

/// Handle returned by [`stream_text`].
///
/// Iterate it as a [`Stream`] of [`TextStreamPart`]s, then await
/// [`result`](Self::result) or [`usage`](Self::usage). The background task
/// runs to completion whether or not the parts are read, so awaiting only
/// the final handles works too.
#[derive(Debug)]
pub struct TextStream {
    parts: mpsc::UnboundedReceiver<TextStreamPart>,
    /// The final result. Rejected when the call fails.
    pub result: Deferred<GenerateTextResult>,
    /// Usage summed over all steps. Rejected when the call fails.
    pub usage: Deferred<Usage>,
}

impl Stream for TextStream {
    type Item = TextStreamPart;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.parts.poll_recv(cx)
    }
}

impl TextStream {
    /// Only the text deltas.
    pub fn text_stream(&mut self) -> impl Stream<Item = String> + '_ {
        self.filter_map(|part| {
            futures::future::ready(match part {
                TextStreamPart::TextDelta(text) => Some(text),
                _ => None,
            })
        })
    }

    /// Writes every text delta to `sink` and flushes it at the end.
    pub async fn pipe_text_to<W>(&mut self, sink: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let mut text = self.text_stream();
        while let Some(delta) = text.next().await {
            sink.write_all(delta.as_bytes()).await?;
        }
        sink.flush().await?;
        Ok(())
    }
}

/// Runs the step loop with streaming model calls.
///
/// Same state machine as [`generate_text`](super::generate_text), but text
/// and tool events are forwarded as they happen. With
/// [`continue_steps`](GenerateTextConfig::continue_steps), text after the
/// last whitespace is held back until more whitespace arrives or the step
/// ends, and dropped when the step is continued; the continuation
/// regenerates it.
///
/// Fatal errors (invalid arguments, a stream that cannot be opened,
/// cancellation) end the stream with an [`Error`](TextStreamPart::Error)
/// part and reject both handles.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use futures::StreamExt;
/// use stepflow::{GenerateTextConfig, Message, ModelRequest, ToolRegistry, stream_text};
///
/// # async fn example(model: Arc<dyn stepflow::DynLanguageModel>) -> Result<(), stepflow::Error> {
/// let request = ModelRequest {
///     messages: vec![Message::user("Tell me a story")],
///     ..Default::default()
/// };
/// let mut stream = stream_text(model, Arc::new(ToolRegistry::new()), request, GenerateTextConfig::default());
/// let mut stdout = tokio::io::stdout();
/// stream.pipe_text_to(&mut stdout).await?;
/// let usage = stream.usage.await?;
/// println!("\n{} tokens", usage.total_tokens);
/// # Ok(())
/// # }
/// ```
pub fn stream_text(
    model: Arc<dyn DynLanguageModel>,
    tools: Arc<ToolRegistry>,
    request: ModelRequest,
    config: GenerateTextConfig,
) -> TextStream {
    let (tx, parts) = mpsc::unbounded_channel();
    let (result_tx, result) = deferred();
    let (usage_tx, usage) = deferred();

    tokio::spawn(async move {
        match drive(model.as_ref(), tools, request, &config, &tx).await {
            Ok(outcome) => {
                let _ = tx.send(TextStreamPart::Finish {
                    finish_reason: outcome.finish_reason,
                    usage: outcome.usage,
                });
                usage_tx.resolve(outcome.usage);
                result_tx.resolve(outcome);
            }
            Err(e) => {
                tracing::debug!(error = %e, "text stream failed");
                let _ = tx.send(TextStreamPart::Error(Arc::new(e.replicate())));
                usage_tx.reject(e.replicate());
                result_tx.reject(e);
            }
        }
    });

    TextStream {
        parts,
        result,
        usage,
    }
}

async fn drive(
    model: &dyn DynLanguageModel,
    tools: Arc<ToolRegistry>,
    request: ModelRequest,
    config: &GenerateTextConfig,
    tx: &mpsc::UnboundedSender<TextStreamPart>,
) -> Result<GenerateTextResult, Error> {
    config.validate()?;
    let mut request = prepare_request(request, &tools)?;
    request.cancel = Some(config.cancel.clone());

    let send = |part: TextStreamPart| {
        let _ = tx.send(part);
    };

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
        let upstream = config
            .retry
            .execute(&config.cancel, || model.stream_boxed(&step_request))
            .await?;
        let mut merged = merge(
            upstream,
            Arc::clone(&tools),
            config.merge_config(config.tool_call_streaming),
            config.cancel.clone(),
        );

        let mut collected = StepCollector::default();
        let mut step_text = String::new();
        let mut held = String::new();
        let mut trim_leading = state.trims_leading_whitespace();

        while let Some(part) = merged.next().await {
            collected.absorb(&part);
            match part {
                OutputPart::TextDelta(delta) if config.continue_steps => {
                    let delta = if trim_leading {
                        delta.trim_start()
                    } else {
                        delta.as_str()
                    };
                    if delta.is_empty() {
                        continue;
                    }
                    trim_leading = false;
                    held.push_str(delta);
                    if let Some((ready, rest)) = split_on_last_whitespace(&held) {
                        let ready = ready.to_owned();
                        held = rest.to_owned();
                        step_text.push_str(&ready);
                        send(TextStreamPart::TextDelta(ready));
                    }
                }
                OutputPart::TextDelta(delta) => {
                    step_text.push_str(&delta);
                    send(TextStreamPart::TextDelta(delta));
                }
                OutputPart::ToolCallStreamingStart { id, name } => {
                    send(TextStreamPart::ToolCallStreamingStart { id, name });
                }
                OutputPart::ToolCallDelta {
                    id,
                    name,
                    args_delta,
                } => send(TextStreamPart::ToolCallDelta {
                    id,
                    name,
                    args_delta,
                }),
                OutputPart::ToolCall(call) => send(TextStreamPart::ToolCall(call)),
                OutputPart::ToolResult(result) => send(TextStreamPart::ToolResult(result)),
                OutputPart::Error(e) => send(TextStreamPart::Error(e)),
                OutputPart::ResponseMetadata(_) | OutputPart::Finish { .. } => {}
            }
        }
        if config.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let next = state.next_step_type(&collected, config);
        if next != Some(StepType::Continue) && !held.is_empty() {
            step_text.push_str(&held);
            send(TextStreamPart::TextDelta(std::mem::take(&mut held)));
        }

        let step = state.commit(collected, step_text, next, config);
        tracing::debug!(
            finish_reason = ?step.finish_reason,
            tool_calls = step.tool_calls.len(),
            next = ?next,
            "step finished"
        );
        send(TextStreamPart::StepFinish {
            step_type: step.step_type,
            finish_reason: step.finish_reason,
            usage: step.usage,
            response: step.response.clone(),
            is_continued: step.is_continued,
        });

        if next.is_none() {
            return Ok(state.into_result());
        }
    }
}
