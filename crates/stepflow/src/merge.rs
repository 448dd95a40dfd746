//! The tool execution coordinator.
//!
//! [`merge`] turns one model stream into one output stream while running
//! tool executors concurrently:
//!
//! ```text
//!   model stream ──► coordinator ──────────────────────► output
//!                       │   ▲
//!              spawn    │   │  (execution id, result)
//!                       ▼   │
//!                    worker tasks (one per tool call)
//! ```
//!
//! A single coordinator task reads the model stream in order and forwards
//! every part as soon as it arrives. A complete tool call with an executor
//! is forwarded, then handed to a new worker task. Workers send results
//! back over a channel and the coordinator interleaves them into the
//! output as they finish.
//!
//! # Ordering
//!
//! - Forwarded parts keep the model's order exactly.
//! - A [`ToolResult`](OutputPart::ToolResult) always follows its
//!   [`ToolCall`](OutputPart::ToolCall).
//! - The model's [`Finish`](OutputPart::Finish) is forwarded immediately.
//!   The output only ends once the model stream is exhausted and every
//!   started execution has reported, so a consumer that needs all tool
//!   results waits for the end of the stream, not for `Finish`.
//!
//! # Failures
//!
//! Nothing here fails the stream. Transport errors, in-band provider
//! errors, calls to undeclared tools and arguments that violate a tool's
//! schema become [`Error`](OutputPart::Error) parts. A failing or
//! panicking executor does not produce an `Error` part: its call gets a
//! [`ToolResult`](OutputPart::ToolResult) with `is_error` set and the
//! failure message as the result, so consumers check `is_error` to spot
//! tool failures.

use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tool::ToolRegistry;
use crate::tool::execution::execute_call;
use crate::{
    Error, FinishReason, IdGenerator, ModelStream, RandomIdGenerator, ResponseMetadata, StreamPart,
    ToolCall, ToolResult, Usage,
};

/// One part of a merged stream.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum OutputPart {
    /// A fragment of generated text.
    TextDelta(String),
    /// The first argument fragment of a streamed tool call is next.
    ToolCallStreamingStart {
        /// The tool call id.
        id: String,
        /// The tool being called.
        name: String,
    },
    /// A fragment of a tool call's arguments.
    ToolCallDelta {
        /// The tool call id.
        id: String,
        /// The tool being called.
        name: String,
        /// Raw argument text to append.
        args_delta: String,
    },
    /// A complete, validated tool call.
    ToolCall(ToolCall),
    /// The outcome of an executed tool call.
    ToolResult(ToolResult),
    /// Response identity from the model.
    ResponseMetadata(ResponseMetadata),
    /// The model stopped producing output.
    Finish {
        /// Why the model stopped.
        reason: FinishReason,
        /// Token counts for this model call.
        usage: Usage,
    },
    /// A local failure; the stream continues.
    Error(Arc<Error>),
}

/// A merged output stream.
pub type MergedStream = Pin<Box<dyn Stream<Item = OutputPart> + Send>>;

/// Settings for [`merge`].
#[derive(Clone)]
pub struct MergeConfig {
    /// Forward tool-call argument fragments. Default: `false`.
    pub tool_call_streaming: bool,
    /// Output channel capacity. Default: 64.
    pub buffer_size: usize,
    /// Source of execution ids.
    pub id_generator: Arc<dyn IdGenerator>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            tool_call_streaming: false,
            buffer_size: 64,
            id_generator: Arc::new(RandomIdGenerator::new("exec", 16)),
        }
    }
}

impl fmt::Debug for MergeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeConfig")
            .field("tool_call_streaming", &self.tool_call_streaming)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

/// Merges a model stream with the results of the tools it calls.
///
/// Spawns the coordinator on the current tokio runtime and returns the
/// output stream right away.
///
/// Cancelling `cancel` stops reading the model stream and starting
/// executors. The output then ends without waiting for executions in
/// flight; their [`ToolContext::cancel`](crate::tool::ToolContext::cancel)
/// fires and they finish or not on their own terms. Dropping the output
/// stream has the same effect.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn merge(
    upstream: ModelStream,
    tools: Arc<ToolRegistry>,
    config: MergeConfig,
    cancel: CancellationToken,
) -> MergedStream {
    let (out_tx, out_rx) = mpsc::channel(config.buffer_size.max(1));
    let coordinator = Coordinator {
        tools,
        config,
        workers: cancel.child_token(),
        cancel,
        out: out_tx,
        outstanding: HashSet::new(),
        streaming: HashSet::new(),
    };
    tokio::spawn(coordinator.run(upstream));

    Box::pin(futures::stream::unfold(out_rx, |mut rx| async move {
        rx.recv().await.map(|part| (part, rx))
    }))
}

type Completion = (String, ToolResult);

struct Coordinator {
    tools: Arc<ToolRegistry>,
    config: MergeConfig,
    cancel: CancellationToken,
    /// Parent of every executor's token.
    workers: CancellationToken,
    out: mpsc::Sender<OutputPart>,
    /// Execution ids started but not yet reported.
    outstanding: HashSet<String>,
    /// Tool call ids whose streaming start was emitted.
    streaming: HashSet<String>,
}

/// Whether the consumer still listens.
type Open = bool;

impl Coordinator {
    async fn run(mut self, mut upstream: ModelStream) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut upstream_done = false;

        loop {
            if upstream_done && self.outstanding.is_empty() {
                break;
            }
            let open = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!(outstanding = self.outstanding.len(), "merge cancelled");
                    break;
                }
                Some((execution_id, result)) = done_rx.recv(), if !self.outstanding.is_empty() => {
                    self.outstanding.remove(&execution_id);
                    self.emit(OutputPart::ToolResult(result)).await
                }
                item = upstream.next(), if !upstream_done => match item {
                    Some(item) => self.forward(item, &done_tx).await,
                    None => {
                        upstream_done = true;
                        true
                    }
                },
            };
            if !open {
                tracing::debug!("merged stream dropped by consumer");
                break;
            }
        }

        self.workers.cancel();
    }

    async fn emit(&self, part: OutputPart) -> Open {
        self.out.send(part).await.is_ok()
    }

    async fn forward(
        &mut self,
        item: Result<StreamPart, Error>,
        done_tx: &mpsc::UnboundedSender<Completion>,
    ) -> Open {
        let part = match item {
            Ok(part) => part,
            Err(e) => return self.emit(OutputPart::Error(Arc::new(e))).await,
        };

        match part {
            StreamPart::TextDelta(text) => self.emit(OutputPart::TextDelta(text)).await,
            StreamPart::ResponseMetadata(meta) => {
                self.emit(OutputPart::ResponseMetadata(meta)).await
            }
            StreamPart::Finish { reason, usage } => {
                self.emit(OutputPart::Finish { reason, usage }).await
            }
            StreamPart::Error { message } => {
                let error = Error::Provider {
                    code: "stream_error".into(),
                    message,
                    retryable: false,
                };
                self.emit(OutputPart::Error(Arc::new(error))).await
            }
            StreamPart::ToolCallDelta {
                id,
                name,
                args_delta,
            } => {
                if !self.config.tool_call_streaming {
                    return true;
                }
                if self.streaming.insert(id.clone()) {
                    let start = OutputPart::ToolCallStreamingStart {
                        id: id.clone(),
                        name: name.clone(),
                    };
                    if !self.emit(start).await {
                        return false;
                    }
                }
                self.emit(OutputPart::ToolCallDelta {
                    id,
                    name,
                    args_delta,
                })
                .await
            }
            StreamPart::ToolCall(call) => self.tool_call(call, done_tx).await,
        }
    }

    async fn tool_call(
        &mut self,
        call: ToolCall,
        done_tx: &mpsc::UnboundedSender<Completion>,
    ) -> Open {
        let handler = match self.tools.resolve(&call) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(call_id = %call.id, tool = %call.name, error = %e, "rejected tool call");
                return self.emit(OutputPart::Error(Arc::new(e))).await;
            }
        };

        if !self.emit(OutputPart::ToolCall(call.clone())).await {
            return false;
        }

        let Some(handler) = handler else {
            return true;
        };
        if self.cancel.is_cancelled() {
            return true;
        }

        let execution_id = self.config.id_generator.generate();
        self.outstanding.insert(execution_id.clone());
        let token = self.workers.child_token();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(execute_call(handler, &call, token))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| ToolResult::error(&call, "tool executor panicked"));
            let _ = done_tx.send((execution_id, result));
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::tool::{ToolError, tool_fn};
    use crate::{JsonSchema, SequentialIdGenerator, ToolDefinition};

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: JsonSchema::new(json!({"type": "object"})),
        }
    }

    /// Tools `sleep` (waits `ms` of its arguments, returns them), `fail`
    /// and declared-only `client`.
    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry
            .register(tool_fn(definition("sleep"), |args: Value| async move {
                let ms = args["ms"].as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(args)
            }))
            .register(tool_fn(definition("fail"), |_args: Value| async move {
                Err::<Value, _>(ToolError::new("boom"))
            }))
            .declare(definition("client"));
        Arc::new(registry)
    }

    fn config() -> MergeConfig {
        MergeConfig {
            id_generator: Arc::new(SequentialIdGenerator::new("exec")),
            ..MergeConfig::default()
        }
    }

    fn upstream(parts: Vec<StreamPart>) -> ModelStream {
        Box::pin(futures::stream::iter(parts.into_iter().map(Ok)))
    }

    fn call(id: &str, name: &str, args: Value) -> StreamPart {
        StreamPart::ToolCall(ToolCall::new(id, name, args))
    }

    fn finish() -> StreamPart {
        StreamPart::Finish {
            reason: FinishReason::ToolCalls,
            usage: Usage::new(1, 1),
        }
    }

    fn label(part: &OutputPart) -> String {
        match part {
            OutputPart::TextDelta(t) => format!("text:{t}"),
            OutputPart::ToolCall(c) => format!("call:{}", c.id),
            OutputPart::ToolResult(r) => format!("result:{}", r.tool_call_id),
            OutputPart::ToolCallStreamingStart { id, .. } => format!("start:{id}"),
            OutputPart::ToolCallDelta { args_delta, .. } => format!("delta:{args_delta}"),
            OutputPart::Finish { .. } => "finish".into(),
            OutputPart::ResponseMetadata(_) => "meta".into(),
            OutputPart::Error(_) => "error".into(),
        }
    }

    async fn run(parts: Vec<StreamPart>, config: MergeConfig) -> Vec<OutputPart> {
        merge(upstream(parts), tools(), config, CancellationToken::new())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_text_only_passes_through() {
        let out = run(
            vec![
                StreamPart::TextDelta("a".into()),
                StreamPart::TextDelta("b".into()),
                StreamPart::Finish {
                    reason: FinishReason::Stop,
                    usage: Usage::default(),
                },
            ],
            config(),
        )
        .await;
        let labels: Vec<String> = out.iter().map(label).collect();
        assert_eq!(labels, vec!["text:a", "text:b", "finish"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_calls_and_wait_for_slow_tools() {
        let out = run(
            vec![
                StreamPart::TextDelta("x".into()),
                call("c1", "sleep", json!({"ms": 50})),
                StreamPart::TextDelta("y".into()),
                finish(),
            ],
            config(),
        )
        .await;
        let labels: Vec<String> = out.iter().map(label).collect();
        assert_eq!(labels, vec!["text:x", "call:c1", "text:y", "finish", "result:c1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_arrive_in_completion_order() {
        let out = run(
            vec![
                call("slow", "sleep", json!({"ms": 300})),
                call("fast", "sleep", json!({"ms": 10})),
                finish(),
            ],
            config(),
        )
        .await;
        let results: Vec<String> = out
            .iter()
            .filter(|p| matches!(p, OutputPart::ToolResult(_)))
            .map(label)
            .collect();
        assert_eq!(results, vec!["result:fast", "result:slow"]);
    }

    #[tokio::test]
    async fn test_undeclared_tool_becomes_error_part() {
        let out = run(vec![call("c1", "nope", json!({})), finish()], config()).await;
        assert_eq!(out.len(), 2);
        match &out[0] {
            OutputPart::Error(e) => assert!(matches!(**e, Error::NoSuchTool { .. })),
            other => panic!("expected error part, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_declared_only_tool_has_no_result() {
        let out = run(vec![call("c1", "client", json!({})), finish()], config()).await;
        let labels: Vec<String> = out.iter().map(label).collect();
        assert_eq!(labels, vec!["call:c1", "finish"]);
    }

    #[tokio::test]
    async fn test_failing_tool_yields_error_result() {
        let out = run(vec![call("c1", "fail", json!({})), finish()], config()).await;
        let result = out
            .iter()
            .find_map(|p| match p {
                OutputPart::ToolResult(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.result, json!("boom"));
        assert!(!out.iter().any(|p| matches!(p, OutputPart::Error(_))));
    }

    #[tokio::test]
    async fn test_tool_call_streaming_emits_start_once() {
        let delta = |d: &str| StreamPart::ToolCallDelta {
            id: "c1".into(),
            name: "client".into(),
            args_delta: d.into(),
        };
        let parts = vec![delta("{\"a\""), delta(":1}"), call("c1", "client", json!({"a": 1}))];

        let off = run(parts.clone(), config()).await;
        assert_eq!(off.iter().map(label).collect::<Vec<_>>(), vec!["call:c1"]);

        let on = run(
            parts,
            MergeConfig {
                tool_call_streaming: true,
                ..config()
            },
        )
        .await;
        assert_eq!(
            on.iter().map(label).collect::<Vec<_>>(),
            vec!["start:c1", "delta:{\"a\"", "delta::1}", "call:c1"]
        );
    }

    #[tokio::test]
    async fn test_upstream_errors_do_not_end_stream() {
        let upstream: ModelStream = Box::pin(futures::stream::iter(vec![
            Ok(StreamPart::TextDelta("a".into())),
            Err(Error::Timeout { elapsed_ms: 10 }),
            Ok(StreamPart::Error {
                message: "overloaded".into(),
            }),
            Ok(StreamPart::TextDelta("b".into())),
        ]));
        let out: Vec<OutputPart> =
            merge(upstream, tools(), config(), CancellationToken::new())
                .collect()
                .await;
        let labels: Vec<String> = out.iter().map(label).collect();
        assert_eq!(labels, vec!["text:a", "error", "error", "text:b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_without_waiting() {
        let cancel = CancellationToken::new();
        let parts = vec![call("c1", "sleep", json!({"ms": 60_000})), finish()];
        let mut merged = merge(upstream(parts), tools(), config(), cancel.clone());

        let first = merged.next().await.unwrap();
        assert_eq!(label(&first), "call:c1");
        let second = merged.next().await.unwrap();
        assert_eq!(label(&second), "finish");

        cancel.cancel();
        assert!(merged.next().await.is_none());
    }
}
