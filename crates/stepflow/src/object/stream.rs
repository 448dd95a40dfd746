//! Streaming object generation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::config::JSON_TOOL_NAME;
use super::{GenerateObjectConfig, Materializer, MaterializerEvent, ObjectMode, OutputStrategy};
use crate::deferred::{Deferred, Resolver, deferred};
use crate::{
    DynLanguageModel, Error, FinishReason, ModelRequest, ResponseMetadata, StreamPart, Usage,
};

/// One event of an [`ObjectStream`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ObjectStreamPart {
    /// A new partial value. In array mode, the elements completed so far.
    Object(Value),
    /// Raw JSON text as the model produced it.
    TextDelta(String),
    /// The model finished.
    Finish {
        /// Why the model stopped.
        finish_reason: FinishReason,
        /// Token counts for the call.
        usage: Usage,
        /// Response identity.
        response: ResponseMetadata,
    },
    /// A transport or provider failure.
    Error(Arc<Error>),
}

/// Handle returned by [`stream_object`].
///
/// The part stream and the final [`object`](Self::object) are
/// independent: partial values keep flowing even when the final value
/// later fails validation, and only awaiting `object` reports that
/// failure.
#[derive(Debug)]
pub struct ObjectStream {
    parts: mpsc::UnboundedReceiver<ObjectStreamPart>,
    /// The fully validated value.
    pub object: Deferred<Value>,
    /// Token counts for the call.
    pub usage: Deferred<Usage>,
    /// Response identity.
    pub response: Deferred<ResponseMetadata>,
}

impl Stream for ObjectStream {
    type Item = ObjectStreamPart;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.parts.poll_recv(cx)
    }
}

impl ObjectStream {
    /// Only the partial values.
    pub fn partial_object_stream(&mut self) -> impl Stream<Item = Value> + '_ {
        self.filter_map(|part| {
            futures::future::ready(match part {
                ObjectStreamPart::Object(value) => Some(value),
                _ => None,
            })
        })
    }

    /// Each array element once, as soon as it is complete.
    ///
    /// Only meaningful for [`OutputStrategy::Array`]; other strategies
    /// yield nothing.
    pub fn element_stream(&mut self) -> impl Stream<Item = Value> + '_ {
        let mut seen = 0;
        self.partial_object_stream().flat_map(move |value| {
            let fresh = match value {
                Value::Array(items) if items.len() > seen => {
                    let fresh = items[seen..].to_vec();
                    seen = items.len();
                    fresh
                }
                _ => Vec::new(),
            };
            futures::stream::iter(fresh)
        })
    }

    /// Only the raw JSON text.
    pub fn text_stream(&mut self) -> impl Stream<Item = String> + '_ {
        self.filter_map(|part| {
            futures::future::ready(match part {
                ObjectStreamPart::TextDelta(text) => Some(text),
                _ => None,
            })
        })
    }

    /// Writes the raw JSON text to `sink` and flushes it at the end.
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

/// Streams a value of the strategy's shape as it is generated.
///
/// The request is prepared as in [`generate_object`](super::generate_object)
/// and sent once; `max_attempts` does not apply. Text (or, in tool mode,
/// the `json` tool's argument fragments) runs through a [`Materializer`]
/// and every change of the visible value becomes an
/// [`Object`](ObjectStreamPart::Object) part. When the model finishes,
/// [`usage`](ObjectStream::usage) and [`response`](ObjectStream::response)
/// resolve and the buffer is validated in full to settle
/// [`object`](ObjectStream::object).
///
/// Failures before the stream opens end the part stream with an
/// [`Error`](ObjectStreamPart::Error) and reject every handle.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use futures::StreamExt;
/// use stepflow::object::{GenerateObjectConfig, OutputStrategy, stream_object};
/// use stepflow::{JsonSchema, Message, ModelRequest};
///
/// # async fn example(model: Arc<dyn stepflow::DynLanguageModel>) -> Result<(), stepflow::Error> {
/// let schema = JsonSchema::new(serde_json::json!({
///     "type": "object",
///     "properties": { "name": { "type": "string" } },
///     "required": ["name"]
/// }));
/// let request = ModelRequest {
///     messages: vec![Message::user("Invent a hero")],
///     ..Default::default()
/// };
/// let mut stream = stream_object(
///     model,
///     OutputStrategy::array(&schema)?,
///     request,
///     GenerateObjectConfig::default(),
/// );
/// let mut heroes = stream.element_stream();
/// while let Some(hero) = heroes.next().await {
///     println!("{hero}");
/// }
/// # Ok(())
/// # }
/// ```
pub fn stream_object(
    model: Arc<dyn DynLanguageModel>,
    strategy: OutputStrategy,
    request: ModelRequest,
    config: GenerateObjectConfig,
) -> ObjectStream {
    let (tx, parts) = mpsc::unbounded_channel();
    let (object_tx, object) = deferred();
    let (usage_tx, usage) = deferred();
    let (response_tx, response) = deferred();

    tokio::spawn(async move {
        let handles = Handles {
            object: object_tx,
            usage: usage_tx,
            response: response_tx,
        };
        match drive(model.as_ref(), strategy, request, &config, &tx).await {
            Ok(outcome) => {
                let _ = tx.send(ObjectStreamPart::Finish {
                    finish_reason: outcome.finish_reason,
                    usage: outcome.usage,
                    response: outcome.response.clone(),
                });
                handles.usage.resolve(outcome.usage);
                handles.response.resolve(outcome.response);
                if let Err(e) = &outcome.object {
                    tracing::debug!(error = %e, "final object rejected");
                }
                handles.object.settle(outcome.object);
            }
            Err(e) => {
                tracing::debug!(error = %e, "object stream failed");
                let _ = tx.send(ObjectStreamPart::Error(Arc::new(e.replicate())));
                handles.usage.reject(e.replicate());
                handles.response.reject(e.replicate());
                handles.object.reject(e);
            }
        }
    });

    ObjectStream {
        parts,
        object,
        usage,
        response,
    }
}

struct Handles {
    object: Resolver<Value>,
    usage: Resolver<Usage>,
    response: Resolver<ResponseMetadata>,
}

struct Outcome {
    object: Result<Value, Error>,
    finish_reason: FinishReason,
    usage: Usage,
    response: ResponseMetadata,
}

async fn drive(
    model: &dyn DynLanguageModel,
    strategy: OutputStrategy,
    request: ModelRequest,
    config: &GenerateObjectConfig,
    tx: &mpsc::UnboundedSender<ObjectStreamPart>,
) -> Result<Outcome, Error> {
    let request = config.prepare(request, &strategy, &model.metadata())?;
    let mut upstream = config
        .retry
        .execute(&config.cancel, || model.stream_boxed(&request))
        .await?;

    let send = |part: ObjectStreamPart| {
        let _ = tx.send(part);
    };
    let mut materializer = Materializer::new(strategy);
    let feed = |delta: &str, materializer: &mut Materializer| {
        if delta.is_empty() {
            return;
        }
        send(ObjectStreamPart::TextDelta(delta.to_owned()));
        if let MaterializerEvent::Partial { value, .. } = materializer.feed(delta) {
            send(ObjectStreamPart::Object(value));
        }
    };

    let mut finish_reason = FinishReason::Unknown;
    let mut usage = Usage::default();
    let mut response = ResponseMetadata::default();
    loop {
        let item = tokio::select! {
            biased;
            () = config.cancel.cancelled() => {
                tracing::debug!("object stream cancelled");
                return Err(Error::Cancelled);
            }
            item = upstream.next() => item,
        };
        let Some(item) = item else { break };

        match item {
            Ok(StreamPart::TextDelta(text)) if config.mode == ObjectMode::Json => {
                feed(&text, &mut materializer);
            }
            Ok(StreamPart::ToolCallDelta {
                name, args_delta, ..
            }) if config.mode == ObjectMode::Tool && name == JSON_TOOL_NAME => {
                feed(&args_delta, &mut materializer);
            }
            Ok(StreamPart::ToolCall(call))
                if config.mode == ObjectMode::Tool
                    && call.name == JSON_TOOL_NAME
                    && materializer.text().is_empty() =>
            {
                feed(&call.arguments.to_string(), &mut materializer);
            }
            Ok(StreamPart::ResponseMetadata(meta)) => response.merge(meta),
            Ok(StreamPart::Finish {
                reason,
                usage: step_usage,
            }) => {
                finish_reason = reason;
                usage = step_usage;
            }
            Ok(StreamPart::Error { message }) => {
                send(ObjectStreamPart::Error(Arc::new(Error::Provider {
                    code: "stream_error".into(),
                    message,
                    retryable: false,
                })));
            }
            Err(e) => send(ObjectStreamPart::Error(Arc::new(e))),
            Ok(_) => {}
        }
    }

    Ok(Outcome {
        object: materializer.finish(),
        finish_reason,
        usage,
        response,
    })
}
