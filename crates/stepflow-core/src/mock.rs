//! Mock model for testing.
//!
//! [`MockModel`] is a queue-based fake that lets tests decide exactly what
//! each call returns, without touching the network. It implements
//! [`LanguageModel`], so it also works as a
//! [`DynLanguageModel`](crate::DynLanguageModel) through the blanket impl.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stepflow_core::mock::MockModel;
//! use stepflow_core::test_helpers::{mock_model, sample_response};
//! use stepflow_core::{LanguageModel, ModelRequest};
//!
//! # async fn example() {
//! let mock = mock_model("test-model");
//! mock.queue_response(sample_response("Hello!"));
//!
//! let response = mock.generate(&ModelRequest::default()).await.unwrap();
//! assert_eq!(response.text.as_deref(), Some("Hello!"));
//! assert_eq!(mock.recorded_calls().len(), 1);
//! # }
//! ```
//!
//! # Why `MockError` instead of `Error`?
//!
//! [`Error`] holds boxed sources and is not `Clone`, so it can't sit in a
//! queue. [`MockError`] mirrors the common variants in a cloneable form
//! and converts at dequeue time.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;

use crate::chat::ModelResponse;
use crate::error::Error;
use crate::model::{LanguageModel, ModelMetadata, ModelRequest};
use crate::stream::{ModelStream, StreamPart};

/// A queued stream: each item is a part or a mid-stream failure, with an
/// optional delay before it is yielded.
type QueuedStream = Vec<(Duration, Result<StreamPart, MockError>)>;

/// A queue-based mock model for unit and integration tests.
///
/// Each call to `generate` or `stream` pops from the front of its own
/// queue. Every call records its [`ModelRequest`] for later assertion via
/// [`recorded_calls`](Self::recorded_calls).
///
/// # Panics
///
/// [`generate`](LanguageModel::generate) panics if the response queue is
/// empty. [`stream`](LanguageModel::stream) panics if the stream queue is
/// empty.
pub struct MockModel {
    responses: Mutex<VecDeque<Result<ModelResponse, MockError>>>,
    stream_responses: Mutex<VecDeque<Result<QueuedStream, MockError>>>,
    meta: ModelMetadata,
    calls: Arc<Mutex<Vec<ModelRequest>>>,
}

/// Cloneable error subset for mock queuing.
#[derive(Debug, Clone)]
pub enum MockError {
    /// Maps to [`Error::Http`].
    Http {
        /// HTTP status code, if any.
        status: Option<http::StatusCode>,
        /// Error message.
        message: String,
        /// Whether the error is retryable.
        retryable: bool,
    },
    /// Maps to [`Error::Auth`].
    Auth(String),
    /// Maps to [`Error::Provider`].
    Provider {
        /// Provider error code.
        code: String,
        /// Error message.
        message: String,
        /// Whether the error is retryable.
        retryable: bool,
    },
    /// Maps to [`Error::Timeout`].
    Timeout {
        /// Elapsed milliseconds.
        elapsed_ms: u64,
    },
    /// Maps to [`Error::ResponseFormat`].
    ResponseFormat {
        /// What went wrong during parsing.
        message: String,
        /// The raw response body.
        raw: String,
    },
}

impl MockError {
    fn into_error(self) -> Error {
        match self {
            Self::Http {
                status,
                message,
                retryable,
            } => Error::Http {
                status,
                message,
                retryable,
            },
            Self::Auth(msg) => Error::Auth(msg),
            Self::Provider {
                code,
                message,
                retryable,
            } => Error::Provider {
                code,
                message,
                retryable,
            },
            Self::Timeout { elapsed_ms } => Error::Timeout { elapsed_ms },
            Self::ResponseFormat { message, raw } => Error::ResponseFormat { message, raw },
        }
    }
}

impl fmt::Debug for MockModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response_len = self.responses.lock().unwrap().len();
        let stream_len = self.stream_responses.lock().unwrap().len();
        let call_count = self.calls.lock().unwrap().len();
        f.debug_struct("MockModel")
            .field("meta", &self.meta)
            .field("queued_responses", &response_len)
            .field("queued_streams", &stream_len)
            .field("recorded_calls", &call_count)
            .finish()
    }
}

impl MockModel {
    /// Creates a mock with the given metadata and empty queues.
    pub fn new(meta: ModelMetadata) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            stream_responses: Mutex::new(VecDeque::new()),
            meta,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueues a response for the next `generate` call.
    pub fn queue_response(&self, response: ModelResponse) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Enqueues an error for the next `generate` call.
    pub fn queue_error(&self, error: MockError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Enqueues parts for the next `stream` call.
    pub fn queue_stream(&self, parts: Vec<StreamPart>) -> &Self {
        let queued = parts.into_iter().map(|p| (Duration::ZERO, Ok(p))).collect();
        self.stream_responses.lock().unwrap().push_back(Ok(queued));
        self
    }

    /// Enqueues parts and mid-stream failures for the next `stream` call.
    pub fn queue_stream_results(&self, items: Vec<Result<StreamPart, MockError>>) -> &Self {
        let queued = items.into_iter().map(|r| (Duration::ZERO, r)).collect();
        self.stream_responses.lock().unwrap().push_back(Ok(queued));
        self
    }

    /// Enqueues parts for the next `stream` call, each yielded after its
    /// delay. Use with a paused tokio clock to script interleavings.
    pub fn queue_stream_delayed(&self, parts: Vec<(Duration, StreamPart)>) -> &Self {
        let queued = parts.into_iter().map(|(d, p)| (d, Ok(p))).collect();
        self.stream_responses.lock().unwrap().push_back(Ok(queued));
        self
    }

    /// Enqueues an error returned by `stream()` itself, before any part.
    pub fn queue_stream_error(&self, error: MockError) -> &Self {
        self.stream_responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Returns a clone of every request passed to `generate` or `stream`,
    /// in call order.
    pub fn recorded_calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, request: &ModelRequest) {
        self.calls.lock().unwrap().push(request.clone());
    }
}

impl LanguageModel for MockModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, Error> {
        self.record_call(request);
        let result = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockModel: no queued responses remaining");
        result.map_err(MockError::into_error)
    }

    async fn stream(&self, request: &ModelRequest) -> Result<ModelStream, Error> {
        self.record_call(request);
        let result = self
            .stream_responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockModel: no queued stream responses remaining");
        let items = result.map_err(MockError::into_error)?;
        let stream = futures::stream::iter(items).then(|(delay, item)| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item.map_err(MockError::into_error)
        });
        Ok(Box::pin(stream))
    }

    fn metadata(&self) -> ModelMetadata {
        self.meta.clone()
    }
}
