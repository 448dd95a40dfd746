//! Unified error type for every stepflow operation.
//!
//! Model adapters map their native failures into [`Error`], and the
//! orchestration layer adds its own kinds (tool lookup, argument
//! validation, cancellation). Callers get one type to match on no matter
//! where the failure came from.
//!
//! # Fatal vs. local
//!
//! Transport and configuration errors end the whole call. Tool and
//! per-call validation errors are local: the streaming entry points carry
//! them inline as error parts and keep going.
//!
//! ```rust
//! use stepflow_core::Error;
//!
//! fn should_retry(err: &Error) -> bool {
//!     match err {
//!         Error::Http { retryable, .. } => *retryable,
//!         Error::Provider { retryable, .. } => *retryable,
//!         Error::Timeout { .. } => true,
//!         _ => false,
//!     }
//! }
//! ```

use serde_json::Value;

/// Why a retry loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Every allowed attempt failed with a retryable error.
    MaxRetriesExceeded,
    /// An attempt failed with an error that must not be retried.
    ErrorNotRetryable,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxRetriesExceeded => f.write_str("max retries exceeded"),
            Self::ErrorNotRetryable => f.write_str("error not retryable"),
        }
    }
}

/// The error type returned by all stepflow operations.
///
/// Variants are `#[non_exhaustive]`; always include a wildcard arm.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An HTTP-level failure (transport error, unexpected status code).
    ///
    /// `status` is `None` when the request never received a response.
    #[error("HTTP error (status={status:?}): {message}")]
    Http {
        /// The HTTP status code, if one was received.
        status: Option<http::StatusCode>,
        /// A human-readable description of the failure.
        message: String,
        /// Whether the caller should retry this request.
        retryable: bool,
    },

    /// The API key or token was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A provider-specific error that doesn't map to another variant.
    #[error("Provider error ({code}): {message}")]
    Provider {
        /// Provider-defined error code (e.g. `"overloaded"`).
        code: String,
        /// Human-readable error description.
        message: String,
        /// Whether the caller should retry this request.
        retryable: bool,
    },

    /// The model call exceeded its deadline.
    #[error("Operation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the timeout fired.
        elapsed_ms: u64,
    },

    /// The caller passed an argument outside its valid range.
    #[error("Invalid argument '{parameter}': {message}")]
    InvalidArgument {
        /// The offending parameter (e.g. `"max_steps"`).
        parameter: String,
        /// What is wrong with it.
        message: String,
    },

    /// The message history cannot be sent to a model.
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    /// Model output could not be parsed as JSON.
    #[error("Response format error: {message}")]
    ResponseFormat {
        /// What went wrong during parsing.
        message: String,
        /// The raw text, for diagnostics.
        raw: String,
    },

    /// A value failed JSON Schema validation.
    #[error("Schema validation error: {message}")]
    SchemaValidation {
        /// Concatenated validation error messages.
        message: String,
        /// The value that failed validation.
        value: Value,
    },

    /// The model called a tool that was not declared for this request.
    #[error("Model tried to call unavailable tool '{tool_name}'. Available tools: {}", .available_tools.join(", "))]
    NoSuchTool {
        /// The name the model used.
        tool_name: String,
        /// Tools that were declared, sorted by name.
        available_tools: Vec<String>,
    },

    /// The model called a declared tool with arguments that fail its schema.
    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    InvalidToolArguments {
        /// The tool that was called.
        tool_name: String,
        /// The arguments the model produced.
        arguments: Value,
        /// The validation failure.
        message: String,
    },

    /// A tool executor returned an error.
    #[error("Tool execution error ({tool_name}, call {call_id}): {source}")]
    ToolExecution {
        /// The name of the tool that failed.
        tool_name: String,
        /// The tool call the execution belonged to.
        call_id: String,
        /// The underlying error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A retry policy gave up.
    #[error("Retry failed after {attempts} attempts ({reason}): {last_error}")]
    RetryExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// Why retrying stopped.
        reason: RetryReason,
        /// The error from the final attempt.
        #[source]
        last_error: Box<Error>,
    },

    /// The call's cancellation token fired.
    #[error("Operation cancelled")]
    Cancelled,

    /// A result handle was dropped before it was resolved.
    #[error("Stream closed before the result was available: {0}")]
    StreamClosed(String),

    /// Writing streamed output to a sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error is transient and the call may succeed on retry.
    ///
    /// ```rust
    /// use stepflow_core::Error;
    ///
    /// assert!(Error::Timeout { elapsed_ms: 5000 }.is_retryable());
    /// assert!(!Error::Auth("bad key".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } | Self::Provider { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Copies the error so it can be reported in more than one place.
    ///
    /// `Error` is not `Clone` because of its boxed sources. The copy keeps
    /// every field, except that a [`ToolExecution`](Self::ToolExecution)
    /// source and an [`Io`](Self::Io) error are reduced to their message.
    #[must_use]
    pub fn replicate(&self) -> Self {
        match self {
            Self::Http {
                status,
                message,
                retryable,
            } => Self::Http {
                status: *status,
                message: message.clone(),
                retryable: *retryable,
            },
            Self::Auth(message) => Self::Auth(message.clone()),
            Self::Provider {
                code,
                message,
                retryable,
            } => Self::Provider {
                code: code.clone(),
                message: message.clone(),
                retryable: *retryable,
            },
            Self::Timeout { elapsed_ms } => Self::Timeout {
                elapsed_ms: *elapsed_ms,
            },
            Self::InvalidArgument { parameter, message } => Self::InvalidArgument {
                parameter: parameter.clone(),
                message: message.clone(),
            },
            Self::InvalidPrompt(message) => Self::InvalidPrompt(message.clone()),
            Self::ResponseFormat { message, raw } => Self::ResponseFormat {
                message: message.clone(),
                raw: raw.clone(),
            },
            Self::SchemaValidation { message, value } => Self::SchemaValidation {
                message: message.clone(),
                value: value.clone(),
            },
            Self::NoSuchTool {
                tool_name,
                available_tools,
            } => Self::NoSuchTool {
                tool_name: tool_name.clone(),
                available_tools: available_tools.clone(),
            },
            Self::InvalidToolArguments {
                tool_name,
                arguments,
                message,
            } => Self::InvalidToolArguments {
                tool_name: tool_name.clone(),
                arguments: arguments.clone(),
                message: message.clone(),
            },
            Self::ToolExecution {
                tool_name,
                call_id,
                source,
            } => Self::ToolExecution {
                tool_name: tool_name.clone(),
                call_id: call_id.clone(),
                source: source.to_string().into(),
            },
            Self::RetryExhausted {
                attempts,
                reason,
                last_error,
            } => Self::RetryExhausted {
                attempts: *attempts,
                reason: *reason,
                last_error: Box::new(last_error.replicate()),
            },
            Self::Cancelled => Self::Cancelled,
            Self::StreamClosed(message) => Self::StreamClosed(message.clone()),
            Self::Io(err) => Self::Io(std::io::Error::new(err.kind(), err.to_string())),
        }
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseFormat {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_http() {
        let err = Error::Http {
            status: Some(http::StatusCode::TOO_MANY_REQUESTS),
            message: "rate limited".into(),
            retryable: true,
        };
        let display = format!("{err}");
        assert!(display.contains("429"));
        assert!(display.contains("rate limited"));
    }

    #[test]
    fn test_error_display_invalid_argument() {
        let err = Error::invalid_argument("max_steps", "must be at least 1");
        let display = format!("{err}");
        assert!(display.contains("max_steps"));
        assert!(display.contains("at least 1"));
    }

    #[test]
    fn test_error_display_no_such_tool_lists_available() {
        let err = Error::NoSuchTool {
            tool_name: "weather".into(),
            available_tools: vec!["add".into(), "search".into()],
        };
        let display = format!("{err}");
        assert!(display.contains("weather"));
        assert!(display.contains("add, search"));
    }

    #[test]
    fn test_error_display_tool_execution() {
        let err = Error::ToolExecution {
            tool_name: "calculator".into(),
            call_id: "call_1".into(),
            source: Box::new(std::io::Error::other("boom")),
        };
        let display = format!("{err}");
        assert!(display.contains("calculator"));
        assert!(display.contains("call_1"));
        assert!(display.contains("boom"));
    }

    #[test]
    fn test_error_display_retry_exhausted() {
        let err = Error::RetryExhausted {
            attempts: 3,
            reason: RetryReason::MaxRetriesExceeded,
            last_error: Box::new(Error::Http {
                status: Some(http::StatusCode::INTERNAL_SERVER_ERROR),
                message: "server error".into(),
                retryable: true,
            }),
        };
        let display = format!("{err}");
        assert!(display.contains('3'));
        assert!(display.contains("max retries exceeded"));
        assert!(display.contains("server error"));
    }

    #[test]
    fn test_error_retry_exhausted_source_chain() {
        use std::error::Error as _;
        let err = Error::RetryExhausted {
            attempts: 1,
            reason: RetryReason::ErrorNotRetryable,
            last_error: Box::new(Error::Auth("expired".into())),
        };
        let source = err.source().expect("RetryExhausted should have a source");
        assert!(format!("{source}").contains("expired"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn test_retryable_classification() {
        let transient = Error::Provider {
            code: "overloaded".into(),
            message: "busy".into(),
            retryable: true,
        };
        assert!(transient.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(
            !Error::SchemaValidation {
                message: "missing".into(),
                value: serde_json::json!({}),
            }
            .is_retryable()
        );
        assert!(!Error::invalid_argument("x", "y").is_retryable());
    }

    #[test]
    fn test_replicate_keeps_kind_and_message() {
        let err = Error::RetryExhausted {
            attempts: 2,
            reason: RetryReason::MaxRetriesExceeded,
            last_error: Box::new(Error::Timeout { elapsed_ms: 30 }),
        };
        let copy = err.replicate();
        assert_eq!(copy.to_string(), err.to_string());
        assert!(matches!(
            copy,
            Error::RetryExhausted { attempts: 2, ref last_error, .. }
                if matches!(**last_error, Error::Timeout { elapsed_ms: 30 })
        ));

        let tool = Error::ToolExecution {
            tool_name: "calc".into(),
            call_id: "c1".into(),
            source: Box::new(std::io::Error::other("boom")),
        };
        assert_eq!(tool.replicate().to_string(), tool.to_string());
    }

    #[test]
    fn test_from_io_error() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<Value>("not valid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::ResponseFormat { .. }));
    }
}
