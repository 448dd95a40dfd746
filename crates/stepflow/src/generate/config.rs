//! Step loop configuration.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::StepResult;
use crate::merge::MergeConfig;
use crate::retry::RetryPolicy;
use crate::{IdGenerator, RandomIdGenerator};

/// Callback invoked after every step with that step's result.
pub type StepFinishFn = Arc<dyn Fn(&StepResult) + Send + Sync>;

/// Settings for [`generate_text`](super::generate_text) and
/// [`stream_text`](super::stream_text).
///
/// ```rust
/// use stepflow::GenerateTextConfig;
///
/// let config = GenerateTextConfig {
///     max_steps: 5,
///     continue_steps: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct GenerateTextConfig {
    /// Upper bound on model calls. Must be at least 1. Default: 1.
    pub max_steps: u32,
    /// Continue responses cut off by the token limit in the same
    /// assistant message. Default: `false`.
    pub continue_steps: bool,
    /// Stream tool-call argument fragments (`stream_text` only).
    /// Default: `false`.
    pub tool_call_streaming: bool,
    /// Retry policy for each model call.
    pub retry: RetryPolicy,
    /// Source of tool execution ids.
    pub id_generator: Arc<dyn IdGenerator>,
    /// Invoked after every step.
    pub on_step_finish: Option<StepFinishFn>,
    /// Cancels the whole call: model requests, retries and tools.
    pub cancel: CancellationToken,
}

impl Default for GenerateTextConfig {
    fn default() -> Self {
        Self {
            max_steps: 1,
            continue_steps: false,
            tool_call_streaming: false,
            retry: RetryPolicy::default(),
            id_generator: Arc::new(RandomIdGenerator::new("call", 16)),
            on_step_finish: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for GenerateTextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateTextConfig")
            .field("max_steps", &self.max_steps)
            .field("continue_steps", &self.continue_steps)
            .field("tool_call_streaming", &self.tool_call_streaming)
            .field("retry", &self.retry)
            .field("id_generator", &self.id_generator)
            .field("has_on_step_finish", &self.on_step_finish.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl GenerateTextConfig {
    /// Rejects settings that can never run.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_steps < 1 {
            return Err(crate::Error::invalid_argument(
                "max_steps",
                format!("must be at least 1, got {}", self.max_steps),
            ));
        }
        self.retry.validate()
    }

    pub(crate) fn merge_config(&self, tool_call_streaming: bool) -> MergeConfig {
        MergeConfig {
            tool_call_streaming,
            id_generator: Arc::clone(&self.id_generator),
            ..MergeConfig::default()
        }
    }
}
