//! Non-streaming object generation.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::config::{JSON_TOOL_NAME, append_retry_feedback};
use super::{GenerateObjectConfig, ObjectMode, OutputStrategy};
use crate::{
    CallWarning, DynLanguageModel, Error, FinishReason, ModelRequest, ModelResponse,
    ResponseMetadata, Usage,
};

/// The result of a successful [`generate_object`] call.
#[derive(Debug, Clone)]
pub struct ObjectResult {
    /// The validated value, envelope removed.
    pub object: Value,
    /// The JSON text the model produced on the accepted attempt.
    pub raw: String,
    /// Finish reason of the accepted attempt.
    pub finish_reason: FinishReason,
    /// Usage summed over every attempt.
    pub usage: Usage,
    /// Warnings from the accepted attempt.
    pub warnings: Vec<CallWarning>,
    /// Identity of the accepted response.
    pub response: ResponseMetadata,
    /// Attempts made, 1 when the first answer was accepted.
    pub attempts: u32,
}

impl ObjectResult {
    /// Deserializes the object into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.object.clone()).map_err(|e| Error::ResponseFormat {
            message: format!("failed to deserialize structured output: {e}"),
            raw: self.raw.clone(),
        })
    }
}

/// Generates a value of the strategy's shape and validates it.
///
/// 1. Asks the model for JSON (response format or forced tool, per
///    [`ObjectMode`])
/// 2. Calls the model through the retry policy
/// 3. Parses the answer and validates it fully
///
/// When parsing or validation fails and attempts remain, the answer and
/// the failure are appended to the conversation and the model is asked
/// again.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] / [`Error::InvalidPrompt`] before any call.
/// - The model's error when a call fails after retries.
/// - The last [`Error::ResponseFormat`] or [`Error::SchemaValidation`]
///   when every attempt is rejected.
///
/// ```rust,no_run
/// use serde::Deserialize;
/// use stepflow::object::{GenerateObjectConfig, OutputStrategy, generate_object};
/// use stepflow::{Message, ModelRequest};
///
/// #[derive(Deserialize, schemars::JsonSchema)]
/// struct Person {
///     name: String,
///     age: u32,
/// }
///
/// # async fn example(model: &dyn stepflow::DynLanguageModel) -> Result<(), stepflow::Error> {
/// let request = ModelRequest {
///     messages: vec![Message::user("Generate a person named Alice aged 30")],
///     ..Default::default()
/// };
/// let strategy = OutputStrategy::of_type::<Person>()?;
/// let result = generate_object(model, strategy, request, GenerateObjectConfig::default()).await?;
/// let person: Person = result.deserialize()?;
/// assert_eq!(person.name, "Alice");
/// # Ok(())
/// # }
/// ```
pub async fn generate_object(
    model: &dyn DynLanguageModel,
    strategy: OutputStrategy,
    request: ModelRequest,
    config: GenerateObjectConfig,
) -> Result<ObjectResult, Error> {
    let mut request = config.prepare(request, &strategy, &model.metadata())?;

    let mut usage = Usage::default();
    let mut last_error = None;
    for attempt in 1..=config.max_attempts {
        tracing::debug!(attempt, strategy = strategy.name(), "object attempt started");
        let response = config
            .retry
            .execute(&config.cancel, || model.generate_boxed(&request))
            .await?;
        usage += response.usage;

        let outcome = extract(&response, config.mode)
            .and_then(|(value, raw)| strategy.finalize(&value).map(|object| (object, raw)));
        match outcome {
            Ok((object, raw)) => {
                return Ok(ObjectResult {
                    object,
                    raw,
                    finish_reason: response.finish_reason,
                    usage,
                    warnings: response.warnings,
                    response: response.response,
                    attempts: attempt,
                });
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "object rejected");
                if attempt < config.max_attempts {
                    append_retry_feedback(&mut request, &response, &e);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        Error::invalid_argument("max_attempts", "no attempt was made")
    }))
}

/// Pulls the JSON answer out of a response.
fn extract(response: &ModelResponse, mode: ObjectMode) -> Result<(Value, String), Error> {
    match mode {
        ObjectMode::Json => {
            let raw = response
                .text
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| Error::ResponseFormat {
                    message: "model returned no text content for structured output".into(),
                    raw: String::new(),
                })?;
            let value = serde_json::from_str(raw).map_err(|e| Error::ResponseFormat {
                message: format!("invalid JSON in structured output: {e}"),
                raw: raw.to_owned(),
            })?;
            Ok((value, raw.to_owned()))
        }
        ObjectMode::Tool => {
            let call = response
                .tool_calls
                .iter()
                .find(|c| c.name == JSON_TOOL_NAME)
                .ok_or_else(|| Error::ResponseFormat {
                    message: format!("model did not call the '{JSON_TOOL_NAME}' tool"),
                    raw: response.text.clone().unwrap_or_default(),
                })?;
            Ok((call.arguments.clone(), call.arguments.to_string()))
        }
    }
}
