//! Object generation settings and request preparation.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::OutputStrategy;
use crate::generate::validate_prompt;
use crate::retry::RetryPolicy;
use crate::{
    Capability, Error, JsonSchema, Message, ModelMetadata, ModelRequest, ModelResponse,
    ResponseFormat, ToolChoice, ToolDefinition, ToolResult,
};

/// Name of the forced tool in [`ObjectMode::Tool`].
pub const JSON_TOOL_NAME: &str = "json";

/// How the model is asked for JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectMode {
    /// JSON response format. The schema also goes into the system prompt
    /// when the model lacks native structured output or
    /// [`system_prompt_fallback`](GenerateObjectConfig::system_prompt_fallback)
    /// is set.
    #[default]
    Json,
    /// A single forced tool named [`JSON_TOOL_NAME`] whose arguments are
    /// the object.
    Tool,
}

/// Settings for [`generate_object`](super::generate_object) and
/// [`stream_object`](super::stream_object).
#[derive(Debug, Clone)]
pub struct GenerateObjectConfig {
    /// How the model is asked for JSON. Default: [`ObjectMode::Json`].
    pub mode: ObjectMode,
    /// Attempts including the first (`generate_object` only). Failed
    /// attempts are fed back to the model. Default: 1.
    pub max_attempts: u32,
    /// Always describe the schema in the system prompt. Default: `false`.
    pub system_prompt_fallback: bool,
    /// Schema name for providers that take one.
    pub schema_name: Option<String>,
    /// Schema description for providers that take one.
    pub schema_description: Option<String>,
    /// Retry policy for each model call.
    pub retry: RetryPolicy,
    /// Cancels the call.
    pub cancel: CancellationToken,
}

impl Default for GenerateObjectConfig {
    fn default() -> Self {
        Self {
            mode: ObjectMode::Json,
            max_attempts: 1,
            system_prompt_fallback: false,
            schema_name: None,
            schema_description: None,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl GenerateObjectConfig {
    /// Rejects settings that can never run.
    pub fn validate(&self, strategy: &OutputStrategy) -> Result<(), Error> {
        if self.max_attempts < 1 {
            return Err(Error::invalid_argument(
                "max_attempts",
                format!("must be at least 1, got {}", self.max_attempts),
            ));
        }
        if self.mode == ObjectMode::Tool && matches!(strategy, OutputStrategy::NoSchema) {
            return Err(Error::invalid_argument(
                "mode",
                "tool mode needs a schema for the tool parameters",
            ));
        }
        self.retry.validate()
    }

    /// Turns a plain request into one that asks for the strategy's shape.
    pub(crate) fn prepare(
        &self,
        mut request: ModelRequest,
        strategy: &OutputStrategy,
        model: &ModelMetadata,
    ) -> Result<ModelRequest, Error> {
        self.validate(strategy)?;
        validate_prompt(&request.messages)?;

        let schema = strategy.wire_schema();
        match self.mode {
            ObjectMode::Json => {
                let native = model.supports(Capability::StructuredOutput);
                if self.system_prompt_fallback || !native || schema.is_none() {
                    inject_schema_prompt(&mut request, schema.as_ref());
                }
                request.response_format = Some(ResponseFormat::Json {
                    schema,
                    name: self.schema_name.clone(),
                    description: self.schema_description.clone(),
                });
            }
            ObjectMode::Tool => {
                let parameters = schema.unwrap_or_else(|| JsonSchema::new(Value::Bool(true)));
                request.tools = Some(vec![ToolDefinition {
                    name: JSON_TOOL_NAME.into(),
                    description: self
                        .schema_description
                        .clone()
                        .unwrap_or_else(|| "Respond with a JSON object.".into()),
                    parameters,
                }]);
                request.tool_choice = Some(ToolChoice::Specific(JSON_TOOL_NAME.into()));
            }
        }
        request.cancel = Some(self.cancel.clone());
        Ok(request)
    }
}

/// Appends a JSON instruction, with the schema when there is one, to the
/// system prompt.
fn inject_schema_prompt(request: &mut ModelRequest, schema: Option<&JsonSchema>) {
    let instruction = match schema.map(|s| serde_json::to_string_pretty(s.as_value())) {
        Some(Ok(schema_json)) => format!(
            "You must respond with valid JSON that conforms to this JSON Schema:\n\
             ```json\n{schema_json}\n```\n\
             Respond ONLY with the JSON object. No markdown, no explanation."
        ),
        _ => "You must respond with valid JSON. No markdown, no explanation.".to_owned(),
    };

    match &mut request.system {
        Some(existing) => {
            existing.push_str("\n\n");
            existing.push_str(&instruction);
        }
        None => request.system = Some(instruction),
    }
}

/// Appends the rejected answer and the reason it was rejected, so the
/// next attempt can correct it.
pub(crate) fn append_retry_feedback(
    request: &mut ModelRequest,
    response: &ModelResponse,
    error: &Error,
) {
    let correction = format!(
        "Your response did not pass validation: {error}\n\
         Please try again with valid JSON that conforms to the schema."
    );
    let text = response.text.clone().unwrap_or_default();

    if let Some(call) = response
        .tool_calls
        .iter()
        .find(|c| c.name == JSON_TOOL_NAME)
    {
        request
            .messages
            .push(Message::assistant_with_calls(text, vec![call.clone()]));
        request
            .messages
            .push(Message::tool_results(vec![ToolResult::error(call, correction)]));
    } else {
        request.messages.push(Message::assistant(text));
        request.messages.push(Message::user(correction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::mock_model_with;
    use crate::{LanguageModel, Role};
    use serde_json::json;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![Message::user("Make a point")],
            ..Default::default()
        }
    }

    fn point() -> OutputStrategy {
        OutputStrategy::object(&JsonSchema::new(json!({
            "type": "object",
            "properties": { "x": { "type": "number" } },
            "required": ["x"]
        })))
        .unwrap()
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = GenerateObjectConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(&point()),
            Err(Error::InvalidArgument { ref parameter, .. }) if parameter == "max_attempts"
        ));
    }

    #[test]
    fn test_tool_mode_needs_schema() {
        let config = GenerateObjectConfig {
            mode: ObjectMode::Tool,
            ..Default::default()
        };
        assert!(config.validate(&OutputStrategy::NoSchema).is_err());
    }

    #[test]
    fn test_json_mode_native_structured_output_skips_prompt() {
        let model = mock_model_with("m", &[Capability::StructuredOutput]);
        let prepared = GenerateObjectConfig::default()
            .prepare(request(), &point(), &LanguageModel::metadata(&model))
            .unwrap();
        assert!(prepared.system.is_none());
        assert!(matches!(
            prepared.response_format,
            Some(ResponseFormat::Json { schema: Some(_), .. })
        ));
    }

    #[test]
    fn test_json_mode_without_native_support_injects_schema() {
        let model = mock_model_with("m", &[]);
        let prepared = GenerateObjectConfig::default()
            .prepare(request(), &point(), &LanguageModel::metadata(&model))
            .unwrap();
        assert!(prepared.system.unwrap().contains("JSON Schema"));
    }

    #[test]
    fn test_fallback_appends_to_existing_system_prompt() {
        let model = mock_model_with("m", &[Capability::StructuredOutput]);
        let config = GenerateObjectConfig {
            system_prompt_fallback: true,
            ..Default::default()
        };
        let base = ModelRequest {
            system: Some("Be brief.".into()),
            ..request()
        };
        let system = config
            .prepare(base, &point(), &LanguageModel::metadata(&model))
            .unwrap()
            .system
            .unwrap();
        assert!(system.starts_with("Be brief.\n\n"));
        assert!(system.contains("\"x\""));
    }

    #[test]
    fn test_tool_mode_forces_json_tool() {
        let model = mock_model_with("m", &[Capability::Tools]);
        let config = GenerateObjectConfig {
            mode: ObjectMode::Tool,
            ..Default::default()
        };
        let prepared = config
            .prepare(request(), &point(), &LanguageModel::metadata(&model))
            .unwrap();
        let tools = prepared.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, JSON_TOOL_NAME);
        assert_eq!(
            prepared.tool_choice,
            Some(ToolChoice::Specific(JSON_TOOL_NAME.into()))
        );
        assert!(prepared.response_format.is_none());
    }

    #[test]
    fn test_feedback_for_tool_call_answers_the_call() {
        let mut req = request();
        let response = ModelResponse {
            tool_calls: vec![crate::ToolCall::new("c1", JSON_TOOL_NAME, json!({"y": 1}))],
            ..Default::default()
        };
        append_retry_feedback(&mut req, &response, &Error::ResponseFormat {
            message: "bad".into(),
            raw: String::new(),
        });
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[2].role, Role::Tool);
        assert!(validate_prompt(&req.messages).is_ok());
    }
}
