//! The model port and request types.
//!
//! Two abstractions live here:
//!
//! - **[`LanguageModel`]**: the trait every backend implements, written
//!   with native async-fn-in-traits.
//! - **[`DynLanguageModel`]**: an object-safe mirror using boxed futures.
//!   A blanket `impl<T: LanguageModel> DynLanguageModel for T` bridges the
//!   two, so any model can be stored as `Arc<dyn DynLanguageModel>`.
//!
//! All request configuration lives in [`ModelRequest`]. It serializes to
//! JSON for logging and replay, except [`headers`](ModelRequest::headers)
//! and [`cancel`](ModelRequest::cancel), which are transport concerns.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::chat::{Message, ModelResponse};
use crate::error::Error;
use crate::schema::JsonSchema;
use crate::stream::ModelStream;

/// The trait every model backend implements.
///
/// Retries, tool execution and multi-step control are layered on top by
/// the orchestration crate, so implementations only map requests and
/// responses.
///
/// `LanguageModel` is not object-safe; use [`DynLanguageModel`] behind
/// `dyn`.
pub trait LanguageModel: Send + Sync {
    /// Runs one request to completion.
    fn generate(
        &self,
        request: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Error>> + Send;

    /// Runs one request and streams its output.
    fn stream(
        &self,
        request: &ModelRequest,
    ) -> impl Future<Output = Result<ModelStream, Error>> + Send;

    /// Static description of this model instance.
    fn metadata(&self) -> ModelMetadata;
}

/// Object-safe counterpart of [`LanguageModel`].
///
/// ```rust,no_run
/// use stepflow_core::{DynLanguageModel, Message, ModelRequest};
///
/// async fn ask(model: &dyn DynLanguageModel, question: &str) -> Option<String> {
///     let request = ModelRequest {
///         messages: vec![Message::user(question)],
///         ..Default::default()
///     };
///     model.generate_boxed(&request).await.ok()?.text
/// }
/// ```
pub trait DynLanguageModel: Send + Sync {
    /// Boxed-future version of [`LanguageModel::generate`].
    fn generate_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelResponse, Error>> + Send + 'a>>;

    /// Boxed-future version of [`LanguageModel::stream`].
    fn stream_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelStream, Error>> + Send + 'a>>;

    /// Static description of this model instance.
    fn metadata(&self) -> ModelMetadata;
}

impl<T: LanguageModel> DynLanguageModel for T {
    fn generate_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelResponse, Error>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }

    fn stream_boxed<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ModelStream, Error>> + Send + 'a>> {
        Box::pin(self.stream(request))
    }

    fn metadata(&self) -> ModelMetadata {
        LanguageModel::metadata(self)
    }
}

/// Describes a model instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Provider name (e.g. `"openai"`).
    pub provider: Cow<'static, str>,
    /// Model identifier.
    pub model_id: String,
    /// Features the model supports.
    pub capabilities: HashSet<Capability>,
}

impl ModelMetadata {
    /// Whether `capability` is supported.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// A feature a model may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Function/tool calling.
    Tools,
    /// Schema-constrained JSON output without prompt instructions.
    StructuredOutput,
    /// Image inputs.
    Vision,
}

/// Parameters for one model call.
///
/// ```rust
/// use stepflow_core::{Message, ModelRequest};
///
/// let request = ModelRequest {
///     messages: vec![Message::user("Hello")],
///     max_tokens: Some(256),
///     temperature: Some(0.7),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System prompt, for models that take it outside the message list.
    pub system: Option<String>,
    /// The conversation history.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Option<Vec<ToolDefinition>>,
    /// Whether and how the model uses tools.
    pub tool_choice: Option<ToolChoice>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling.
    pub top_p: Option<f32>,
    /// Top-k sampling.
    pub top_k: Option<u32>,
    /// Penalty for repeating prompt content.
    pub presence_penalty: Option<f32>,
    /// Penalty for repeating tokens.
    pub frequency_penalty: Option<f32>,
    /// Sequences that end generation.
    pub stop_sequences: Option<Vec<String>>,
    /// Seed for deterministic sampling.
    pub seed: Option<u64>,
    /// Constrains the output format.
    pub response_format: Option<ResponseFormat>,
    /// Extra HTTP headers. Skipped during serialization.
    #[serde(skip)]
    pub headers: Option<http::HeaderMap>,
    /// Aborts the call when cancelled. Skipped during serialization.
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
    /// Provider-specific options without a dedicated field.
    pub metadata: HashMap<String, Value>,
}

/// Controls whether the model should use tools and, if so, which ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// The model must not call tools.
    None,
    /// The model must call at least one tool.
    Required,
    /// The model must call this tool.
    Specific(String),
}

/// Output format constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Free text.
    Text,
    /// JSON, optionally constrained by a schema.
    Json {
        /// Schema the output must match.
        schema: Option<JsonSchema>,
        /// Schema name for providers that want one.
        name: Option<String>,
        /// Schema description for providers that want one.
        description: Option<String>,
    },
}

/// A tool declaration sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name used in [`ToolCall::name`](crate::ToolCall::name).
    pub name: String,
    /// Tells the model when to use the tool.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: JsonSchema,
}
