//! Output strategies: what shape the model is asked for and how partial
//! and final values are checked.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::json::{ParseState, PartialJson};
use crate::{Error, JsonSchema, SchemaValidator};

/// The shape of a structured response.
///
/// Arrays and enums are wrapped in an object envelope on the wire
/// (`{"elements": [...]}` and `{"result": "..."}`) because most providers
/// only accept object schemas. The envelope is removed from every value
/// handed back to the caller.
#[derive(Debug, Clone)]
pub enum OutputStrategy {
    /// A single object checked by the validator.
    Object(Arc<dyn SchemaValidator>),
    /// A list whose elements are each checked by the validator.
    Array(Arc<dyn SchemaValidator>),
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// Any JSON value.
    NoSchema,
}

impl OutputStrategy {
    /// An object matching `schema`.
    pub fn object(schema: &JsonSchema) -> Result<Self, Error> {
        Ok(Self::Object(schema.compile()?))
    }

    /// An array whose elements match `element`.
    pub fn array(element: &JsonSchema) -> Result<Self, Error> {
        Ok(Self::Array(element.compile()?))
    }

    /// One of `values`. Fails when `values` is empty.
    pub fn enumeration<I, S>(values: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(Error::invalid_argument(
                "values",
                "an enum output needs at least one value",
            ));
        }
        Ok(Self::Enum(values))
    }

    /// An object of type `T`, with the schema derived by `schemars`.
    #[cfg(feature = "schema")]
    pub fn of_type<T: schemars::JsonSchema>() -> Result<Self, Error> {
        let schema = JsonSchema::from_type::<T>()
            .map_err(|e| Error::invalid_argument("schema", format!("failed to derive: {e}")))?;
        Self::object(&schema)
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Enum(_) => "enum",
            Self::NoSchema => "no-schema",
        }
    }

    /// The schema sent to the model, envelope included.
    pub fn wire_schema(&self) -> Option<JsonSchema> {
        match self {
            Self::Object(validator) => validator.json_schema().cloned(),
            Self::Array(validator) => {
                let mut items = validator
                    .json_schema()
                    .map_or_else(|| json!({}), |s| s.as_value().clone());
                if let Value::Object(map) = &mut items {
                    map.remove("$schema");
                }
                Some(JsonSchema::new(json!({
                    "type": "object",
                    "properties": {
                        "elements": { "type": "array", "items": items }
                    },
                    "required": ["elements"],
                    "additionalProperties": false
                })))
            }
            Self::Enum(values) => Some(JsonSchema::new(json!({
                "type": "object",
                "properties": {
                    "result": { "type": "string", "enum": values }
                },
                "required": ["result"],
                "additionalProperties": false
            }))),
            Self::NoSchema => None,
        }
    }

    /// The caller-facing value for a possibly incomplete parse, or `None`
    /// when nothing should be shown yet.
    pub(crate) fn partial(&self, parsed: &PartialJson) -> Option<Value> {
        let value = parsed.value.as_ref()?;
        match self {
            Self::Object(validator) => validator.validate_partial(value).ok(),
            Self::Array(validator) => {
                let elements = value.get("elements")?.as_array()?;
                let closed = parsed.state == ParseState::Successful || parsed.open_containers <= 1;
                let next_started = parsed.open_containers == 2 && parsed.after_array_comma;
                let complete = if closed || next_started {
                    elements.len()
                } else {
                    elements.len().saturating_sub(1)
                };
                elements[..complete]
                    .iter()
                    .map(|element| validator.validate(element).ok())
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array)
            }
            Self::Enum(values) => {
                let prefix = value.get("result")?.as_str()?;
                if prefix.is_empty() {
                    return None;
                }
                let mut candidates = values.iter().filter(|v| v.starts_with(prefix));
                match (candidates.next(), candidates.next()) {
                    (None, _) => None,
                    (Some(only), None) => Some(Value::String(only.clone())),
                    (Some(_), Some(_)) => Some(Value::String(prefix.to_owned())),
                }
            }
            Self::NoSchema => Some(value.clone()),
        }
    }

    /// Full validation of a finished value, envelope removed.
    pub(crate) fn finalize(&self, value: &Value) -> Result<Value, Error> {
        match self {
            Self::Object(validator) => validator.validate(value),
            Self::Array(validator) => {
                let elements = value
                    .get("elements")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::SchemaValidation {
                        message: "value must be an object that contains an array of elements"
                            .into(),
                        value: value.clone(),
                    })?;
                elements
                    .iter()
                    .map(|element| validator.validate(element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            Self::Enum(values) => match value.get("result").and_then(Value::as_str) {
                Some(result) if values.iter().any(|v| v == result) => {
                    Ok(Value::String(result.to_owned()))
                }
                _ => Err(Error::SchemaValidation {
                    message: format!("value must be one of: {}", values.join(", ")),
                    value: value.clone(),
                }),
            },
            Self::NoSchema => Ok(value.clone()),
        }
    }
}
