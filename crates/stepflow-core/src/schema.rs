//! JSON Schema documents and the validator seam.
//!
//! [`JsonSchema`] wraps a schema document sent to models (tool
//! parameters, structured output). [`SchemaValidator`] is what the
//! orchestration layer validates against. It has two modes:
//!
//! - **full**: the value must satisfy the schema.
//! - **partial**: the value may be an incomplete prefix of a valid value.
//!   Keywords that only hold once a value is complete (`required`,
//!   `minItems`, `enum`, ...) are not enforced.
//!
//! With the `schema` feature (default) validation is backed by the
//! [`jsonschema`] crate and schemas can be derived from Rust types via
//! [`schemars`]. Without it, [`JsonSchema`] accepts every value.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Validates values against a schema, fully or partially.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    /// The schema to send to the model, if there is one.
    fn json_schema(&self) -> Option<&JsonSchema> {
        None
    }

    /// Checks a complete value. Returns the accepted value.
    fn validate(&self, value: &Value) -> Result<Value, Error>;

    /// Checks a value that may still be growing.
    fn validate_partial(&self, value: &Value) -> Result<Value, Error> {
        Ok(value.clone())
    }
}

/// A JSON Schema document.
///
/// ```rust
/// use stepflow_core::JsonSchema;
///
/// let schema = JsonSchema::new(serde_json::json!({
///     "type": "object",
///     "properties": { "name": { "type": "string" } },
///     "required": ["name"]
/// }));
/// assert_eq!(schema.as_value()["type"], "object");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema(Value);

impl JsonSchema {
    /// Creates a schema from a raw JSON value.
    pub fn new(schema: Value) -> Self {
        Self(schema)
    }

    /// Returns the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Derives a schema from a type implementing [`schemars::JsonSchema`].
    #[cfg(feature = "schema")]
    pub fn from_type<T: schemars::JsonSchema>() -> Result<Self, serde_json::Error> {
        let schema = schemars::schema_for!(T);
        let value = serde_json::to_value(schema)?;
        Ok(Self(value))
    }

    /// A copy of this schema with completeness keywords removed.
    ///
    /// Values that satisfy the original schema always satisfy the relaxed
    /// one, and so do truncated prefixes of them.
    #[must_use]
    pub fn relaxed(&self) -> Self {
        Self(relax(&self.0))
    }

    /// Compiles the schema once for repeated validation.
    #[cfg(feature = "schema")]
    pub fn compile(&self) -> Result<Arc<dyn SchemaValidator>, Error> {
        Ok(Arc::new(CompiledSchema::new(self.clone())?))
    }

    /// Compiles the schema once for repeated validation.
    #[cfg(not(feature = "schema"))]
    pub fn compile(&self) -> Result<Arc<dyn SchemaValidator>, Error> {
        Ok(Arc::new(self.clone()))
    }

    /// Validates `value` against this schema.
    ///
    /// Compiles on every call; use [`compile`](Self::compile) in loops.
    #[cfg(feature = "schema")]
    pub fn check(&self, value: &Value) -> Result<(), Error> {
        let validator = build_validator(&self.0)?;
        collect_errors(&validator, value)
    }

    /// Validates `value` against this schema. Accepts everything without
    /// the `schema` feature.
    #[cfg(not(feature = "schema"))]
    pub fn check(&self, _value: &Value) -> Result<(), Error> {
        Ok(())
    }
}

impl SchemaValidator for JsonSchema {
    fn json_schema(&self) -> Option<&JsonSchema> {
        Some(self)
    }

    fn validate(&self, value: &Value) -> Result<Value, Error> {
        self.check(value)?;
        Ok(value.clone())
    }

    fn validate_partial(&self, value: &Value) -> Result<Value, Error> {
        self.relaxed().check(value)?;
        Ok(value.clone())
    }
}

/// A schema compiled for both validation modes.
#[cfg(feature = "schema")]
pub struct CompiledSchema {
    schema: JsonSchema,
    full: jsonschema::Validator,
    partial: jsonschema::Validator,
}

#[cfg(feature = "schema")]
impl CompiledSchema {
    /// Compiles `schema`. Fails with [`Error::InvalidArgument`] when the
    /// document is not a valid schema.
    pub fn new(schema: JsonSchema) -> Result<Self, Error> {
        let full = build_validator(schema.as_value())?;
        let partial = build_validator(&relax(schema.as_value()))?;
        Ok(Self {
            schema,
            full,
            partial,
        })
    }
}

#[cfg(feature = "schema")]
impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "schema")]
impl SchemaValidator for CompiledSchema {
    fn json_schema(&self) -> Option<&JsonSchema> {
        Some(&self.schema)
    }

    fn validate(&self, value: &Value) -> Result<Value, Error> {
        collect_errors(&self.full, value)?;
        Ok(value.clone())
    }

    fn validate_partial(&self, value: &Value) -> Result<Value, Error> {
        collect_errors(&self.partial, value)?;
        Ok(value.clone())
    }
}

#[cfg(feature = "schema")]
fn build_validator(schema: &Value) -> Result<jsonschema::Validator, Error> {
    jsonschema::validator_for(schema)
        .map_err(|e| Error::invalid_argument("schema", format!("invalid JSON schema: {e}")))
}

#[cfg(feature = "schema")]
fn collect_errors(validator: &jsonschema::Validator, value: &Value) -> Result<(), Error> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::SchemaValidation {
            message: errors.join("; "),
            value: value.clone(),
        })
    }
}

/// A validator backed by a closure, for checks a schema cannot express.
///
/// Created by [`validator_fn`].
pub struct FnValidator<F> {
    schema: Option<JsonSchema>,
    check: F,
}

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl<F> SchemaValidator for FnValidator<F>
where
    F: Fn(&Value) -> Result<Value, Error> + Send + Sync,
{
    fn json_schema(&self) -> Option<&JsonSchema> {
        self.schema.as_ref()
    }

    fn validate(&self, value: &Value) -> Result<Value, Error> {
        (self.check)(value)
    }
}

/// Wraps a closure as a [`SchemaValidator`].
///
/// `schema` is only sent to the model; `check` decides acceptance.
/// Partial values are accepted unchecked.
pub fn validator_fn<F>(schema: Option<JsonSchema>, check: F) -> FnValidator<F>
where
    F: Fn(&Value) -> Result<Value, Error> + Send + Sync,
{
    FnValidator { schema, check }
}

const COMPLETENESS_KEYWORDS: &[&str] = &[
    "required",
    "minItems",
    "minLength",
    "minProperties",
    "minContains",
    "enum",
    "const",
    "pattern",
    "dependentRequired",
];

const SCHEMA_MAP_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
];

const SCHEMA_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "additionalItems",
    "items",
    "contains",
    "not",
    "if",
    "then",
    "else",
    "propertyNames",
    "unevaluatedItems",
    "unevaluatedProperties",
];

const SCHEMA_LIST_KEYWORDS: &[&str] = &["items", "prefixItems", "allOf", "anyOf", "oneOf"];

fn relax(schema: &Value) -> Value {
    let Value::Object(node) = schema else {
        return schema.clone();
    };

    let mut out = Map::with_capacity(node.len());
    for (key, value) in node {
        let key = key.as_str();
        if COMPLETENESS_KEYWORDS.contains(&key) {
            continue;
        }
        let relaxed = match value {
            Value::Object(map) if SCHEMA_MAP_KEYWORDS.contains(&key) => Value::Object(
                map.iter()
                    .map(|(name, sub)| (name.clone(), relax(sub)))
                    .collect(),
            ),
            Value::Object(_) if SCHEMA_KEYWORDS.contains(&key) => relax(value),
            Value::Array(list) if SCHEMA_LIST_KEYWORDS.contains(&key) => {
                Value::Array(list.iter().map(relax).collect())
            }
            other => other.clone(),
        };
        out.insert(key.to_owned(), relaxed);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> JsonSchema {
        JsonSchema::new(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "minLength": 2},
                "age": {"type": "integer"},
                "tags": {"type": "array", "items": {"type": "string", "enum": ["a", "b"]}, "minItems": 1}
            },
            "required": ["name", "age"]
        }))
    }

    #[test]
    fn test_relaxed_drops_completeness_keywords() {
        let relaxed = person_schema().relaxed();
        let v = relaxed.as_value();
        assert!(v.get("required").is_none());
        assert!(v["properties"]["name"].get("minLength").is_none());
        assert!(v["properties"]["tags"].get("minItems").is_none());
        assert!(v["properties"]["tags"]["items"].get("enum").is_none());
        assert_eq!(v["properties"]["age"]["type"], "integer");
    }

    #[test]
    fn test_relaxed_keeps_property_named_required() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": {"required": {"type": "boolean"}},
            "required": ["required"]
        }));
        let relaxed = schema.relaxed();
        assert!(relaxed.as_value().get("required").is_none());
        assert_eq!(
            relaxed.as_value()["properties"]["required"]["type"],
            "boolean"
        );
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_validate_full_rejects_missing_field() {
        let err = person_schema().validate(&json!({"name": "Al"})).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation { .. }));
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_validate_partial_tolerates_missing_fields() {
        let schema = person_schema();
        assert!(schema.validate_partial(&json!({"name": "A"})).is_ok());
        assert!(schema.validate_partial(&json!({"tags": ["x"]})).is_ok());
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_validate_partial_rejects_wrong_type() {
        let schema = person_schema();
        assert!(schema.validate_partial(&json!({"age": "old"})).is_err());
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_compiled_schema_matches_uncompiled() {
        let compiled = person_schema().compile().unwrap();
        let good = json!({"name": "Alice", "age": 30});
        assert_eq!(compiled.validate(&good).unwrap(), good);
        assert!(compiled.validate(&json!({"name": "Alice"})).is_err());
        assert!(compiled.validate_partial(&json!({"name": "Alice"})).is_ok());
        assert!(compiled.json_schema().is_some());
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_compile_invalid_schema() {
        let err = JsonSchema::new(json!({"type": "bogus_not_a_type"}))
            .compile()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_from_type_has_properties() {
        #[derive(schemars::JsonSchema)]
        struct Point {
            #[allow(dead_code)]
            x: i32,
        }
        let schema = JsonSchema::from_type::<Point>().unwrap();
        assert!(schema.as_value()["properties"].get("x").is_some());
    }

    #[test]
    fn test_validator_fn_uses_closure() {
        let positive = validator_fn(None, |v: &Value| match v.as_i64() {
            Some(n) if n > 0 => Ok(v.clone()),
            _ => Err(Error::SchemaValidation {
                message: "expected a positive integer".into(),
                value: v.clone(),
            }),
        });
        assert!(positive.validate(&json!(3)).is_ok());
        assert!(positive.validate(&json!(-3)).is_err());
        assert!(positive.validate_partial(&json!(-3)).is_ok());
        assert!(positive.json_schema().is_none());
    }
}
