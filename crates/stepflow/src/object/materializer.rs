//! Turns a growing JSON text buffer into partial and final values.

use serde_json::Value;

use super::OutputStrategy;
use crate::Error;
use crate::json::{ParseState, parse_partial_json};

/// What a [`Materializer::feed`] call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializerEvent {
    /// The visible value changed.
    Partial {
        /// The new partial value, envelope removed.
        value: Value,
        /// Text received since the previous `Partial`.
        text_delta: String,
    },
    /// Nothing new to show.
    NoChange,
}

/// Incremental JSON materializer.
///
/// Feed it text as it arrives. Each [`feed`](Self::feed) repairs the
/// buffer into the best value it can, checks it in partial mode and
/// reports a [`Partial`](MaterializerEvent::Partial) only when the value
/// differs from the last one reported. [`finish`](Self::finish) runs full
/// validation on the whole buffer.
///
/// ```rust
/// use serde_json::json;
/// use stepflow::object::{Materializer, MaterializerEvent, OutputStrategy};
///
/// let mut m = Materializer::new(OutputStrategy::NoSchema);
/// assert!(matches!(m.feed(r#"{"city": "Par"#), MaterializerEvent::Partial { .. }));
/// assert_eq!(m.feed(" "), MaterializerEvent::NoChange);
/// m.feed(r#"is"}"#);
/// assert_eq!(m.finish().unwrap(), json!({"city": "Paris"}));
/// ```
#[derive(Debug)]
pub struct Materializer {
    strategy: OutputStrategy,
    buffer: String,
    pending: String,
    last: Option<Value>,
}

impl Materializer {
    /// A materializer that shapes and checks values with `strategy`.
    pub fn new(strategy: OutputStrategy) -> Self {
        Self {
            strategy,
            buffer: String::new(),
            pending: String::new(),
            last: None,
        }
    }

    /// Appends `delta` and reports whether the visible value changed.
    pub fn feed(&mut self, delta: &str) -> MaterializerEvent {
        self.buffer.push_str(delta);
        self.pending.push_str(delta);

        let parsed = parse_partial_json(&self.buffer);
        let Some(value) = self.strategy.partial(&parsed) else {
            return MaterializerEvent::NoChange;
        };
        if self.last.as_ref() == Some(&value) {
            return MaterializerEvent::NoChange;
        }

        tracing::trace!(
            strategy = self.strategy.name(),
            state = ?parsed.state,
            buffered = self.buffer.len(),
            "partial object"
        );
        self.last = Some(value.clone());
        MaterializerEvent::Partial {
            value,
            text_delta: std::mem::take(&mut self.pending),
        }
    }

    /// Fully validates the accumulated text.
    ///
    /// A truncated buffer is repaired first, so a stream cut short can
    /// still yield a value if the repaired JSON satisfies the schema.
    ///
    /// # Errors
    ///
    /// [`Error::ResponseFormat`] when the buffer is empty or cannot be
    /// parsed, and the strategy's validation error otherwise.
    pub fn finish(&self) -> Result<Value, Error> {
        let parsed = parse_partial_json(&self.buffer);
        match (parsed.state, parsed.value) {
            (ParseState::Successful | ParseState::Repaired, Some(value)) => {
                self.strategy.finalize(&value)
            }
            (ParseState::Empty, _) => Err(Error::ResponseFormat {
                message: "no object generated: the response was empty".into(),
                raw: String::new(),
            }),
            _ => Err(Error::ResponseFormat {
                message: "no object generated: could not parse the response".into(),
                raw: self.buffer.clone(),
            }),
        }
    }

    /// Everything fed so far.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// The last value reported as [`Partial`](MaterializerEvent::Partial).
    pub fn latest(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    /// The strategy this materializer was built with.
    pub fn strategy(&self) -> &OutputStrategy {
        &self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonSchema;
    use serde_json::json;

    fn partials(m: &mut Materializer, chunks: &[&str]) -> Vec<Value> {
        chunks
            .iter()
            .filter_map(|chunk| match m.feed(chunk) {
                MaterializerEvent::Partial { value, .. } => Some(value),
                MaterializerEvent::NoChange => None,
            })
            .collect()
    }

    #[test]
    fn test_whitespace_does_not_reemit() {
        let mut m = Materializer::new(OutputStrategy::NoSchema);
        let got = partials(&mut m, &[r#"{"a": 1"#, " ", "\n", "}"]);
        assert_eq!(got, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_text_delta_accumulates_between_partials() {
        let mut m = Materializer::new(OutputStrategy::NoSchema);
        assert!(matches!(m.feed("{"), MaterializerEvent::Partial { .. }));
        assert_eq!(m.feed(r#""ke"#), MaterializerEvent::NoChange);
        match m.feed(r#"y": 2"#) {
            MaterializerEvent::Partial { value, text_delta } => {
                assert_eq!(value, json!({"key": 2}));
                assert_eq!(text_delta, r#""key": 2"#);
            }
            MaterializerEvent::NoChange => panic!("expected a partial"),
        }
    }

    #[test]
    fn test_fields_never_disappear() {
        let doc = r#"{"title": "Dune", "year": 1965, "tags": ["sf", "classic"]}"#;
        let mut m = Materializer::new(OutputStrategy::NoSchema);
        let mut previous: Option<Value> = None;
        for (i, c) in doc.char_indices() {
            let chunk = &doc[i..i + c.len_utf8()];
            if let MaterializerEvent::Partial { value, .. } = m.feed(chunk) {
                if let (Some(Value::Object(prev)), Value::Object(now)) = (&previous, &value) {
                    for key in prev.keys() {
                        assert!(now.contains_key(key), "{key} vanished at {i}");
                    }
                }
                previous = Some(value);
            }
        }
        assert_eq!(m.finish().unwrap(), serde_json::from_str::<Value>(doc).unwrap());
    }

    #[test]
    fn test_finish_is_repeatable() {
        let mut m = Materializer::new(OutputStrategy::NoSchema);
        m.feed(r#"{"a": [1, 2]}"#);
        assert_eq!(m.finish().unwrap(), m.finish().unwrap());
    }

    #[test]
    fn test_finish_empty_buffer() {
        let m = Materializer::new(OutputStrategy::NoSchema);
        assert!(matches!(m.finish(), Err(Error::ResponseFormat { .. })));
    }

    #[test]
    fn test_finish_unparseable_buffer() {
        let mut m = Materializer::new(OutputStrategy::NoSchema);
        m.feed("not json");
        let err = m.finish().unwrap_err();
        assert!(matches!(err, Error::ResponseFormat { ref raw, .. } if raw == "not json"));
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_final_validation_fails_after_partials() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "properties": { "name": { "type": "string" }, "age": { "type": "integer" } },
            "required": ["name", "age"]
        }));
        let mut m = Materializer::new(OutputStrategy::object(&schema).unwrap());
        let got = partials(&mut m, &[r#"{"name": "#, r#""Bo"#, r#"b"}"#]);
        assert_eq!(got.last(), Some(&json!({"name": "Bob"})));
        assert!(matches!(m.finish(), Err(Error::SchemaValidation { .. })));
    }

    #[cfg(feature = "schema")]
    #[test]
    fn test_array_emits_growing_complete_prefixes() {
        let element = JsonSchema::new(json!({
            "type": "object",
            "properties": { "n": { "type": "integer" } },
            "required": ["n"]
        }));
        let mut m = Materializer::new(OutputStrategy::array(&element).unwrap());
        let got = partials(
            &mut m,
            &[
                r#"{"elements": ["#,
                r#"{"n": 1}"#,
                ", ",
                r#"{"n": 2"#,
                "}",
                "]}",
            ],
        );
        assert_eq!(
            got,
            vec![json!([]), json!([{"n": 1}]), json!([{"n": 1}, {"n": 2}])]
        );
        assert_eq!(m.finish().unwrap(), json!([{"n": 1}, {"n": 2}]));
    }

    #[test]
    fn test_refeeding_final_value_revalidates() {
        let mut first = Materializer::new(OutputStrategy::NoSchema);
        first.feed(r#"{"list": [1, "two", null], "nested": {"x": true}}"#);
        let value = first.finish().unwrap();

        let mut second = Materializer::new(OutputStrategy::NoSchema);
        second.feed(&serde_json::to_string(&value).unwrap());
        assert_eq!(second.finish().unwrap(), value);
    }
}
