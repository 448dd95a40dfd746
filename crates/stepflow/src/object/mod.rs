//! Structured output: validated values instead of free text.
//!
//! An [`OutputStrategy`] names the shape to produce (an object, an array
//! of elements, one of a set of strings, or any JSON) and owns the
//! validator for it. [`generate_object`] makes a blocking call and
//! validates the answer, feeding failures back to the model for up to
//! `max_attempts` tries. [`stream_object`] exposes partial values while
//! the model is still writing them.
//!
//! # Streaming
//!
//! The [`Materializer`] behind [`stream_object`] keeps the JSON text
//! received so far. Every delta it repairs the buffer (closing strings
//! and brackets), validates the result in partial mode and reports it
//! only if it differs from the previous one. In array mode only complete
//! elements are shown: an element counts as complete once the next one
//! starts or the array closes.
//!
//! ```rust
//! use serde_json::json;
//! use stepflow::JsonSchema;
//! use stepflow::object::{Materializer, MaterializerEvent, OutputStrategy};
//!
//! let element = JsonSchema::new(json!({ "type": "integer" }));
//! let mut m = Materializer::new(OutputStrategy::array(&element).unwrap());
//! m.feed(r#"{"elements": [1, 2"#);
//! assert_eq!(m.latest(), Some(&json!([1])));
//! m.feed("]}");
//! assert_eq!(m.finish().unwrap(), json!([1, 2]));
//! ```

mod config;
mod generate;
mod materializer;
mod strategy;
mod stream;

pub use config::{GenerateObjectConfig, JSON_TOOL_NAME, ObjectMode};
pub use generate::{ObjectResult, generate_object};
pub use materializer::{Materializer, MaterializerEvent};
pub use strategy::OutputStrategy;
pub use stream::{ObjectStream, ObjectStreamPart, stream_object};
