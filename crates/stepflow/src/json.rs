//! Parsing of truncated JSON.
//!
//! A model streaming JSON produces text that is almost never valid until
//! the last token. [`parse_partial_json`] first tries a strict parse, and
//! on failure repairs the longest usable prefix with [`fix_json`]:
//! unterminated strings are closed, half-written `true`/`false`/`null`
//! literals are completed, dangling commas, colons, keys and exponent
//! markers are dropped, and open objects and arrays are closed.
//!
//! ```rust
//! use stepflow::json::{ParseState, parse_partial_json};
//!
//! let parsed = parse_partial_json(r#"{"name": "Ali"#);
//! assert_eq!(parsed.state, ParseState::Repaired);
//! assert_eq!(parsed.value.unwrap()["name"], "Ali");
//! ```

use serde_json::Value;

/// How [`parse_partial_json`] obtained its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// The input was empty or whitespace.
    Empty,
    /// The input parsed as-is.
    Successful,
    /// The input parsed after repair.
    Repaired,
    /// Neither the input nor its repair parsed.
    Failed,
}

/// Result of [`parse_partial_json`].
#[derive(Debug, Clone, PartialEq)]
pub struct PartialJson {
    /// The decoded value, if any.
    pub value: Option<Value>,
    /// How the value was obtained.
    pub state: ParseState,
    /// Objects and arrays still open at the end of the input.
    pub open_containers: usize,
    /// The input ended inside an array, after a comma and before the next
    /// element. Commas inside strings do not count.
    pub after_array_comma: bool,
}

/// Parses `text` strictly, falling back to a repaired prefix.
pub fn parse_partial_json(text: &str) -> PartialJson {
    if text.trim().is_empty() {
        return PartialJson {
            value: None,
            state: ParseState::Empty,
            open_containers: 0,
            after_array_comma: false,
        };
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return PartialJson {
            value: Some(value),
            state: ParseState::Successful,
            open_containers: 0,
            after_array_comma: false,
        };
    }

    let fixer = Fixer::run(text);
    let after_array_comma = fixer.top() == State::ArrAfterComma;
    let (repaired, open_containers) = fixer.finish();
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => PartialJson {
            value: Some(value),
            state: ParseState::Repaired,
            open_containers,
            after_array_comma,
        },
        Err(_) => PartialJson {
            value: None,
            state: ParseState::Failed,
            open_containers,
            after_array_comma,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Root,
    Finish,
    InString,
    InStringEscape,
    InStringUnicode(u8),
    InLiteral,
    InNumber,
    ObjStart,
    ObjKey,
    ObjKeyEscape,
    ObjAfterKey,
    ObjBeforeValue,
    ObjAfterValue,
    ObjAfterComma,
    ArrStart,
    ArrAfterValue,
    ArrAfterComma,
}

impl State {
    fn is_container(self) -> bool {
        matches!(
            self,
            Self::ObjStart
                | Self::ObjKey
                | Self::ObjKeyEscape
                | Self::ObjAfterKey
                | Self::ObjBeforeValue
                | Self::ObjAfterValue
                | Self::ObjAfterComma
                | Self::ArrStart
                | Self::ArrAfterValue
                | Self::ArrAfterComma
        )
    }
}

const LITERALS: [&str; 3] = ["true", "false", "null"];

struct Fixer<'a> {
    input: &'a str,
    stack: Vec<State>,
    /// Byte offset one past the last character kept in the output.
    last_valid: usize,
    literal_start: usize,
}

impl<'a> Fixer<'a> {
    fn run(input: &'a str) -> Self {
        let mut fixer = Fixer {
            input,
            stack: vec![State::Root],
            last_valid: 0,
            literal_start: 0,
        };
        for (i, c) in input.char_indices() {
            fixer.step(i, c);
        }
        fixer
    }

    fn top(&self) -> State {
        self.stack.last().copied().unwrap_or(State::Finish)
    }

    fn replace_top(&mut self, state: State) {
        self.stack.pop();
        self.stack.push(state);
    }

    fn keep(&mut self, i: usize, c: char) {
        self.last_valid = i + c.len_utf8();
    }

    /// A value begins at `c`; the enclosing state becomes `after`.
    fn value_start(&mut self, i: usize, c: char, after: State) {
        let inner = match c {
            '"' => State::InString,
            't' | 'f' | 'n' => {
                self.literal_start = i;
                State::InLiteral
            }
            '-' => {
                self.replace_top(after);
                self.stack.push(State::InNumber);
                return;
            }
            '0'..='9' => State::InNumber,
            '{' => State::ObjStart,
            '[' => State::ArrStart,
            _ => return,
        };
        self.keep(i, c);
        self.replace_top(after);
        self.stack.push(inner);
    }

    fn after_object_value(&mut self, i: usize, c: char) {
        match c {
            ',' => self.replace_top(State::ObjAfterComma),
            '}' => {
                self.keep(i, c);
                self.stack.pop();
            }
            _ => {}
        }
    }

    fn after_array_value(&mut self, i: usize, c: char) {
        match c {
            ',' => self.replace_top(State::ArrAfterComma),
            ']' => {
                self.keep(i, c);
                self.stack.pop();
            }
            _ => {}
        }
    }

    /// A scalar ended at `c`; let the enclosing container handle `c`.
    fn end_scalar(&mut self, i: usize, c: char) {
        self.stack.pop();
        match self.top() {
            State::ObjAfterValue => self.after_object_value(i, c),
            State::ArrAfterValue => self.after_array_value(i, c),
            _ => {}
        }
    }

    fn step(&mut self, i: usize, c: char) {
        match self.top() {
            State::Root => self.value_start(i, c, State::Finish),
            State::Finish => {}
            State::ObjStart => match c {
                '"' => self.replace_top(State::ObjKey),
                '}' => {
                    self.keep(i, c);
                    self.stack.pop();
                }
                _ => {}
            },
            State::ObjAfterComma => {
                if c == '"' {
                    self.replace_top(State::ObjKey);
                }
            }
            State::ObjKey => match c {
                '"' => self.replace_top(State::ObjAfterKey),
                '\\' => self.replace_top(State::ObjKeyEscape),
                _ => {}
            },
            State::ObjKeyEscape => self.replace_top(State::ObjKey),
            State::ObjAfterKey => {
                if c == ':' {
                    self.replace_top(State::ObjBeforeValue);
                }
            }
            State::ObjBeforeValue => self.value_start(i, c, State::ObjAfterValue),
            State::ObjAfterValue => self.after_object_value(i, c),
            State::InString => match c {
                '"' => {
                    self.stack.pop();
                    self.keep(i, c);
                }
                '\\' => self.stack.push(State::InStringEscape),
                _ => self.keep(i, c),
            },
            State::InStringEscape => {
                if c == 'u' {
                    self.replace_top(State::InStringUnicode(4));
                } else {
                    self.stack.pop();
                    self.keep(i, c);
                }
            }
            State::InStringUnicode(remaining) => {
                if remaining <= 1 {
                    self.stack.pop();
                    self.keep(i, c);
                } else {
                    self.replace_top(State::InStringUnicode(remaining - 1));
                }
            }
            State::ArrStart => {
                if c == ']' {
                    self.keep(i, c);
                    self.stack.pop();
                } else if c.is_whitespace() {
                    self.keep(i, c);
                } else {
                    self.value_start(i, c, State::ArrAfterValue);
                }
            }
            State::ArrAfterValue => match c {
                ',' | ']' => self.after_array_value(i, c),
                _ => self.keep(i, c),
            },
            State::ArrAfterComma => self.value_start(i, c, State::ArrAfterValue),
            State::InNumber => match c {
                '0'..='9' => self.keep(i, c),
                'e' | 'E' | '-' | '+' | '.' => {}
                _ => self.end_scalar(i, c),
            },
            State::InLiteral => {
                let partial = &self.input[self.literal_start..i + c.len_utf8()];
                if LITERALS.iter().any(|lit| lit.starts_with(partial)) {
                    self.keep(i, c);
                } else {
                    self.end_scalar(i, c);
                }
            }
        }
    }

    fn finish(self) -> (String, usize) {
        let mut out = String::with_capacity(self.last_valid + self.stack.len());
        out.push_str(&self.input[..self.last_valid]);
        let open = self.stack.iter().filter(|s| s.is_container()).count();

        for state in self.stack.iter().rev() {
            match state {
                State::InString => out.push('"'),
                State::ObjStart
                | State::ObjKey
                | State::ObjKeyEscape
                | State::ObjAfterKey
                | State::ObjBeforeValue
                | State::ObjAfterValue
                | State::ObjAfterComma => out.push('}'),
                State::ArrStart | State::ArrAfterValue | State::ArrAfterComma => out.push(']'),
                State::InLiteral => {
                    let partial = &self.input[self.literal_start..];
                    if let Some(lit) = LITERALS.iter().find(|lit| lit.starts_with(partial)) {
                        out.push_str(&lit[partial.len()..]);
                    }
                }
                // Escapes sit above their `InString`, which closes the quote.
                State::Root
                | State::Finish
                | State::InNumber
                | State::InStringEscape
                | State::InStringUnicode(_) => {}
            }
        }
        (out, open)
    }
}

/// Repairs a truncated JSON document.
///
/// Returns the repaired text and the number of objects and arrays that
/// were still open. Text after the last position that can be completed
/// is dropped. The result is valid JSON whenever the input is a prefix
/// of valid JSON.
pub fn fix_json(input: &str) -> (String, usize) {
    Fixer::run(input).finish()
}
