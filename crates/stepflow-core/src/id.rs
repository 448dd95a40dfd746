//! Identifier generation.
//!
//! Orchestration code tags every tool execution with an id so concurrent
//! results can be matched back to their calls. Production code uses
//! [`RandomIdGenerator`]; tests swap in [`SequentialIdGenerator`] for
//! stable ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::distr::Alphanumeric;

/// Produces unique string identifiers.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Returns a fresh identifier.
    fn generate(&self) -> String;
}

/// `prefix` + `-` + random alphanumeric characters.
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    prefix: String,
    size: usize,
}

impl RandomIdGenerator {
    /// Creates a generator with the given prefix and random-part length.
    pub fn new(prefix: impl Into<String>, size: usize) -> Self {
        Self {
            prefix: prefix.into(),
            size,
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new("id", 16)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(self.size)
            .map(char::from)
            .collect();
        if self.prefix.is_empty() {
            suffix
        } else {
            format!("{}-{suffix}", self.prefix)
        }
    }
}

/// `prefix` + `-` + a counter starting at zero.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Creates a generator whose first id is `{prefix}-0`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}
