//! Token usage accounting.
//!
//! Every model call reports a [`Usage`]. Multi-step calls sum the
//! per-step records field by field, so a running total never decreases.
//!
//! # Invariant
//!
//! Records built with [`Usage::new`] satisfy
//! `total_tokens == prompt_tokens + completion_tokens`. Addition keeps the
//! invariant because it sums every field, including the total.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token counts for one model call, or a sum over several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt (messages, system text, tool declarations).
    pub prompt_tokens: u64,
    /// Tokens the model generated.
    pub completion_tokens: u64,
    /// Prompt plus completion tokens.
    pub total_tokens: u64,
}

impl Usage {
    /// Builds a record and derives the total.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

impl Add for Usage {
    type Output = Self;

    /// Adds two records field by field with saturating arithmetic.
    fn add(mut self, rhs: Self) -> Self {
        self += &rhs;
        self
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self += &rhs;
    }
}

impl AddAssign<&Usage> for Usage {
    fn add_assign(&mut self, rhs: &Self) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(rhs.total_tokens);
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_new_derives_total() {
        let u = Usage::new(100, 50);
        assert_eq!(u.total_tokens, 150);
    }

    #[test]
    fn test_usage_add_is_fieldwise() {
        let sum = Usage::new(100, 50) + Usage::new(20, 5);
        assert_eq!(sum, Usage::new(120, 55));
    }

    #[test]
    fn test_usage_add_assign_ref() {
        let mut total = Usage::default();
        let step = Usage::new(10, 3);
        total += &step;
        total += &step;
        assert_eq!(total.prompt_tokens, 20);
        assert_eq!(total.completion_tokens, 6);
        assert_eq!(total.total_tokens, 26);
    }

    #[test]
    fn test_usage_add_saturates() {
        let near_max = Usage::new(u64::MAX - 1, 0);
        let sum = near_max + Usage::new(10, 0);
        assert_eq!(sum.prompt_tokens, u64::MAX);
    }

    #[test]
    fn test_usage_sum_never_decreases() {
        let steps = [Usage::new(5, 1), Usage::default(), Usage::new(7, 2)];
        let mut running = Usage::default();
        for step in steps {
            let before = running;
            running += step;
            assert!(running.total_tokens >= before.total_tokens);
        }
        assert_eq!(running, steps.into_iter().sum());
    }

    #[test]
    fn test_usage_serde_field_names() {
        let json = serde_json::to_value(Usage::new(1, 2)).unwrap();
        assert_eq!(json["prompt_tokens"], 1);
        assert_eq!(json["completion_tokens"], 2);
        assert_eq!(json["total_tokens"], 3);
    }
}
