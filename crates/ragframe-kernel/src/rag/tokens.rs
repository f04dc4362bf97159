//! Token estimation
//!
//! Estimators are pure and deterministic. They need not agree with a backend's
//! real tokenizer, but must be monotonic non-decreasing in input length so
//! budgeting decisions never flip when text grows.

/// Pluggable token counting.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Character-based token estimator.
///
/// `token_count = ceil(char_count / chars_per_token)`, counted in Unicode
/// scalar values rather than bytes. Default ratio is 4.
#[derive(Debug, Clone)]
pub struct CharBasedEstimator {
    chars_per_token: usize,
}

impl CharBasedEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharBasedEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for CharBasedEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}
