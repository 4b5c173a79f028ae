//! Token estimation for budget accounting.
//!
//! Uses the model-specific `tiktoken` encoding when one is known for the
//! configured completion model; otherwise a conservative byte/word heuristic.
//! Counting never fails: an unknown model just means the heuristic is used,
//! and that fact is logged once at `debug!` when the counter is built.

use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};
use tracing::debug;

/// Deterministic token estimator for a single model.
///
/// Construct once at startup and share; [`TokenCounter::count`] is pure.
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
}

impl TokenCounter {
    pub fn new(model: &str) -> Self {
        let bpe = encoding_for_model(model);
        if bpe.is_none() {
            debug!(model, "no tiktoken encoding for model, using heuristic");
        }
        Self { bpe }
    }

    /// A counter that always uses the fallback heuristic. Test convenience.
    pub fn heuristic() -> Self {
        Self { bpe: None }
    }

    /// Estimate the token count of `text`. Never fails.
    pub fn count(&self, text: &str) -> u32 {
        let n = match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => fallback_estimate(text),
        };
        n as u32
    }
}

/// Pick the encoding family by model name. `None` means the heuristic.
fn encoding_for_model(model: &str) -> Option<CoreBPE> {
    if model.starts_with("gpt-4o") || model.starts_with("o1") || model.starts_with("o3") {
        o200k_base().ok()
    } else if model.starts_with("gpt-4")
        || model.starts_with("gpt-3.5")
        || model.starts_with("text-embedding")
    {
        cl100k_base().ok()
    } else {
        None
    }
}

/// Conservative estimate: `ceil(len(bytes)/4) + word_count`.
///
/// Overestimates on purpose so budget pruning errs on the small side.
pub fn fallback_estimate(text: &str) -> usize {
    text.len().div_ceil(4) + text.split_whitespace().count()
}
