//! User-visible reply strings and outbound constraints.
//!
//! Internals are logged with full context; the user only ever sees one of
//! these strings when something breaks.

use crate::pipeline::PipelineError;
use engram_llm::ProviderError;

/// Single-message protocol constraint on the outbound side.
pub const MAX_REPLY_CHARS: usize = 4000;

pub const ERR_TRANSIENT: &str =
    "I'm having trouble reaching my service right now. Please try again later.";
pub const ERR_PERMANENT: &str = "I'm not configured correctly. Please contact support.";
pub const ERR_RATE_LIMITED: &str =
    "I'm receiving too many messages right now. Please wait a moment.";
pub const ERR_GENERIC: &str = "Something went wrong. Please try again.";
pub const ERR_UNSUPPORTED_MEDIA: &str =
    "I can only process images (JPG, PNG), PDFs (≤10 pages), and DOCX files up to 10 MB.";
pub const ERR_NO_READABLE_TEXT: &str =
    "I couldn't find readable text in that document. A clearer scan or photo usually helps.";

pub const RESET_DONE: &str =
    "Done. I've archived our conversation and will remember the important parts.";
pub const RESET_NOTHING: &str = "There's no active conversation to reset.";
pub const REMEMBER_DONE: &str = "Got it, I'll remember that.";
pub const REMEMBER_FAILED: &str = "I couldn't save that right now. Please try again later.";
pub const MEMORY_DISABLED: &str = "Memory features are currently disabled.";

/// Map an internal failure to its friendly string.
pub fn friendly_error(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::Provider(ProviderError::RateLimited { .. }) => ERR_RATE_LIMITED,
        PipelineError::Provider(ProviderError::Api { status, .. }) if *status < 500 => {
            ERR_PERMANENT
        }
        PipelineError::Provider(_) => ERR_TRANSIENT,
        PipelineError::Session(_) | PipelineError::Memory(_) => ERR_GENERIC,
    }
}

/// Enforce the outbound length cap, marking truncation with an ellipsis.
pub fn truncate_reply(text: String) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(MAX_REPLY_CHARS - 1).collect();
    out.push('\u{2026}');
    out
}
