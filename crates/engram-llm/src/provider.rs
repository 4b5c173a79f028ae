use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use engram_core::MessageRole;

/// A single turn in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-request completion knobs, taken from configuration.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Result of a completed (non-streaming) chat request.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub text: String,
    pub tokens_used: u32,
    pub finish_reason: String,
}

/// Chat-completion capability, including the vision variant used for OCR.
/// Concrete providers are injected at construction.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        turns: &[ChatTurn],
        params: &CompletionParams,
    ) -> Result<CompletionOutcome, ProviderError>;

    /// Send a text prompt plus one image, returning the model's text reply.
    async fn complete_vision(
        &self,
        prompt: &str,
        image: &[u8],
        mime: &str,
        model: &str,
    ) -> Result<String, ProviderError>;
}

/// Text-embedding capability. The vector length is fixed by the model and
/// recorded at collection creation time.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Transient failures get exactly one retry; everything else none.
    /// 429 is deliberately not transient: retrying into a rate limit
    /// makes it worse.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Unavailable(_) => true,
            Self::RateLimited { .. } | Self::Parse(_) => false,
        }
    }
}
