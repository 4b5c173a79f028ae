//! OpenAI-compatible provider adapters for chat, vision and embeddings.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use engram_core::mask::mask_api_key;

use crate::provider::{
    ChatTurn, Completer, CompletionOutcome, CompletionParams, Embedder, ProviderError,
};

/// Provider calls are abandoned after this long; the pipeline then applies
/// its one-retry policy.
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// `base_url` should NOT include a trailing slash.
    pub fn new(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        debug!(key = %mask_api_key(&api_key), base_url = %base_url, "OpenAI provider ready");
        Self {
            client,
            api_key,
            base_url,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        ms: REQUEST_TIMEOUT_MS,
                    }
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }

    async fn chat(&self, body: serde_json::Value) -> Result<CompletionOutcome, ProviderError> {
        let resp = self.post_json("/v1/chat/completions", &body).await?;
        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }
}

#[async_trait]
impl Completer for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        params: &CompletionParams,
    ) -> Result<CompletionOutcome, ProviderError> {
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .map(|t| {
                serde_json::json!({
                    "role": t.role,
                    "content": t.content,
                })
            })
            .collect();

        debug!(model = %params.model, turns = turns.len(), "sending chat request");

        self.chat(serde_json::json!({
            "model": params.model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        }))
        .await
    }

    async fn complete_vision(
        &self,
        prompt: &str,
        image: &[u8],
        mime: &str,
        model: &str,
    ) -> Result<String, ProviderError> {
        let b64 = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{mime};base64,{b64}");

        debug!(model, mime, bytes = image.len(), "sending vision request");

        let outcome = self
            .chat(serde_json::json!({
                "model": model,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ],
                }],
            }))
            .await?;
        Ok(outcome.text)
    }
}

#[async_trait]
impl Embedder for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError> {
        debug!(model, chars = text.len(), "sending embedding request");

        let resp = self
            .post_json(
                "/v1/embeddings",
                &serde_json::json!({
                    "model": model,
                    "input": text,
                }),
            )
            .await?;

        let api_resp: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Parse("embedding response had no data".to_string()))
    }
}

fn parse_response(resp: ApiResponse) -> CompletionOutcome {
    let choice = resp.choices.into_iter().next();
    let text = choice
        .as_ref()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or("")
        .to_string();
    let finish_reason = choice.and_then(|c| c.finish_reason).unwrap_or_default();
    let tokens_used = resp
        .usage
        .map(|u| u.prompt_tokens + u.completion_tokens)
        .unwrap_or(0);

    CompletionOutcome {
        text,
        tokens_used,
        finish_reason,
    }
}

// OpenAI API response types

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}
