use std::collections::HashMap;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{EngramError, Result};
use crate::types::{ChatId, UserRole};

pub const DEFAULT_IDLE_TIMEOUT_HOURS: u64 = 24;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB hard cap
pub const DEFAULT_MAX_PDF_PAGES: usize = 10;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Top-level config (engram.toml + ENGRAM_* env overrides).
///
/// Read once at startup; read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngramConfig {
    pub completion: CompletionConfig,
    pub embedding: EmbeddingConfig,
    pub session: SessionConfig,
    pub ltm: LtmConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub principals: PrincipalsConfig,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
    #[serde(default)]
    pub commands: CommandsConfig,
    pub system_preamble_path: PathBuf,
    pub prompts: PromptPaths,
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum cumulative token count of history per role.
    /// Both `client` and `godfather` must be present.
    pub role_token_budgets: HashMap<UserRole, u32>,
    #[serde(default = "default_idle_timeout_hours")]
    pub idle_timeout_hours: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Directory with `active/` and `archive/` children.
    pub storage_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtmConfig {
    pub storage_root: PathBuf,
    pub collection_name: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub storage_root: PathBuf,
    #[serde(default = "default_max_media_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PrincipalsConfig {
    /// ChatID granted the `godfather` role. Everyone else is `client`.
    pub privileged_chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// When false, sessions and long-term memory are bypassed entirely and
    /// the pipeline operates as a stateless single-turn relay.
    #[serde(default = "bool_true")]
    pub memory_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            memory_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_reset_command")]
    pub reset: String,
    #[serde(default = "default_remember_command")]
    pub remember: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            reset: default_reset_command(),
            remember: default_remember_command(),
        }
    }
}

/// File paths to prompt templates. Contents are loaded once at startup into
/// [`crate::prompts::PromptSet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPaths {
    pub image_ocr: PathBuf,
    pub classification: PathBuf,
    pub summary: PathBuf,
    pub extraction_contract: PathBuf,
    pub extraction_receipt: PathBuf,
    pub extraction_invoice: PathBuf,
    pub extraction_court_resolution: PathBuf,
}

/// Polling HTTP provider endpoint (green-api wire shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_whatsapp_api_url")]
    pub api_url: String,
    pub instance_id: String,
    pub api_token: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
}

fn bool_true() -> bool {
    true
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_api_base() -> String {
    "https://api.openai.com".to_string()
}
fn default_idle_timeout_hours() -> u64 {
    DEFAULT_IDLE_TIMEOUT_HOURS
}
fn default_cleanup_interval() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_min_similarity() -> f32 {
    DEFAULT_MIN_SIMILARITY
}
fn default_max_media_bytes() -> u64 {
    DEFAULT_MAX_MEDIA_BYTES
}
fn default_max_pdf_pages() -> usize {
    DEFAULT_MAX_PDF_PAGES
}
fn default_reset_command() -> String {
    "/reset".to_string()
}
fn default_remember_command() -> String {
    "/remember".to_string()
}
fn default_whatsapp_api_url() -> String {
    "https://api.green-api.com".to_string()
}
fn default_poll_timeout() -> u64 {
    20
}

impl EngramConfig {
    /// Load config from a TOML file with ENGRAM_* env var overrides.
    pub fn load(path: &str) -> Result<Self> {
        let config: EngramConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ENGRAM_").split("_"))
            .extract()
            .map_err(|e| EngramError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the rest of the system assumes away.
    pub fn validate(&self) -> Result<()> {
        for role in [UserRole::Client, UserRole::Godfather] {
            if !self.session.role_token_budgets.contains_key(&role) {
                return Err(EngramError::Config(format!(
                    "session.role_token_budgets is missing required key '{role}'"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.completion.temperature) {
            return Err(EngramError::Config(format!(
                "completion.temperature must be within 0.0..=1.0, got {}",
                self.completion.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.ltm.min_similarity) {
            return Err(EngramError::Config(format!(
                "ltm.min_similarity must be within 0.0..=1.0, got {}",
                self.ltm.min_similarity
            )));
        }
        if self.media.max_bytes == 0 {
            return Err(EngramError::Config(
                "media.max_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Role for a chat: the configured privileged ChatID is `godfather`,
    /// everyone else is `client`.
    pub fn resolve_role(&self, chat_id: &ChatId) -> UserRole {
        match &self.principals.privileged_chat_id {
            Some(p) if p == chat_id.as_str() => UserRole::Godfather,
            _ => UserRole::Client,
        }
    }

    pub fn budget_for(&self, role: UserRole) -> u32 {
        // validate() guarantees both keys exist
        *self
            .session
            .role_token_budgets
            .get(&role)
            .expect("validated role budget")
    }

    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session.idle_timeout_hours * 3600)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session.cleanup_interval_seconds)
    }
}
