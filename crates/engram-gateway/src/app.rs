//! Wiring: construct the stores, providers and loops from configuration.

use std::sync::Arc;

use engram_core::prompts::PromptSet;
use engram_core::tokens::TokenCounter;
use engram_core::EngramConfig;
use engram_lifecycle::{LifecycleManager, LifecycleSettings};
use engram_llm::openai::OpenAiProvider;
use engram_llm::{Completer, CompletionParams, Embedder};
use engram_media::ingest::{MediaIngestor, MediaSettings};
use engram_memory::MemoryStore;
use engram_pipeline::{Pipeline, PipelineSettings};
use engram_sessions::SessionStore;
use engram_whatsapp::{PollLoop, WhatsAppClient};

pub struct App {
    pub lifecycle: Arc<LifecycleManager>,
    pub poll: Arc<PollLoop>,
}

impl App {
    /// Build the whole object graph. Failures here mean a dependency (disk
    /// state, vector index) is unavailable at startup.
    pub fn build(config: &EngramConfig, prompts: Arc<PromptSet>) -> anyhow::Result<App> {
        let provider = Arc::new(OpenAiProvider::new(
            config.completion.api_key.clone(),
            config.completion.api_base.clone(),
        ));
        let completer: Arc<dyn Completer> = provider.clone();
        let embedder: Arc<dyn Embedder> = provider;

        let counter = TokenCounter::new(&config.completion.model);
        let sessions = Arc::new(SessionStore::open(
            &config.session.storage_root,
            config.session.role_token_budgets.clone(),
            counter,
        )?);
        let memory = Arc::new(MemoryStore::open(
            &config.ltm.storage_root,
            &config.ltm.collection_name,
            Arc::clone(&embedder),
            &config.embedding.model,
        )?);

        let params = CompletionParams {
            model: config.completion.model.clone(),
            max_tokens: config.completion.max_tokens,
            temperature: config.completion.temperature,
        };

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&sessions),
            Arc::clone(&memory),
            Arc::clone(&completer),
            LifecycleSettings {
                idle_timeout: config.idle_timeout(),
                cleanup_interval: config.cleanup_interval(),
                completion: params.clone(),
            },
        ));

        let pipeline = Arc::new(Pipeline::new(
            sessions,
            memory,
            Arc::clone(&completer),
            Arc::clone(&lifecycle),
            Arc::clone(&prompts),
            PipelineSettings {
                completion: params.clone(),
                top_k: config.ltm.top_k,
                min_similarity: config.ltm.min_similarity,
                memory_enabled: config.feature_flags.memory_enabled,
                reset_command: config.commands.reset.clone(),
                remember_command: config.commands.remember.clone(),
            },
        ));

        let ingestor = Arc::new(MediaIngestor::new(
            completer,
            prompts,
            MediaSettings {
                storage_root: config.media.storage_root.clone(),
                max_bytes: config.media.max_bytes,
                max_pdf_pages: config.media.max_pdf_pages,
                completion: params.clone(),
                vision_model: config.completion.model.clone(),
            },
        ));

        let client = Arc::new(WhatsAppClient::new(
            config.whatsapp.api_url.clone(),
            config.whatsapp.instance_id.clone(),
            config.whatsapp.api_token.clone(),
            config.whatsapp.poll_timeout_seconds,
        ));

        let poll = Arc::new(PollLoop::new(
            client,
            pipeline,
            ingestor,
            config.principals.privileged_chat_id.clone(),
        ));

        Ok(App { lifecycle, poll })
    }
}
