//! One inbound message, end to end.
//!
//! Steps: command check → user ingest → budgeted history → memory recall →
//! prompt assembly → completion (one retry on transient) → assistant ingest
//! → outbound truncation. The chat lock is held for the whole turn, so
//! appends for one chat are totally ordered and a lifecycle transfer never
//! interleaves with a turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use engram_core::prompts::PromptSet;
use engram_core::{ChatId, MessageRole, UserRole};
use engram_lifecycle::LifecycleManager;
use engram_llm::{with_retry, ChatTurn, Completer, CompletionParams, ProviderError};
use engram_media::{DocumentArtifact, ExtractionQuality};
use engram_memory::{
    MemoryAttributes, MemoryError, MemoryScope, MemorySource, MemoryStore, RecalledMemory,
    GLOBAL_OWNER,
};
use engram_sessions::{SessionError, SessionStore};

use crate::commands;
use crate::reply::{self, friendly_error, truncate_reply};

/// Everything the transport hands over for one inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender_id: String,
    pub role: UserRole,
    pub text: String,
    pub document: Option<DocumentArtifact>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("session store: {0}")]
    Session(#[from] SessionError),

    #[error("memory store: {0}")]
    Memory(#[from] MemoryError),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub completion: CompletionParams,
    pub top_k: usize,
    pub min_similarity: f32,
    pub memory_enabled: bool,
    pub reset_command: String,
    pub remember_command: String,
}

pub struct Pipeline {
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) memory: Arc<MemoryStore>,
    pub(crate) completer: Arc<dyn Completer>,
    pub(crate) lifecycle: Arc<LifecycleManager>,
    pub(crate) prompts: Arc<PromptSet>,
    pub(crate) settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        sessions: Arc<SessionStore>,
        memory: Arc<MemoryStore>,
        completer: Arc<dyn Completer>,
        lifecycle: Arc<LifecycleManager>,
        prompts: Arc<PromptSet>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sessions,
            memory,
            completer,
            lifecycle,
            prompts,
            settings,
        }
    }

    /// Handle one inbound message to completion. Never panics outward and
    /// never returns an internal error; failures become the friendly
    /// strings in [`crate::reply`], logged with the correlation id.
    pub async fn handle_inbound(&self, msg: InboundMessage) -> String {
        let correlation = Uuid::new_v4();
        debug!(
            correlation = %correlation,
            chat = %msg.chat_id.fs_key(),
            role = %msg.role,
            has_document = msg.document.is_some(),
            "inbound message"
        );

        // 1. command check; commands short-circuit the whole pipeline
        if let Some(command_reply) = commands::handle_command(self, &msg, correlation).await {
            return command_reply;
        }

        if !self.settings.memory_enabled {
            return match self.stateless_turn(&msg).await {
                Ok(text) => truncate_reply(text),
                Err(e) => {
                    warn!(correlation = %correlation, error = %e, "stateless turn failed");
                    friendly_error(&e).to_string()
                }
            };
        }

        match self.stateful_turn(&msg, correlation).await {
            Ok(text) => text,
            Err(e) => {
                warn!(correlation = %correlation, error = %e, "pipeline turn failed");
                friendly_error(&e).to_string()
            }
        }
    }

    async fn stateful_turn(
        &self,
        msg: &InboundMessage,
        correlation: Uuid,
    ) -> Result<String, PipelineError> {
        let lock = self.sessions.lock(&msg.chat_id);
        let _guard = lock.lock().await;

        let (content, metadata) = compose_user_content(msg, correlation);

        // 2. user message ingest; happens even for unreadable documents so
        // the session reflects what the user sent
        let message_id =
            self.sessions
                .append(&msg.chat_id, MessageRole::User, &content, msg.role, metadata)?;

        // unreadable attachment: explain the limitation instead of completing
        if let Some(doc) = &msg.document {
            if matches!(doc.quality, ExtractionQuality::Poor | ExtractionQuality::Failed) {
                let limitation = reply::ERR_NO_READABLE_TEXT.to_string();
                self.sessions.append(
                    &msg.chat_id,
                    MessageRole::Assistant,
                    &limitation,
                    msg.role,
                    BTreeMap::new(),
                )?;
                return Ok(limitation);
            }
        }

        // 3. budgeted history (includes the turn just appended)
        let history = self.sessions.history(&msg.chat_id, msg.role);

        // 4. memory recall; degrades to empty on failure
        let memories = self.recall_memories(&msg.chat_id, msg.role, &msg.text).await;

        // 5. prompt assembly
        let mut turns: Vec<ChatTurn> = Vec::with_capacity(history.len() + 2);
        turns.push(ChatTurn::new(
            MessageRole::System,
            self.prompts.system_preamble.clone(),
        ));
        if !memories.is_empty() {
            let lines: Vec<String> = memories
                .iter()
                .map(|m| format!("- {}", m.record.text))
                .collect();
            turns.push(ChatTurn::new(
                MessageRole::System,
                format!("Relevant memories:\n{}", lines.join("\n")),
            ));
        }
        turns.extend(
            history
                .into_iter()
                .map(|h| ChatTurn::new(h.role, h.content)),
        );

        // 6. completion, one retry on transient failures only
        let outcome = with_retry("complete", || {
            self.completer.complete(&turns, &self.settings.completion)
        })
        .await?;

        // 7. assistant ingest under the same lock
        self.sessions.append(
            &msg.chat_id,
            MessageRole::Assistant,
            &outcome.text,
            msg.role,
            BTreeMap::new(),
        )?;

        // side-effect: durable facts from an ingested document
        if let Some(doc) = &msg.document {
            self.store_document_facts(&msg.chat_id, msg.role, doc).await;
        }

        info!(
            correlation = %correlation,
            message_id = %message_id,
            chat = %msg.chat_id.fs_key(),
            tokens_used = outcome.tokens_used,
            memories = memories.len(),
            "turn complete"
        );

        // 8. outbound truncation
        Ok(truncate_reply(outcome.text))
    }

    /// With memory disabled the pipeline is a single-turn relay: no session
    /// writes, no recall, no lifecycle. Attached documents still contribute
    /// their extracted content to the turn.
    async fn stateless_turn(&self, msg: &InboundMessage) -> Result<String, PipelineError> {
        let user_content = match &msg.document {
            Some(doc) if msg.text.trim().is_empty() => doc.session_summary(),
            Some(doc) => format!("{}\n\n{}", msg.text, doc.session_summary()),
            None => msg.text.clone(),
        };
        let turns = [
            ChatTurn::new(MessageRole::System, self.prompts.system_preamble.clone()),
            ChatTurn::new(MessageRole::User, user_content),
        ];
        let outcome = with_retry("complete", || {
            self.completer.complete(&turns, &self.settings.completion)
        })
        .await?;
        Ok(outcome.text)
    }

    /// Recall for the chat owner; privileged callers also union the global
    /// owner's records. Results re-ranked together and capped at `top_k`.
    async fn recall_memories(
        &self,
        chat_id: &ChatId,
        role: UserRole,
        query: &str,
    ) -> Vec<RecalledMemory> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let k = self.settings.top_k;
        let min = self.settings.min_similarity;

        let mut hits = self
            .memory
            .recall(query, chat_id.as_str(), None, k, min)
            .await;

        if role.is_privileged() && chat_id.as_str() != GLOBAL_OWNER {
            let global = self.memory.recall(query, GLOBAL_OWNER, None, k, min).await;
            for hit in global {
                if !hits
                    .iter()
                    .any(|h| h.record.memory_id == hit.record.memory_id)
                {
                    hits.push(hit);
                }
            }
            // same comparator as the store: similarity first, ties go to the
            // more recently created record
            hits.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.record.created_at().cmp(&a.record.created_at()))
            });
            hits.truncate(k);
        }
        hits
    }

    /// Contact/transaction facts from a document go into long-term memory.
    /// Failures are logged, never fatal to the turn.
    async fn store_document_facts(&self, chat_id: &ChatId, role: UserRole, doc: &DocumentArtifact) {
        let owner = if role.is_privileged() {
            GLOBAL_OWNER
        } else {
            chat_id.as_str()
        };
        for fact in doc.fact_lines() {
            let attrs = MemoryAttributes::new(owner, MemoryScope::Chat, MemorySource::Document);
            if let Err(e) = self.memory.store(&fact, attrs.into_map()).await {
                warn!(error = %e, "failed to store document fact");
            }
        }
    }
}

/// Session content for the user turn: the text plus, when a document rode
/// along, its serialised summary block. Metadata records the sender, the
/// correlation id, and the retained media path.
fn compose_user_content(
    msg: &InboundMessage,
    correlation: Uuid,
) -> (String, BTreeMap<String, String>) {
    let mut metadata = BTreeMap::new();
    metadata.insert("sender".to_string(), msg.sender_id.clone());
    metadata.insert("correlation".to_string(), correlation.to_string());

    let content = match &msg.document {
        Some(doc) => {
            metadata.insert(
                "media".to_string(),
                doc.storage_path.to_string_lossy().into_owned(),
            );
            if msg.text.trim().is_empty() {
                doc.session_summary()
            } else {
                format!("{}\n\n{}", msg.text, doc.session_summary())
            }
        }
        None => msg.text.clone(),
    };
    (content, metadata)
}
