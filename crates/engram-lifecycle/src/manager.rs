//! Session lifecycle: idle detection, summarisation into long-term memory,
//! and archival.
//!
//! A background worker wakes every cleanup interval and walks the active
//! sessions. Each idle session is summarised by the completer into durable
//! facts (one per line), every line becomes a memory record, and the
//! descriptor moves into the archive date bucket. Any failure leaves the
//! session active with `last_active_at` unchanged, so the next tick retries.
//! Contested chats are skipped with `try_lock`, so a slow chat never blocks
//! the sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use engram_core::{ChatId, MessageRole};
use engram_llm::{with_retry, ChatTurn, Completer, CompletionParams};
use engram_memory::{MemoryAttributes, MemoryError, MemoryScope, MemorySource, MemoryStore};
use engram_memory::GLOBAL_OWNER;
use engram_sessions::{SessionError, SessionStore};

/// Prompt handed to the completer when folding a session into memory.
const SUMMARISE_PROMPT: &str = "Summarise the following exchange as a list of \
durable facts and preferences about the user, one per line";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("summarisation failed: {0}")]
    Summarise(#[from] engram_llm::ProviderError),

    #[error("memory store failed: {0}")]
    Store(#[from] MemoryError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub idle_timeout: Duration,
    pub cleanup_interval: Duration,
    pub completion: CompletionParams,
}

pub struct LifecycleManager {
    sessions: Arc<SessionStore>,
    memory: Arc<MemoryStore>,
    completer: Arc<dyn Completer>,
    settings: LifecycleSettings,
}

impl LifecycleManager {
    pub fn new(
        sessions: Arc<SessionStore>,
        memory: Arc<MemoryStore>,
        completer: Arc<dyn Completer>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            sessions,
            memory,
            completer,
            settings,
        }
    }

    /// Background loop. Ticks every cleanup interval until `shutdown`
    /// broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.cleanup_interval.as_secs(),
            idle_timeout_secs = self.settings.idle_timeout.as_secs(),
            "lifecycle manager started"
        );
        let mut interval = tokio::time::interval(self.settings.cleanup_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("lifecycle manager shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One sweep over the active sessions.
    pub async fn tick(&self) {
        for (chat_id, session_id) in self.sessions.all_sessions() {
            if !self.sessions.is_expired(&chat_id, self.settings.idle_timeout) {
                continue;
            }
            let lock = self.sessions.lock(&chat_id);
            let guard = match lock.try_lock() {
                Ok(g) => g,
                Err(_) => {
                    // a pipeline turn owns the chat right now; next tick retries
                    debug!(chat = %chat_id.fs_key(), "chat busy, transfer deferred");
                    continue;
                }
            };
            match self.transfer_locked(&chat_id).await {
                Ok(stored) => {
                    info!(
                        chat = %chat_id.fs_key(),
                        session = %session_id,
                        memories = stored,
                        "idle session transferred"
                    );
                }
                Err(e) => {
                    warn!(
                        chat = %chat_id.fs_key(),
                        session = %session_id,
                        error = %e,
                        "transfer failed, retrying next tick"
                    );
                }
            }
            drop(guard);
        }
    }

    /// Transfer every session already idle at process start. Must complete
    /// before the transport begins serving traffic (orphan recovery).
    pub async fn recover_orphans(&self) -> usize {
        let orphans = self.sessions.startup_scan(self.settings.idle_timeout);
        if orphans.is_empty() {
            return 0;
        }
        info!(count = orphans.len(), "recovering orphaned sessions");
        let mut recovered = 0;
        for (chat_id, session_id) in orphans {
            let lock = self.sessions.lock(&chat_id);
            let _guard = lock.lock().await;
            match self.transfer_locked(&chat_id).await {
                Ok(_) => recovered += 1,
                Err(e) => {
                    warn!(chat = %chat_id.fs_key(), session = %session_id, error = %e,
                        "orphan transfer failed, background tick will retry");
                }
            }
        }
        recovered
    }

    /// Summarise, store, archive. The caller must hold the chat lock.
    ///
    /// Partial stores are not rolled back: a retried transfer may produce
    /// duplicate lines, and recall's recency tie-break surfaces the freshest.
    pub async fn transfer_locked(&self, chat_id: &ChatId) -> Result<usize, LifecycleError> {
        let session = match self.sessions.snapshot(chat_id) {
            Some(s) => s,
            None => return Ok(0),
        };

        let mut stored = 0;
        if !session.messages.is_empty() {
            let transcript: String = session
                .messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n\n");

            let turns = [
                ChatTurn::new(MessageRole::System, SUMMARISE_PROMPT),
                ChatTurn::new(MessageRole::User, transcript),
            ];
            let summary = with_retry("summarise", || {
                self.completer.complete(&turns, &self.settings.completion)
            })
            .await?;

            let owner = if session.user_role.is_privileged() {
                GLOBAL_OWNER
            } else {
                chat_id.as_str()
            };

            for line in summary.text.lines() {
                let fact = line.trim().trim_start_matches(['-', '*', '\u{2022}']).trim();
                if fact.is_empty() {
                    continue;
                }
                let attrs = MemoryAttributes::new(
                    owner,
                    MemoryScope::Chat,
                    MemorySource::SessionTransfer,
                );
                self.store_with_retry(fact, attrs).await?;
                stored += 1;
            }
        }

        self.sessions.archive(chat_id, Utc::now().date_naive())?;
        Ok(stored)
    }

    /// One extra attempt on top of the store's own embedding retry; covers
    /// journal write failures as well.
    async fn store_with_retry(
        &self,
        text: &str,
        attrs: MemoryAttributes,
    ) -> Result<(), MemoryError> {
        match self.memory.store(text, attrs.clone().into_map()).await {
            Ok(_) => Ok(()),
            Err(first) => {
                warn!(error = %first, "memory store failed, retrying once");
                self.memory.store(text, attrs.into_map()).await.map(|_| ())
            }
        }
    }
}
