//! Per-chat session persistence.
//!
//! One active session per ChatID, each persisted as a pretty-printed JSON
//! descriptor under `active/<chat_fs_key>/session.json`. Every mutation is
//! written atomically (temp file + rename), so a reader never observes a
//! half-written descriptor and a crash loses at most the in-flight append.
//! Finished sessions move to `archive/YYYY-MM-DD/<session_id>/session.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use engram_core::tokens::TokenCounter;
use engram_core::{ChatId, MessageRole, UserRole};

use crate::error::{Result, SessionError};
use crate::types::{HistoryEntry, Session, SessionState, StoredMessage};

const DESCRIPTOR_FILE: &str = "session.json";
const ACTIVE_DIR: &str = "active";
const ARCHIVE_DIR: &str = "archive";

pub struct SessionStore {
    root: PathBuf,
    budgets: HashMap<UserRole, u32>,
    counter: TokenCounter,
    /// Active sessions, keyed by the raw chat id.
    sessions: DashMap<String, Session>,
    /// Per-chat locks. Pipeline turns and lifecycle transfers for the same
    /// chat serialise here; different chats run in parallel.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Open the store, scanning `active/` for persisted sessions.
    ///
    /// When two active descriptors exist for the same ChatID (crash
    /// mid-rename), the one with the greatest `last_active_at` wins and the
    /// others are archived immediately.
    pub fn open(
        root: &Path,
        budgets: HashMap<UserRole, u32>,
        counter: TokenCounter,
    ) -> Result<Self> {
        std::fs::create_dir_all(root.join(ACTIVE_DIR))?;
        std::fs::create_dir_all(root.join(ARCHIVE_DIR))?;

        let mut found: Vec<(PathBuf, Session)> = Vec::new();
        for entry in std::fs::read_dir(root.join(ACTIVE_DIR))? {
            let dir = entry?.path();
            if !dir.is_dir() {
                continue;
            }
            let file = dir.join(DESCRIPTOR_FILE);
            if !file.exists() {
                continue;
            }
            match load_descriptor(&file) {
                Ok(session) => found.push((dir, session)),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping unreadable session descriptor");
                }
            }
        }

        let mut by_chat: HashMap<String, (PathBuf, Session)> = HashMap::new();
        for (dir, session) in found {
            let key = session.chat_id.to_string();
            match by_chat.remove(&key) {
                None => {
                    by_chat.insert(key, (dir, session));
                }
                Some((other_dir, other)) => {
                    let ((win_dir, winner), (lose_dir, loser)) =
                        if session.last_active_at >= other.last_active_at {
                            ((dir, session), (other_dir, other))
                        } else {
                            ((other_dir, other), (dir, session))
                        };
                    warn!(
                        chat = %winner.chat_id,
                        kept = %winner.session_id,
                        archived = %loser.session_id,
                        "duplicate active descriptors for chat, newest wins"
                    );
                    if let Err(e) = archive_descriptor(root, &lose_dir, &loser) {
                        warn!(error = %e, "failed to archive duplicate descriptor");
                    }
                    by_chat.insert(key, (win_dir, winner));
                }
            }
        }

        let store = Self {
            root: root.to_path_buf(),
            budgets,
            counter,
            sessions: DashMap::new(),
            locks: DashMap::new(),
        };

        for (key, (dir, session)) in by_chat {
            // normalise legacy locations to the canonical per-chat directory
            let canonical = store.chat_dir(&session.chat_id);
            if dir != canonical {
                store.persist(&session)?;
                let _ = std::fs::remove_file(dir.join(DESCRIPTOR_FILE));
                let _ = std::fs::remove_dir(&dir);
            }
            store.sessions.insert(key, session);
        }

        info!(active = store.sessions.len(), "session store opened");
        Ok(store)
    }

    /// The lock guarding all mutations for one chat.
    pub fn lock(&self, chat_id: &ChatId) -> Arc<Mutex<()>> {
        self.locks
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn budget_for(&self, role: UserRole) -> u32 {
        self.budgets.get(&role).copied().unwrap_or(0)
    }

    /// Append a message, creating the session on first contact.
    ///
    /// `token_count` is computed here, once; `last_active_at` only moves
    /// forward. The descriptor on disk reflects the new state before this
    /// returns.
    pub fn append(
        &self,
        chat_id: &ChatId,
        role: MessageRole,
        content: &str,
        user_role: UserRole,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let token_count = self.counter.count(content);
        let key = chat_id.to_string();

        let mut entry = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(chat_id.clone(), user_role, now));

        let message = StoredMessage {
            message_id: Uuid::new_v4(),
            role,
            content: content.to_string(),
            timestamp: now,
            token_count,
            metadata,
        };
        let message_id = message.message_id;

        let session = entry.value_mut();
        session.messages.push(message);
        if now > session.last_active_at {
            session.last_active_at = now;
        }

        let persisted = self.persist(session);
        let rollback_to_empty = if persisted.is_err() {
            session.messages.pop();
            session.messages.is_empty()
        } else {
            false
        };
        drop(entry);
        if rollback_to_empty {
            self.sessions.remove(&key);
        }

        persisted?;
        debug!(chat = %chat_id.fs_key(), %message_id, tokens = token_count, "message appended");
        Ok(message_id)
    }

    /// The suffix of the log whose cumulative token count fits the role
    /// budget, oldest trimmed first, chronological order preserved.
    ///
    /// The newest message is always included, even when it alone exceeds the
    /// budget; the current user turn must never be starved out.
    pub fn history(&self, chat_id: &ChatId, user_role: UserRole) -> Vec<HistoryEntry> {
        let budget = u64::from(self.budget_for(user_role));
        let session = match self.sessions.get(chat_id.as_str()) {
            Some(s) => s,
            None => return Vec::new(),
        };

        let mut acc: u64 = 0;
        let mut out: Vec<HistoryEntry> = Vec::new();
        for message in session.messages.iter().rev() {
            if !out.is_empty() && acc + u64::from(message.token_count) > budget {
                break;
            }
            acc += u64::from(message.token_count);
            out.push(HistoryEntry {
                role: message.role,
                content: message.content.clone(),
            });
        }
        out.reverse();
        out
    }

    /// Mark the session expired and hand back its id so the caller can drive
    /// the lifecycle. Does not summarise or archive.
    pub fn clear(&self, chat_id: &ChatId) -> Option<Uuid> {
        let mut session = self.sessions.get_mut(chat_id.as_str())?;
        session.state = SessionState::Expired;
        Some(session.session_id)
    }

    /// Undo a `clear` whose transfer could not be completed: put the session
    /// back to `Active` so the background scan leaves it alone until it is
    /// genuinely idle. Returns whether the session still existed.
    pub fn reactivate(&self, chat_id: &ChatId) -> bool {
        match self.sessions.get_mut(chat_id.as_str()) {
            Some(mut session) => {
                session.state = SessionState::Active;
                true
            }
            None => false,
        }
    }

    /// True when the chat's session is marked expired or has been idle for
    /// at least `idle_timeout` (boundary inclusive).
    pub fn is_expired(&self, chat_id: &ChatId, idle_timeout: std::time::Duration) -> bool {
        match self.sessions.get(chat_id.as_str()) {
            Some(s) => {
                s.state == SessionState::Expired || is_idle(s.last_active_at, Utc::now(), idle_timeout)
            }
            None => false,
        }
    }

    /// Every session currently managed (used by the lifecycle manager).
    pub fn all_sessions(&self) -> Vec<(ChatId, Uuid)> {
        self.sessions
            .iter()
            .map(|e| (e.value().chat_id.clone(), e.value().session_id))
            .collect()
    }

    /// Sessions already idle at process start. The caller must transfer
    /// these before accepting new work (orphan recovery).
    pub fn startup_scan(&self, idle_timeout: std::time::Duration) -> Vec<(ChatId, Uuid)> {
        let now = Utc::now();
        self.sessions
            .iter()
            .filter(|e| is_idle(e.value().last_active_at, now, idle_timeout))
            .map(|e| (e.value().chat_id.clone(), e.value().session_id))
            .collect()
    }

    /// A point-in-time copy for summarisation. Call under the chat lock.
    pub fn snapshot(&self, chat_id: &ChatId) -> Option<Session> {
        self.sessions.get(chat_id.as_str()).map(|s| s.clone())
    }

    /// Move the descriptor into `archive/<date>/<session_id>/` and drop the
    /// in-memory session. On failure the session is restored so the next
    /// lifecycle tick retries.
    pub fn archive(&self, chat_id: &ChatId, date: NaiveDate) -> Result<Uuid> {
        let (key, session) =
            self.sessions
                .remove(chat_id.as_str())
                .ok_or_else(|| SessionError::NotFound {
                    chat: chat_id.fs_key(),
                })?;

        let chat_dir = self.chat_dir(chat_id);
        let dst_dir = self
            .root
            .join(ARCHIVE_DIR)
            .join(date.format("%Y-%m-%d").to_string())
            .join(session.session_id.to_string());

        let moved = (|| -> Result<()> {
            std::fs::create_dir_all(&dst_dir)?;
            std::fs::rename(
                chat_dir.join(DESCRIPTOR_FILE),
                dst_dir.join(DESCRIPTOR_FILE),
            )
            .map_err(|e| SessionError::Archive(e.to_string()))?;
            Ok(())
        })();

        match moved {
            Ok(()) => {
                let _ = std::fs::remove_dir(&chat_dir);
                info!(chat = %chat_id.fs_key(), session = %session.session_id, "session archived");
                Ok(session.session_id)
            }
            Err(e) => {
                self.sessions.insert(key, session);
                Err(e)
            }
        }
    }

    fn chat_dir(&self, chat_id: &ChatId) -> PathBuf {
        self.root.join(ACTIVE_DIR).join(chat_id.fs_key())
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let dir = self.chat_dir(&session.chat_id);
        std::fs::create_dir_all(&dir)?;
        let body = render_descriptor(session)?;
        let tmp = dir.join("session.json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, dir.join(DESCRIPTOR_FILE))?;
        Ok(())
    }
}

/// Idle test used by both the background scan and startup recovery.
/// The boundary is inclusive: exactly `idle_timeout` old means eligible.
fn is_idle(last_active_at: DateTime<Utc>, now: DateTime<Utc>, idle_timeout: std::time::Duration) -> bool {
    let idle = chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::MAX);
    now.signed_duration_since(last_active_at) >= idle
}

/// UTF-8, LF, pretty-printed, trailing newline. Reading a descriptor and
/// rendering it again yields the identical bytes.
fn render_descriptor(session: &Session) -> Result<String> {
    let mut body = serde_json::to_string_pretty(session)?;
    body.push('\n');
    Ok(body)
}

fn load_descriptor(path: &Path) -> Result<Session> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

/// Archive a descriptor that is not (or no longer) tracked in memory.
fn archive_descriptor(root: &Path, src_dir: &Path, session: &Session) -> Result<()> {
    let dst_dir = root
        .join(ARCHIVE_DIR)
        .join(session.last_active_at.date_naive().format("%Y-%m-%d").to_string())
        .join(session.session_id.to_string());
    std::fs::create_dir_all(&dst_dir)?;
    std::fs::rename(
        src_dir.join(DESCRIPTOR_FILE),
        dst_dir.join(DESCRIPTOR_FILE),
    )
    .map_err(|e| SessionError::Archive(e.to_string()))?;
    let _ = std::fs::remove_dir(src_dir);
    Ok(())
}
