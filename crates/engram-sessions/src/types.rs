use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engram_core::{ChatId, MessageRole, UserRole};

/// Where a session is in its life. Not persisted: the on-disk location
/// (`active/` vs `archive/`) encodes it; `Expired` only exists in memory
/// between a reset/idle detection and the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Active,
    Expired,
    Archived,
}

/// One message in a session log.
///
/// `token_count` is stamped when the content is set and never recomputed,
/// so budget sums stay stable even if the counter's model changes later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: u32,
    pub metadata: BTreeMap<String, String>,
}

/// The bounded window of recent conversation for one chat.
///
/// Serialized field order is the descriptor's key order; keep it fixed so a
/// read/re-serialize cycle is byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub chat_id: ChatId,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub user_role: UserRole,
    pub messages: Vec<StoredMessage>,
    #[serde(skip)]
    pub state: SessionState,
}

impl Session {
    pub fn new(chat_id: ChatId, user_role: UserRole, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            chat_id,
            created_at: now,
            last_active_at: now,
            user_role,
            messages: Vec::new(),
            state: SessionState::Active,
        }
    }
}

/// A role/content pair as handed to the completer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}
