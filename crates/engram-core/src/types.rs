use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identifier of a conversation with a remote party (1:1 or group).
///
/// All per-chat state (the active session, its lock, recalled memories)
/// is keyed on this value. The raw form is whatever the messaging provider
/// hands us (e.g. `+15550001@c.us`); [`ChatId::fs_key`] derives a
/// filesystem-safe directory name from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe key: first 16 hex chars of the SHA-256 of the raw id.
    ///
    /// Stable across restarts so the active-session directory for a chat can
    /// always be found again.
    pub fn fs_key(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Principal class of the remote party. Determines the session token budget
/// and whether global-scope memories are unioned into recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Godfather,
    Client,
}

impl UserRole {
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Godfather)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Godfather => write!(f, "godfather"),
            Self::Client => write!(f, "client"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "godfather" => Ok(Self::Godfather),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_key_is_stable_and_hex() {
        let a = ChatId::new("+15550001@c.us");
        let b = ChatId::new("+15550001@c.us");
        assert_eq!(a.fs_key(), b.fs_key());
        assert_eq!(a.fs_key().len(), 16);
        assert!(a.fs_key().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fs_key_differs_per_chat() {
        let a = ChatId::new("+15550001@c.us");
        let b = ChatId::new("+15550002@c.us");
        assert_ne!(a.fs_key(), b.fs_key());
    }

    #[test]
    fn role_roundtrip() {
        for role in [UserRole::Godfather, UserRole::Client] {
            let parsed: UserRole = role.to_string().parse().expect("parse failed");
            assert_eq!(parsed, role);
        }
        assert!("admin".parse::<UserRole>().is_err());
    }

    #[test]
    fn message_role_serde_is_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
