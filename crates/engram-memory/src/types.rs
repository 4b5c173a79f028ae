use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner value used for memories that belong to the privileged principal
/// rather than to a single chat.
pub const GLOBAL_OWNER: &str = "global";

/// Recognised metadata keys.
pub const META_OWNER: &str = "owner";
pub const META_SCOPE: &str = "scope";
pub const META_SOURCE: &str = "source";
pub const META_CREATED_AT: &str = "created_at";

/// Visibility of a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Visible only when recalling for the owning chat.
    Chat,
    /// Unioned into recall for the privileged principal.
    Global,
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for MemoryScope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown memory scope: {other}")),
        }
    }
}

/// How a memory record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Produced by summarising an idle session.
    SessionTransfer,
    /// The user asked for it to be remembered.
    Explicit,
    /// Extracted from an ingested document.
    Document,
}

impl std::fmt::Display for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionTransfer => write!(f, "session_transfer"),
            Self::Explicit => write!(f, "explicit"),
            Self::Document => write!(f, "document"),
        }
    }
}

impl std::str::FromStr for MemorySource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_transfer" => Ok(Self::SessionTransfer),
            "explicit" => Ok(Self::Explicit),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown memory source: {other}")),
        }
    }
}

/// Convenience builder for the recognised metadata keys.
#[derive(Debug, Clone)]
pub struct MemoryAttributes {
    pub owner: String,
    pub scope: MemoryScope,
    pub source: MemorySource,
    pub created_at: DateTime<Utc>,
}

impl MemoryAttributes {
    pub fn new(owner: impl Into<String>, scope: MemoryScope, source: MemorySource) -> Self {
        Self {
            owner: owner.into(),
            scope,
            source,
            created_at: Utc::now(),
        }
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(META_OWNER.to_string(), self.owner);
        map.insert(META_SCOPE.to_string(), self.scope.to_string());
        map.insert(META_SOURCE.to_string(), self.source.to_string());
        map.insert(META_CREATED_AT.to_string(), self.created_at.to_rfc3339());
        map
    }
}

/// One durable factual statement plus its embedding.
///
/// `text` is stored verbatim: no lossy transforms on the way in or out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_id: Uuid,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

impl MemoryRecord {
    pub fn owner(&self) -> Option<&str> {
        self.metadata.get(META_OWNER).map(String::as_str)
    }

    pub fn scope(&self) -> Option<MemoryScope> {
        self.metadata.get(META_SCOPE).and_then(|s| s.parse().ok())
    }

    /// RFC-3339 creation timestamp, used to break similarity ties in favour
    /// of the freshest record. Lexicographic comparison of RFC-3339 strings
    /// matches chronological order.
    pub fn created_at(&self) -> Option<&str> {
        self.metadata.get(META_CREATED_AT).map(String::as_str)
    }
}

/// A recall hit: the record plus its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    pub record: MemoryRecord,
    pub similarity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_populate_recognised_keys() {
        let map = MemoryAttributes::new("+1555@c.us", MemoryScope::Chat, MemorySource::Explicit)
            .into_map();
        assert_eq!(map.get(META_OWNER).unwrap(), "+1555@c.us");
        assert_eq!(map.get(META_SCOPE).unwrap(), "chat");
        assert_eq!(map.get(META_SOURCE).unwrap(), "explicit");
        assert!(map.contains_key(META_CREATED_AT));
    }

    #[test]
    fn scope_and_source_roundtrip() {
        for scope in [MemoryScope::Chat, MemoryScope::Global] {
            assert_eq!(scope.to_string().parse::<MemoryScope>().unwrap(), scope);
        }
        for source in [
            MemorySource::SessionTransfer,
            MemorySource::Explicit,
            MemorySource::Document,
        ] {
            assert_eq!(source.to_string().parse::<MemorySource>().unwrap(), source);
        }
    }
}
