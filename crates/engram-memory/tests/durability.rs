//! Restart durability: the set of records observed after reopening a
//! collection equals the set stored before.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use engram_llm::{Embedder, ProviderError};
use engram_memory::{MemoryAttributes, MemoryScope, MemorySource, MemoryStore};

struct HashEmbedder;

/// Deterministic 8-dim vector derived from the text bytes. Not meaningful
/// semantically, but stable across process restarts, which is what this
/// test needs.
fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[i % 8] += f32::from(b) / 255.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }
    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(hash_vector(text))
    }
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let texts = [
        "The user lives in Haifa",
        "The user prefers morning meetings",
        "Invoice 4411 was paid in June",
    ];

    let stored_ids: BTreeSet<_> = {
        let store = MemoryStore::open(dir.path(), "memories", Arc::new(HashEmbedder), "hash-v1")
            .expect("first open");
        let mut ids = BTreeSet::new();
        for text in texts {
            let attrs =
                MemoryAttributes::new("+1555@c.us", MemoryScope::Chat, MemorySource::Explicit);
            ids.insert(store.store(text, attrs.into_map()).await.expect("store"));
        }
        ids
    };

    // simulated restart: a fresh store over the same directory
    let reopened = MemoryStore::open(dir.path(), "memories", Arc::new(HashEmbedder), "hash-v1")
        .expect("reopen");
    assert_eq!(reopened.count().await, texts.len());

    // every stored id is recallable with its verbatim text
    for text in texts {
        let hits = reopened.recall(text, "+1555@c.us", None, 5, 0.99).await;
        assert!(
            hits.iter()
                .any(|h| h.record.text == text && stored_ids.contains(&h.record.memory_id)),
            "record {text:?} missing after reopen"
        );
    }
}
