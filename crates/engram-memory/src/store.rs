//! Long-term memory: a named collection of embedded factual statements with
//! similarity recall.
//!
//! The JSON record journal on disk is the durable source of truth; the HNSW
//! index is rebuilt from it whenever the collection is opened, so a reopen
//! never loses records. Writes are serialised behind a store-level lock;
//! recalls share a read lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use engram_llm::{with_retry, Embedder};

use crate::error::{MemoryError, Result};
use crate::types::{MemoryRecord, MemoryScope, RecalledMemory};

const META_FILE: &str = "meta.json";
const RECORDS_FILE: &str = "records.json";

/// Collection identity written at creation time. The embedding model is
/// pinned here: mixing embeddings from different models in one index would
/// make every similarity meaningless.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionMeta {
    collection_name: String,
    embedding_model: String,
    /// Learned from the first stored embedding.
    dimension: Option<usize>,
}

struct Inner {
    records: Vec<MemoryRecord>,
    /// `None` until the first record exists. Slot ids are journal positions.
    index: Option<HNSWIndex<f32, usize>>,
    dimension: Option<usize>,
}

pub struct MemoryStore {
    dir: PathBuf,
    collection_name: String,
    embedder: Arc<dyn Embedder>,
    embedding_model: String,
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("dir", &self.dir)
            .field("collection_name", &self.collection_name)
            .field("embedder", &self.embedder.name())
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl MemoryStore {
    /// Open (or create) the collection under `<root>/<collection>`.
    ///
    /// Every record present in the journal before the last shutdown is
    /// observable after this returns.
    pub fn open(
        root: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
        embedding_model: &str,
    ) -> Result<Self> {
        let dir = root.join(collection);
        std::fs::create_dir_all(&dir)?;

        let meta_path = dir.join(META_FILE);
        let meta = if meta_path.exists() {
            let meta: CollectionMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
            if meta.embedding_model != embedding_model {
                return Err(MemoryError::ModelMismatch {
                    existing: meta.embedding_model,
                    requested: embedding_model.to_string(),
                });
            }
            meta
        } else {
            let meta = CollectionMeta {
                collection_name: collection.to_string(),
                embedding_model: embedding_model.to_string(),
                dimension: None,
            };
            write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?)?;
            meta
        };

        let records_path = dir.join(RECORDS_FILE);
        let records: Vec<MemoryRecord> = if records_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&records_path)?)?
        } else {
            Vec::new()
        };

        let dimension = meta
            .dimension
            .or_else(|| records.first().map(|r| r.vector.len()));
        let index = build_index(&records)?;

        info!(
            collection,
            records = records.len(),
            "long-term memory collection opened"
        );

        Ok(Self {
            dir,
            collection_name: collection.to_string(),
            embedder,
            embedding_model: embedding_model.to_string(),
            inner: RwLock::new(Inner {
                records,
                index,
                dimension,
            }),
        })
    }

    /// Embed `text` and insert a record. The text is stored verbatim.
    ///
    /// The embedder gets one retry; if it still fails the record is not
    /// stored and `EmbeddingUnavailable` is returned for the caller to
    /// decide on.
    pub async fn store(&self, text: &str, metadata: BTreeMap<String, String>) -> Result<Uuid> {
        let vector = with_retry("embed", || self.embedder.embed(text, &self.embedding_model))
            .await
            .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;

        let mut inner = self.inner.write().await;

        match inner.dimension {
            Some(dim) if dim != vector.len() => {
                return Err(MemoryError::Index(format!(
                    "embedding dimension changed: collection has {dim}, got {}",
                    vector.len()
                )));
            }
            Some(_) => {}
            None => {
                inner.dimension = Some(vector.len());
                let meta = CollectionMeta {
                    collection_name: self.collection_name.clone(),
                    embedding_model: self.embedding_model.clone(),
                    dimension: inner.dimension,
                };
                write_atomic(&self.dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;
            }
        }

        let record = MemoryRecord {
            memory_id: Uuid::new_v4(),
            text: text.to_string(),
            vector,
            metadata,
        };
        let memory_id = record.memory_id;

        inner.records.push(record);
        if let Err(e) = self.persist_records(&inner.records) {
            // keep memory and disk in agreement when the journal write fails
            inner.records.pop();
            return Err(e);
        }
        inner.index = build_index(&inner.records)?;

        debug!(%memory_id, total = inner.records.len(), "memory stored");
        Ok(memory_id)
    }

    /// Similarity recall: at most `k` records with cosine similarity ≥
    /// `min_similarity`, restricted to `owner` (and `scope` when given),
    /// best match first. Ties go to the more recently created record.
    ///
    /// Recall never fails: an embedder error degrades to an empty result
    /// with a warning, and the pipeline proceeds without memories.
    pub async fn recall(
        &self,
        query: &str,
        owner: &str,
        scope: Option<MemoryScope>,
        k: usize,
        min_similarity: f32,
    ) -> Vec<RecalledMemory> {
        if k == 0 {
            return Vec::new();
        }
        let query_vec = match with_retry("embed", || {
            self.embedder.embed(query, &self.embedding_model)
        })
        .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "recall embedding failed, proceeding without memories");
                return Vec::new();
            }
        };

        let inner = self.inner.read().await;
        let index = match &inner.index {
            Some(idx) => idx,
            None => return Vec::new(),
        };

        // Rank every slot, then re-score exactly; the metadata filter means
        // a fixed top-k cut from the ANN could starve matching records.
        let candidates = index.search(&query_vec, inner.records.len());

        let mut hits: Vec<RecalledMemory> = candidates
            .into_iter()
            .filter_map(|slot| inner.records.get(slot))
            .filter(|r| r.owner() == Some(owner))
            .filter(|r| scope.map_or(true, |s| r.scope() == Some(s)))
            .filter_map(|r| {
                let similarity = cosine_similarity(&query_vec, &r.vector);
                (similarity >= min_similarity).then(|| RecalledMemory {
                    record: r.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.created_at().cmp(&a.record.created_at()))
        });
        hits.truncate(k);
        hits
    }

    /// Remove a record. Returns whether it existed. Deletion is
    /// authoritative: the journal is rewritten and the index rebuilt.
    pub async fn delete(&self, memory_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let pos = match inner.records.iter().position(|r| r.memory_id == memory_id) {
            Some(p) => p,
            None => return Ok(false),
        };
        let removed = inner.records.remove(pos);
        if let Err(e) = self.persist_records(&inner.records) {
            inner.records.insert(pos, removed);
            return Err(e);
        }
        inner.index = build_index(&inner.records)?;
        debug!(%memory_id, "memory deleted");
        Ok(true)
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    fn persist_records(&self, records: &[MemoryRecord]) -> Result<()> {
        write_atomic(
            &self.dir.join(RECORDS_FILE),
            &serde_json::to_vec_pretty(records)?,
        )
    }
}

/// Rebuild the HNSW index over the journal. Slot ids are journal positions,
/// so the journal order fixes the id space on every rebuild.
fn build_index(records: &[MemoryRecord]) -> Result<Option<HNSWIndex<f32, usize>>> {
    let first = match records.first() {
        Some(r) => r,
        None => return Ok(None),
    };
    let mut index = HNSWIndex::new(first.vector.len(), &HNSWParams::default());
    for (slot, record) in records.iter().enumerate() {
        index
            .add(&record.vector, slot)
            .map_err(|e| MemoryError::Index(e.to_string()))?;
    }
    index
        .build(Metric::Euclidean)
        .map_err(|e| MemoryError::Index(e.to_string()))?;
    Ok(Some(index))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Write-to-temp + rename so readers never observe a half-written file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryAttributes, MemorySource};
    use async_trait::async_trait;
    use engram_llm::ProviderError;

    /// Deterministic embedder: fixed directions per topic so similarities
    /// are predictable without any network.
    struct StubEmbedder;

    fn stub_vector(text: &str) -> Vec<f32> {
        let t = text.to_lowercase();
        if t.contains("haifa") || t.contains("live") {
            vec![1.0, 0.0, 0.0, 0.0]
        } else if t.contains("coffee") {
            vec![0.0, 1.0, 0.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0, 0.0]
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn name(&self) -> &str {
            "stub"
        }
        async fn embed(&self, text: &str, _model: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Ok(stub_vector(text))
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }
        async fn embed(&self, _text: &str, _model: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Api {
                status: 401,
                message: "bad key".into(),
            })
        }
    }

    fn open_store(root: &Path) -> MemoryStore {
        MemoryStore::open(root, "memories", Arc::new(StubEmbedder), "stub-model")
            .expect("open failed")
    }

    fn chat_attrs(owner: &str) -> BTreeMap<String, String> {
        MemoryAttributes::new(owner, MemoryScope::Chat, MemorySource::Explicit).into_map()
    }

    #[tokio::test]
    async fn recall_filters_by_owner_and_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        store
            .store("The user lives in Haifa", chat_attrs("+1555@c.us"))
            .await
            .unwrap();
        store
            .store("The user likes coffee", chat_attrs("+1555@c.us"))
            .await
            .unwrap();
        store
            .store("The user lives in Oslo", chat_attrs("+1999@c.us"))
            .await
            .unwrap();

        let hits = store
            .recall("Where do I live?", "+1555@c.us", None, 5, 0.7)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.text, "The user lives in Haifa");
        assert!(hits[0].similarity >= 0.7);
    }

    #[tokio::test]
    async fn similarity_ties_break_on_recency() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        let mut older = chat_attrs("c");
        older.insert("created_at".into(), "2026-01-01T00:00:00+00:00".into());
        let mut newer = chat_attrs("c");
        newer.insert("created_at".into(), "2026-06-01T00:00:00+00:00".into());

        store.store("lives in Haifa (old)", older).await.unwrap();
        store.store("lives in Haifa (new)", newer).await.unwrap();

        let hits = store.recall("where do I live", "c", None, 2, 0.5).await;
        assert_eq!(hits.len(), 2);
        assert!(hits[0].record.text.contains("(new)"));
    }

    #[tokio::test]
    async fn recall_is_idempotent_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        for text in ["lives in Haifa", "likes coffee", "lives downtown"] {
            store.store(text, chat_attrs("c")).await.unwrap();
        }
        let first = store.recall("where do I live", "c", None, 5, 0.1).await;
        let second = store.recall("where do I live", "c", None, 5, 0.1).await;
        let ids: Vec<_> = first.iter().map(|h| h.record.memory_id).collect();
        let ids2: Vec<_> = second.iter().map(|h| h.record.memory_id).collect();
        assert_eq!(ids, ids2);
    }

    #[tokio::test]
    async fn delete_is_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let id = store.store("likes coffee", chat_attrs("c")).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.count().await, 0);
        assert!(store.recall("coffee", "c", None, 5, 0.1).await.is_empty());
    }

    #[tokio::test]
    async fn broken_embedder_surfaces_on_store_and_degrades_on_recall() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            MemoryStore::open(dir.path(), "memories", Arc::new(BrokenEmbedder), "stub-model")
                .unwrap();
        match store.store("x", chat_attrs("c")).await {
            Err(MemoryError::EmbeddingUnavailable(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(store.recall("x", "c", None, 5, 0.1).await.is_empty());
    }

    #[tokio::test]
    async fn model_mismatch_is_rejected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        drop(open_store(dir.path()));
        let err = MemoryStore::open(dir.path(), "memories", Arc::new(StubEmbedder), "other-model")
            .unwrap_err();
        assert!(matches!(err, MemoryError::ModelMismatch { .. }));
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
