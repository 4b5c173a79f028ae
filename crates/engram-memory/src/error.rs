use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The embedder failed even after the single retry. The record was not
    /// stored.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("collection was created with embedding model '{existing}', got '{requested}'")]
    ModelMismatch { existing: String, requested: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
