pub mod classify;
pub mod docx;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod pdf;
pub mod storage;
pub mod types;
pub mod validate;

pub use error::{MediaError, Result};
pub use ingest::MediaIngestor;
pub use types::{DocumentArtifact, DocumentType, ExtractionQuality, IncomingFile, MediaKind};
