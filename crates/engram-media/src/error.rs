use thiserror::Error;

use engram_llm::ProviderError;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("file is empty")]
    FileEmpty,

    #[error("PDF has too many pages: {pages} (max {max})")]
    TooManyPages { pages: usize, max: usize },

    #[error("PDF processing failed: {0}")]
    Pdf(String),

    #[error("DOCX processing failed: {0}")]
    Docx(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Validation rejections the user should hear about verbatim (as the
    /// friendly unsupported-media string); everything else is internal.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::FileTooLarge { .. }
                | Self::FileEmpty
                | Self::TooManyPages { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
