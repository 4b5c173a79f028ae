use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session for chat {chat}")]
    NotFound { chat: String },

    #[error("archive move failed: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
