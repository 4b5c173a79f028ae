pub mod openai;
pub mod provider;
pub mod retry;

pub use provider::{
    ChatTurn, Completer, CompletionOutcome, CompletionParams, Embedder, ProviderError,
};
pub use retry::with_retry;
