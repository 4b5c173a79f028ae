pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, SessionError};
pub use store::SessionStore;
pub use types::{HistoryEntry, Session, SessionState, StoredMessage};
