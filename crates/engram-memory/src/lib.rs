pub mod error;
pub mod store;
pub mod types;

pub use error::{MemoryError, Result};
pub use store::MemoryStore;
pub use types::{
    MemoryAttributes, MemoryRecord, MemoryScope, MemorySource, RecalledMemory, GLOBAL_OWNER,
};
