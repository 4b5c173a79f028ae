pub mod client;
pub mod error;
pub mod event;
pub mod poll;

pub use client::WhatsAppClient;
pub use error::WhatsAppError;
pub use event::{InboundEvent, MediaRef, Notification};
pub use poll::PollLoop;
