pub mod commands;
pub mod pipeline;
pub mod reply;

pub use pipeline::{InboundMessage, Pipeline, PipelineError, PipelineSettings};
