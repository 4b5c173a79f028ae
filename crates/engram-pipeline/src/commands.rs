//! Textual control commands, intercepted before the AI pipeline.
//!
//! Commands are recognised by literal prefix at the start of the message,
//! case-sensitive. They never consult recall and never write user messages
//! into the session; nothing here may pollute a future summarisation.

use tracing::{info, warn};
use uuid::Uuid;

use engram_memory::{MemoryAttributes, MemoryScope, MemorySource, GLOBAL_OWNER};

use crate::pipeline::{InboundMessage, Pipeline};
use crate::reply;

/// Returns `Some(response)` when the message was a recognised command,
/// `None` when it should continue into the pipeline.
pub async fn handle_command(
    pipeline: &Pipeline,
    msg: &InboundMessage,
    correlation: Uuid,
) -> Option<String> {
    let text = msg.text.trim();
    let settings = &pipeline.settings;

    if text == settings.reset_command {
        return Some(handle_reset(pipeline, msg, correlation).await);
    }

    if let Some(rest) = text.strip_prefix(settings.remember_command.as_str()) {
        // require a space (or end) after the literal so "/remembering" passes through
        if rest.is_empty() {
            return Some(format!(
                "Tell me what to remember: `{} <fact>`",
                settings.remember_command
            ));
        }
        if let Some(fact) = rest.strip_prefix(' ') {
            return Some(handle_remember(pipeline, msg, fact.trim(), correlation).await);
        }
    }

    None
}

/// `/reset`: drive the lifecycle transition for the current session
/// synchronously: summarise, store memories, archive. On failure the
/// session is put back to active, untouched, so the user can keep chatting
/// and the background scan does not pick it up before it is genuinely idle.
async fn handle_reset(pipeline: &Pipeline, msg: &InboundMessage, correlation: Uuid) -> String {
    if !pipeline.settings.memory_enabled {
        return reply::MEMORY_DISABLED.to_string();
    }

    let lock = pipeline.sessions.lock(&msg.chat_id);
    let _guard = lock.lock().await;

    if pipeline.sessions.clear(&msg.chat_id).is_none() {
        return reply::RESET_NOTHING.to_string();
    }

    match pipeline.lifecycle.transfer_locked(&msg.chat_id).await {
        Ok(stored) => {
            info!(
                correlation = %correlation,
                chat = %msg.chat_id.fs_key(),
                memories = stored,
                "session reset by user"
            );
            reply::RESET_DONE.to_string()
        }
        Err(e) => {
            pipeline.sessions.reactivate(&msg.chat_id);
            warn!(
                correlation = %correlation,
                chat = %msg.chat_id.fs_key(),
                error = %e,
                "reset transfer failed, session left active"
            );
            reply::ERR_GENERIC.to_string()
        }
    }
}

/// `/remember <fact>`: explicit long-term memory write. Store failures are
/// reported to the user, unlike recall failures which stay invisible.
async fn handle_remember(
    pipeline: &Pipeline,
    msg: &InboundMessage,
    fact: &str,
    correlation: Uuid,
) -> String {
    if !pipeline.settings.memory_enabled {
        return reply::MEMORY_DISABLED.to_string();
    }
    if fact.is_empty() {
        return format!(
            "Tell me what to remember: `{} <fact>`",
            pipeline.settings.remember_command
        );
    }

    let owner = if msg.role.is_privileged() {
        GLOBAL_OWNER
    } else {
        msg.chat_id.as_str()
    };
    let attrs = MemoryAttributes::new(owner, MemoryScope::Chat, MemorySource::Explicit);

    match pipeline.memory.store(fact, attrs.into_map()).await {
        Ok(memory_id) => {
            info!(correlation = %correlation, %memory_id, "explicit memory stored");
            reply::REMEMBER_DONE.to_string()
        }
        Err(e) => {
            warn!(correlation = %correlation, error = %e, "explicit memory store failed");
            reply::REMEMBER_FAILED.to_string()
        }
    }
}
