//! The inbound poll loop: receive → decode → dispatch → reply → ack.
//!
//! Each decoded message is handled in its own task, so a chat blocked on a
//! slow completion never stalls polling for the others. Panics inside a
//! turn are caught at this boundary and surfaced as the generic friendly
//! error; the process never dies because of one message.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use engram_core::mask::mask_phone;
use engram_core::{ChatId, UserRole};
use engram_media::{IncomingFile, MediaIngestor};
use engram_pipeline::{reply, InboundMessage, Pipeline};

use crate::client::WhatsAppClient;
use crate::event::{parse_event, InboundEvent};

/// Pause after a failed receive call before polling again.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(5);

pub struct PollLoop {
    client: Arc<WhatsAppClient>,
    pipeline: Arc<Pipeline>,
    ingestor: Arc<MediaIngestor>,
    privileged_chat_id: Option<String>,
}

impl PollLoop {
    pub fn new(
        client: Arc<WhatsAppClient>,
        pipeline: Arc<Pipeline>,
        ingestor: Arc<MediaIngestor>,
        privileged_chat_id: Option<String>,
    ) -> Self {
        Self {
            client,
            pipeline,
            ingestor,
            privileged_chat_id,
        }
    }

    /// Poll until `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("whatsapp poll loop started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("whatsapp poll loop shutting down");
                        break;
                    }
                }
                polled = self.client.receive_notification() => match polled {
                    Ok(Some(notification)) => {
                        if let Some(event) = parse_event(&notification.body) {
                            let me = Arc::clone(&self);
                            tokio::spawn(async move { me.dispatch(event).await });
                        }
                        // ack regardless: undecodable webhooks must not loop forever
                        if let Err(e) = self.client.delete_notification(notification.receipt_id).await {
                            warn!(error = %e, "failed to ack notification");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "receive poll failed, backing off");
                        tokio::time::sleep(RECEIVE_BACKOFF).await;
                    }
                }
            }
        }
    }

    /// Handle one event to completion; the inner task boundary converts a
    /// panic into the generic error reply.
    async fn dispatch(self: &Arc<Self>, event: InboundEvent) {
        let chat_id = event.chat_id.clone();
        let me = Arc::clone(self);
        let turn = tokio::spawn(async move { me.handle_event(event).await });

        let outcome = match turn.await {
            Ok(reply_text) => reply_text,
            Err(join_error) => {
                error!(chat = %mask_phone(&chat_id), error = %join_error, "pipeline turn panicked");
                Some(reply::ERR_GENERIC.to_string())
            }
        };

        if let Some(text) = outcome {
            if let Err(e) = self.client.send_message(&chat_id, &text).await {
                warn!(chat = %mask_phone(&chat_id), error = %e, "outbound send failed");
            }
        }
    }

    /// Decode media, run the pipeline, return the reply to send (if any).
    async fn handle_event(&self, event: InboundEvent) -> Option<String> {
        let document = match &event.media {
            Some(media) => {
                let bytes = match self.client.download_media(&media.download_url).await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(chat = %mask_phone(&event.chat_id), error = %e, "media download failed");
                        return Some(reply::ERR_GENERIC.to_string());
                    }
                };
                let file = IncomingFile {
                    bytes,
                    mime: media.mime.clone(),
                    file_name: media.file_name.clone(),
                    sender_phone: event.sender_id.clone(),
                };
                match self.ingestor.ingest(file).await {
                    Ok(artifact) => Some(artifact),
                    Err(e) if e.is_rejection() => {
                        info!(chat = %mask_phone(&event.chat_id), rejection = %e, "attachment rejected");
                        return Some(reply::ERR_UNSUPPORTED_MEDIA.to_string());
                    }
                    Err(e) => {
                        warn!(chat = %mask_phone(&event.chat_id), error = %e, "ingestion failed");
                        return Some(reply::ERR_GENERIC.to_string());
                    }
                }
            }
            None => None,
        };

        if event.text.trim().is_empty() && document.is_none() {
            return None;
        }

        let role = match &self.privileged_chat_id {
            Some(p) if *p == event.chat_id => UserRole::Godfather,
            _ => UserRole::Client,
        };

        let answer = self
            .pipeline
            .handle_inbound(InboundMessage {
                chat_id: ChatId::new(event.chat_id.clone()),
                sender_id: event.sender_id,
                role,
                text: event.text,
                document,
                received_at: event.received_at,
            })
            .await;
        Some(answer)
    }
}
