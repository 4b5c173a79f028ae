//! HTTP client for the polling WhatsApp provider.
//!
//! The provider exposes a long-poll receive endpoint plus delete/send calls,
//! all keyed by instance id and token. The token rides in the URL, so URLs
//! are never logged; log lines carry the instance id and masked ids only.

use std::time::Duration;

use tracing::{debug, warn};

use engram_core::mask::mask_phone;

use crate::error::{Result, WhatsAppError};
use crate::event::Notification;

pub struct WhatsAppClient {
    http: reqwest::Client,
    api_url: String,
    instance_id: String,
    api_token: String,
}

impl WhatsAppClient {
    /// `poll_timeout_seconds` is the provider-side long-poll window; the
    /// HTTP timeout leaves margin on top of it.
    pub fn new(
        api_url: String,
        instance_id: String,
        api_token: String,
        poll_timeout_seconds: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_seconds + 10))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            http,
            api_url,
            instance_id,
            api_token,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/waInstance{}/{}/{}",
            self.api_url, self.instance_id, method, self.api_token
        )
    }

    /// Long-poll for the next notification. `None` when the window elapsed
    /// with nothing queued.
    pub async fn receive_notification(&self) -> Result<Option<Notification>> {
        let resp = self.http.get(self.endpoint("receiveNotification")).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(WhatsAppError::Api {
                status,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        let body = resp.text().await?;
        if body.trim() == "null" || body.trim().is_empty() {
            return Ok(None);
        }
        let notification: Notification =
            serde_json::from_str(&body).map_err(|e| WhatsAppError::Parse(e.to_string()))?;
        debug!(receipt = notification.receipt_id, "notification received");
        Ok(Some(notification))
    }

    /// Acknowledge a handled notification so the provider stops re-serving it.
    pub async fn delete_notification(&self, receipt_id: u64) -> Result<()> {
        let url = format!("{}/{}", self.endpoint("deleteNotification"), receipt_id);
        let resp = self.http.delete(url).send().await?;
        if !resp.status().is_success() {
            warn!(receipt = receipt_id, status = resp.status().as_u16(), "delete notification failed");
        }
        Ok(())
    }

    /// Send one text message to a chat.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint("sendMessage"))
            .json(&serde_json::json!({
                "chatId": chat_id,
                "message": text,
            }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(WhatsAppError::Api {
                status,
                message: resp.text().await.unwrap_or_default(),
            });
        }
        debug!(chat = %mask_phone(chat_id), chars = text.len(), "message sent");
        Ok(())
    }

    /// Fetch attachment bytes from the provider's media host.
    pub async fn download_media(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(WhatsAppError::Api {
                status,
                message: "media download failed".to_string(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
