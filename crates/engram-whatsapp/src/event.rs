//! Decoding of polled provider notifications into inbound events.
//!
//! The polling provider wraps each WhatsApp event in a notification with a
//! receipt id; the body is provider JSON. Only incoming message webhooks
//! become [`InboundEvent`]s; instance-state changes, delivery statuses and
//! outgoing echoes are ignored (the poll loop still deletes them).

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// One polled notification: delete by `receipt_id` once handled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub receipt_id: u64,
    pub body: serde_json::Value,
}

/// Reference to an attachment hosted by the provider.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub download_url: String,
    pub mime: String,
    pub file_name: Option<String>,
}

/// A decoded inbound user message.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub media: Option<MediaRef>,
    pub received_at: DateTime<Utc>,
}

/// Decode a notification body. `None` for anything that is not an incoming
/// user message.
pub fn parse_event(body: &serde_json::Value) -> Option<InboundEvent> {
    if body.get("typeWebhook").and_then(|v| v.as_str()) != Some("incomingMessageReceived") {
        return None;
    }

    let sender_data = body.get("senderData")?;
    let chat_id = sender_data.get("chatId")?.as_str()?.to_string();
    let sender_id = sender_data
        .get("sender")
        .and_then(|v| v.as_str())
        .unwrap_or(&chat_id)
        .to_string();

    let message_data = body.get("messageData")?;
    let type_message = message_data
        .get("typeMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let (text, media) = match type_message {
        "textMessage" => (
            message_data
                .pointer("/textMessageData/textMessage")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            None,
        ),
        "extendedTextMessage" => (
            message_data
                .pointer("/extendedTextMessageData/text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            None,
        ),
        "imageMessage" | "documentMessage" => {
            let file = message_data.get("fileMessageData")?;
            let media = MediaRef {
                download_url: file.get("downloadUrl")?.as_str()?.to_string(),
                mime: file
                    .get("mimeType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("application/octet-stream")
                    .to_string(),
                file_name: file
                    .get("fileName")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            };
            let caption = file
                .get("caption")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            (caption, Some(media))
        }
        _ => return None,
    };

    let received_at = body
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    Some(InboundEvent {
        chat_id,
        sender_id,
        text,
        media,
        received_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_message_is_decoded() {
        let body = json!({
            "typeWebhook": "incomingMessageReceived",
            "timestamp": 1_751_000_000,
            "senderData": {
                "chatId": "15550001234@c.us",
                "sender": "15550001234@c.us",
                "senderName": "Dana"
            },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "hello" }
            }
        });
        let event = parse_event(&body).expect("decoded");
        assert_eq!(event.chat_id, "15550001234@c.us");
        assert_eq!(event.text, "hello");
        assert!(event.media.is_none());
    }

    #[test]
    fn document_message_carries_media_ref_and_caption() {
        let body = json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": { "chatId": "15550001234@c.us", "sender": "15550001234@c.us" },
            "messageData": {
                "typeMessage": "documentMessage",
                "fileMessageData": {
                    "downloadUrl": "https://media.example/abc",
                    "mimeType": "application/pdf",
                    "fileName": "invoice.pdf",
                    "caption": "please check"
                }
            }
        });
        let event = parse_event(&body).expect("decoded");
        assert_eq!(event.text, "please check");
        let media = event.media.expect("media ref");
        assert_eq!(media.mime, "application/pdf");
        assert_eq!(media.file_name.as_deref(), Some("invoice.pdf"));
    }

    #[test]
    fn non_message_webhooks_are_ignored() {
        let body = json!({
            "typeWebhook": "stateInstanceChanged",
            "stateInstance": "authorized"
        });
        assert!(parse_event(&body).is_none());

        let outgoing = json!({
            "typeWebhook": "outgoingMessageStatus",
            "status": "delivered"
        });
        assert!(parse_event(&outgoing).is_none());
    }

    #[test]
    fn group_chat_id_is_preserved() {
        let body = json!({
            "typeWebhook": "incomingMessageReceived",
            "senderData": {
                "chatId": "123456789-987654@g.us",
                "sender": "15550001234@c.us"
            },
            "messageData": {
                "typeMessage": "textMessage",
                "textMessageData": { "textMessage": "hi all" }
            }
        });
        let event = parse_event(&body).expect("decoded");
        // one shared session per group: the chat id is the group id
        assert_eq!(event.chat_id, "123456789-987654@g.us");
        assert_eq!(event.sender_id, "15550001234@c.us");
    }
}
