//! Telegram update → bus message conversion, kept free of any network types
//! beyond `teloxide::types` so it stays unit-testable from JSON fixtures.

use chrono::Utc;
use goclaw_core::bus::InboundMessage;
use teloxide::types::Message;
use uuid::Uuid;

/// Converts one received Telegram message into the normalized inbound record.
/// Returns `None` for updates without usable text (joins, stickers, ...).
pub fn inbound_from_message(channel: &str, account_id: &str, msg: &Message) -> Option<InboundMessage> {
    let content = msg.text().or_else(|| msg.caption())?.to_string();
    let sender_id = msg.from.as_ref().map(|u| u.id.0.to_string())?;

    let mut media = Vec::new();
    if let Some(photos) = msg.photo() {
        // Largest rendition last per Bot API ordering.
        if let Some(photo) = photos.last() {
            media.push(format!("photo:{}", photo.file.id));
        }
    }
    if let Some(doc) = msg.document() {
        media.push(format!("document:{}", doc.file.id));
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert("message_id".to_string(), serde_json::json!(msg.id.0));
    metadata.insert(
        "is_group".to_string(),
        serde_json::json!(msg.chat.is_group() || msg.chat.is_supergroup()),
    );
    if let Some(user) = msg.from.as_ref() {
        metadata.insert("sender_name".to_string(), serde_json::json!(user.full_name()));
    }

    Some(InboundMessage {
        id: Uuid::new_v4().to_string(),
        channel: channel.to_string(),
        account_id: account_id.to_string(),
        sender_id,
        chat_id: msg.chat.id.0.to_string(),
        content,
        media,
        metadata,
        timestamp: Utc::now(),
    })
}
