//! Session store and freshness engine.
//!
//! A [`Session`] is an append-only per-key message journal, persisted to a JSONL
//! file: a metadata header line, then one message object per line.
//! [`SessionManager`] owns the in-memory index and the
//! crash-safe save/load machinery; [`key`] derives the canonical session key.

mod freshness;
mod journal;
mod key;
mod manager;

pub use freshness::ResetPolicy;
pub use journal::JournalError;
pub use key::{session_key, SessionScope};
pub use manager::{SessionError, SessionManager};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of one message within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// A tool call requested by the assistant. Arguments are opaque JSON; this
/// module only persists them, it never interprets them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One immutable message within a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut m = Self::new(MessageRole::Tool, content);
        m.tool_call_id = Some(tool_call_id.into());
        m
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            media: Vec::new(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Validates the invariant `role=tool ⇒ toolCallId≠""`.
    pub fn is_valid(&self) -> bool {
        !matches!(self.role, MessageRole::Tool)
            || self.tool_call_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Metadata header persisted as the journal's first line.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionMetadataHeader {
    #[serde(rename = "_type")]
    pub type_tag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A per-sender conversational context.
#[derive(Clone, Debug)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Increments every time the freshness policy resets this session in place.
    pub generation: u64,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::Map::new(),
            generation: 0,
        }
    }

    /// Appends a message and bumps `updated_at`. Messages are append-only within a
    /// generation.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Clears messages and bumps the generation (used by `Clear` and by freshness reset).
    pub fn clear(&mut self) {
        self.messages.clear();
        self.generation += 1;
        let now = Utc::now();
        self.created_at = now;
        self.updated_at = now;
    }

    /// Merges keys into the existing metadata map rather than replacing it, so
    /// resets and patches never leave metadata null.
    pub fn patch_metadata(&mut self, patch: HashMap<String, serde_json::Value>) {
        for (k, v) in patch {
            self.metadata.insert(k, v);
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_requires_tool_call_id() {
        let mut m = Message::new(MessageRole::Tool, "result");
        assert!(!m.is_valid());
        m.tool_call_id = Some("call-1".into());
        assert!(m.is_valid());
    }

    #[test]
    fn non_tool_messages_are_always_valid() {
        assert!(Message::user("hi").is_valid());
        assert!(Message::assistant("hi").is_valid());
    }

    #[test]
    fn clear_resets_messages_and_bumps_generation() {
        let mut s = Session::new("k");
        s.add_message(Message::user("a"));
        s.add_message(Message::user("b"));
        let gen0 = s.generation;
        s.clear();
        assert!(s.messages.is_empty());
        assert_eq!(s.generation, gen0 + 1);
    }

    #[test]
    fn patch_metadata_merges_without_dropping_existing_keys() {
        let mut s = Session::new("k");
        s.patch_metadata(HashMap::from([("a".to_string(), serde_json::json!(1))]));
        s.patch_metadata(HashMap::from([("b".to_string(), serde_json::json!(2))]));
        assert_eq!(s.metadata.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(s.metadata.get("b"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn updated_at_never_precedes_created_at() {
        let s = Session::new("k");
        assert!(s.updated_at >= s.created_at);
    }
}
