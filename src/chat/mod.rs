//! Conversation records and post-turn enrichment.
//!
//! The live session emits completed turns; this module turns them into
//! an append-only message transcript and drives the secondary
//! classification calls that decorate it.

pub mod emotion;
pub mod strategies;
pub mod title;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use emotion::Emotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Ai,
}

/// One transcript entry. Immutable after creation except for the
/// asynchronously attached emotion tag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: MessageSender,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
}

impl ChatMessage {
    fn new(text: String, sender: MessageSender) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text,
            sender,
            timestamp: Utc::now(),
            emotion: None,
        }
    }
}

/// Ordered transcript for one conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: "New Chat".to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a completed turn. Blank sides are dropped; an entirely
    /// blank turn appends nothing. Returns the records that were added.
    pub fn record_turn(&mut self, user_text: &str, model_text: &str) -> Vec<ChatMessage> {
        let mut added = Vec::new();
        let user_text = user_text.trim();
        let model_text = model_text.trim();
        if !user_text.is_empty() {
            added.push(ChatMessage::new(user_text.to_string(), MessageSender::User));
        }
        if !model_text.is_empty() {
            added.push(ChatMessage::new(model_text.to_string(), MessageSender::Ai));
        }
        self.messages.extend(added.iter().cloned());
        added
    }

    /// Attach an emotion tag to an existing message.
    pub fn set_emotion(&mut self, message_id: &str, emotion: Emotion) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.emotion = Some(emotion);
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_turn_appends_user_then_model() {
        let mut session = ChatSession::new();
        let added = session.record_turn("I feel anxious", "That sounds hard.");
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].sender, MessageSender::User);
        assert_eq!(added[1].sender, MessageSender::Ai);
        assert_eq!(session.messages.len(), 2);
        assert_ne!(added[0].id, added[1].id);
    }

    #[test]
    fn test_record_turn_drops_blank_sides() {
        let mut session = ChatSession::new();
        let added = session.record_turn("   ", "Here with you.");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].sender, MessageSender::Ai);

        let added = session.record_turn("", "  ");
        assert!(added.is_empty());
        assert_eq!(session.messages.len(), 1);
    }

    #[test]
    fn test_transcript_is_append_only_across_turns() {
        let mut session = ChatSession::new();
        session.record_turn("first", "one");
        session.record_turn("second", "two");
        let texts: Vec<_> = session.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "one", "second", "two"]);
    }

    #[test]
    fn test_set_emotion_tags_only_the_target() {
        let mut session = ChatSession::new();
        let added = session.record_turn("so angry today", "I hear you.");
        session.set_emotion(&added[0].id, Emotion::Anger);
        assert_eq!(session.messages[0].emotion, Some(Emotion::Anger));
        assert_eq!(session.messages[1].emotion, None);
        // Unknown ids are ignored.
        session.set_emotion("missing", Emotion::Joy);
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let mut session = ChatSession::new();
        let added = session.record_turn("hello", "");
        let json = serde_json::to_value(&added[0]).unwrap();
        assert_eq!(json["sender"], "user");
        assert!(json.get("timestamp").is_some());
        // Untagged messages omit the emotion field entirely.
        assert!(json.get("emotion").is_none());
    }
}
