//! The conversation transcript model.
//!
//! The transcript is a string log, not a typed object log: every entry is a
//! [`ConversationMessage`] whose `content` is plain text or a JSON-encoded
//! string, and whose `kind` refines the role for rendering and persistence
//! decisions. Entries are immutable once appended; the list only grows.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Roles and kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// Discriminator refining role semantics for rendering and persistence.
///
/// Messages without a kind, and `End` sentinels, never render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Input,
    InputRelated,
    Inquiry,
    Skip,
    Answer,
    Related,
    Followup,
    Tool,
    End,
    Preference,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One entry in the durable transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique within a conversation (not globally).
    pub id: String,
    pub role: Role,
    /// Plain text, or a JSON-encoded string for structured payloads.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    /// Present only on tool messages; names the producing tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ConversationMessage {
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            kind: Some(kind),
            name: None,
        }
    }

    /// A user-role message carrying JSON content.
    pub fn user(kind: MessageKind, content: impl Into<String>) -> Self {
        Self::new(Role::User, kind, content)
    }

    pub fn assistant(kind: MessageKind, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, kind, content)
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, MessageKind::Tool, content);
        msg.name = Some(name.into());
        msg
    }

    /// The terminal sentinel appended at commit time. Never rendered.
    pub fn end_sentinel() -> Self {
        Self::new(Role::Assistant, MessageKind::End, "")
    }

    pub fn is_kind(&self, kind: MessageKind) -> bool {
        self.kind == Some(kind)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Placeholder id used before a conversation has been assigned one.
/// State carrying it is never persisted.
pub const PENDING_CONVERSATION_ID: &str = "pending";

/// The state owned by the turn orchestrator for one turn, and the shape
/// the projector reads back from the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub messages: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_preferences: Option<Vec<String>>,
    /// When set, the projector hides related/followup entries.
    #[serde(default)]
    pub is_share_view: bool,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            cached_preferences: None,
            is_share_view: false,
        }
    }

    /// The most recent message of the given kind, if any.
    ///
    /// Single scan from the tail; callers hold the returned reference
    /// instead of re-filtering the history at each use site.
    pub fn last_of_kind(&self, kind: MessageKind) -> Option<&ConversationMessage> {
        self.messages.iter().rev().find(|m| m.is_kind(kind))
    }

    pub fn has_kind(&self, kind: MessageKind) -> bool {
        self.messages.iter().any(|m| m.is_kind(kind))
    }

    /// Whether this state may be persisted at all: a real conversation id
    /// and at least one answer-kind message.
    pub fn is_committable(&self) -> bool {
        !self.conversation_id.is_empty()
            && self.conversation_id != PENDING_CONVERSATION_ID
            && self.has_kind(MessageKind::Answer)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        let msg = ConversationMessage::user(MessageKind::InputRelated, "{}");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "input_related");
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn tool_message_carries_name() {
        let msg = ConversationMessage::tool("search", r#"{"results":[]}"#);
        assert_eq!(msg.name.as_deref(), Some("search"));
        assert!(msg.is_kind(MessageKind::Tool));
    }

    #[test]
    fn last_of_kind_returns_most_recent() {
        let mut state = ConversationState::new("c1");
        state
            .messages
            .push(ConversationMessage::assistant(MessageKind::Answer, "first"));
        state
            .messages
            .push(ConversationMessage::user(MessageKind::Input, "q"));
        state
            .messages
            .push(ConversationMessage::assistant(MessageKind::Answer, "second"));
        assert_eq!(
            state.last_of_kind(MessageKind::Answer).unwrap().content,
            "second"
        );
    }

    #[test]
    fn committable_requires_answer_and_real_id() {
        let mut state = ConversationState::new(PENDING_CONVERSATION_ID);
        state
            .messages
            .push(ConversationMessage::assistant(MessageKind::Answer, "a"));
        assert!(!state.is_committable());

        let mut state = ConversationState::new("c1");
        state
            .messages
            .push(ConversationMessage::user(MessageKind::Input, "q"));
        assert!(!state.is_committable());

        state
            .messages
            .push(ConversationMessage::assistant(MessageKind::Answer, "a"));
        assert!(state.is_committable());
    }
}
