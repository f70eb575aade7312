//! The archived shape of a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use acre_domain::message::{ConversationMessage, MessageKind, Role};

/// Title length ceiling, in characters.
const TITLE_MAX_CHARS: usize = 100;

const DEFAULT_TITLE: &str = "New Conversation";

/// One persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Owner. Anonymous callers share the `"anonymous"` id.
    pub user_id: String,
    /// Share-link path, `/research/{id}`.
    pub path: String,
    pub title: String,
    pub messages: Vec<ConversationMessage>,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            path: format!("/research/{id}"),
            id,
            created_at: Utc::now(),
            user_id: user_id.into(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
        }
    }
}

/// Derive a display title from the opening user message.
///
/// Input messages store their text JSON-encoded as `{"input": ...}`; fall
/// back to the raw content when decoding fails, and to a fixed default
/// when there is no user message at all. Bounded to [`TITLE_MAX_CHARS`].
pub fn derive_title(messages: &[ConversationMessage]) -> String {
    let first = messages
        .iter()
        .find(|m| m.role == Role::User && m.is_kind(MessageKind::Input));

    let Some(first) = first else {
        return DEFAULT_TITLE.to_string();
    };

    let text = serde_json::from_str::<serde_json::Value>(&first.content)
        .ok()
        .and_then(|v| v.get("input").and_then(|i| i.as_str()).map(str::to_string))
        .unwrap_or_else(|| first.content.clone());

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect()
}
