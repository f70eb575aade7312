//! Turn-scoped conversation state cell.
//!
//! Owns the [`ConversationState`] for the duration of one turn. All
//! mutation within a turn is sequential (the turn body is one task with
//! internally-sequential awaits); the lock exists for the snapshot readers
//! on the API side, not for writer-writer races.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use acre_conversations::{derive_title, ConversationRecord, ConversationSink};
use acre_domain::error::{Error, Result};
use acre_domain::message::{ConversationMessage, ConversationState, MessageKind};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PrefView
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Narrow read-only view handed to nested components (the research loop
/// needs the cached preferences without being able to mutate the store).
#[derive(Debug, Clone)]
pub struct PrefView {
    pub conversation_id: String,
    pub preferences: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateCell
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StateCell {
    state: Mutex<ConversationState>,
    user_id: String,
    sink: Arc<dyn ConversationSink>,
    committed: AtomicBool,
}

impl StateCell {
    pub fn new(
        state: ConversationState,
        user_id: impl Into<String>,
        sink: Arc<dyn ConversationSink>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            user_id: user_id.into(),
            sink,
            committed: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.lock().clone()
    }

    pub fn conversation_id(&self) -> String {
        self.state.lock().conversation_id.clone()
    }

    /// Append one message to the transcript.
    pub fn append(&self, message: ConversationMessage) {
        self.state.lock().messages.push(message);
    }

    pub fn set_preferences(&self, preferences: Vec<String>) {
        self.state.lock().cached_preferences = Some(preferences);
    }

    pub fn prefs_view(&self) -> PrefView {
        let state = self.state.lock();
        PrefView {
            conversation_id: state.conversation_id.clone(),
            preferences: state.cached_preferences.clone().unwrap_or_default(),
        }
    }

    /// Merge a whole next-state, last-write-wins per field. The message
    /// list must be a strict extension of the current one; a shrinking or
    /// diverging list is a programming error, not a race to paper over.
    pub fn accumulate(&self, next: ConversationState) -> Result<()> {
        let mut state = self.state.lock();

        if next.messages.len() < state.messages.len() {
            return Err(Error::StateRegression(format!(
                "message list shrank: {} -> {}",
                state.messages.len(),
                next.messages.len()
            )));
        }
        for (current, incoming) in state.messages.iter().zip(next.messages.iter()) {
            if current.id != incoming.id {
                return Err(Error::StateRegression(format!(
                    "message list diverged at id {}",
                    current.id
                )));
            }
        }

        *state = next;
        Ok(())
    }

    /// Persist the accumulated state, at most once per turn.
    ///
    /// Skipped entirely (debug-logged, `Ok(false)`) when the conversation
    /// id is missing/placeholder or no `answer`-kind message exists yet;
    /// partial/aborted turns are never persisted. On a real commit the
    /// stored message list is the accumulated list plus exactly one
    /// trailing `end` sentinel.
    pub async fn commit(&self) -> Result<bool> {
        let snapshot = self.snapshot();

        if !snapshot.is_committable() {
            tracing::debug!(
                conversation_id = %snapshot.conversation_id,
                messages = snapshot.messages.len(),
                has_answer = snapshot.has_kind(MessageKind::Answer),
                "commit skipped"
            );
            return Ok(false);
        }

        if self.committed.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                conversation_id = %snapshot.conversation_id,
                "commit already performed this turn"
            );
            return Ok(false);
        }

        let mut record = match self.sink.load(&snapshot.conversation_id).await? {
            Some(existing) => existing,
            None => ConversationRecord::new(&snapshot.conversation_id, &self.user_id),
        };

        record.messages = snapshot.messages;
        record.messages.push(ConversationMessage::end_sentinel());
        record.title = derive_title(&record.messages);

        tracing::info!(
            conversation_id = %record.id,
            messages = record.messages.len(),
            "committing conversation"
        );
        self.sink.persist(record).await?;
        Ok(true)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use acre_domain::message::PENDING_CONVERSATION_ID;
    use parking_lot::Mutex as PlMutex;

    /// In-memory sink counting persist calls.
    #[derive(Default)]
    struct MemSink {
        persisted: PlMutex<Vec<ConversationRecord>>,
    }

    #[async_trait::async_trait]
    impl ConversationSink for MemSink {
        async fn persist(&self, record: ConversationRecord) -> Result<()> {
            self.persisted.lock().push(record);
            Ok(())
        }
        async fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
            Ok(self
                .persisted
                .lock()
                .iter()
                .rev()
                .find(|r| r.id == id)
                .cloned())
        }
        async fn list(&self, _user_id: &str) -> Result<Vec<ConversationRecord>> {
            Ok(self.persisted.lock().clone())
        }
    }

    fn cell_with(id: &str, sink: Arc<MemSink>) -> StateCell {
        StateCell::new(ConversationState::new(id), "u1", sink)
    }

    #[tokio::test]
    async fn commit_skipped_without_answer() {
        let sink = Arc::new(MemSink::default());
        let cell = cell_with("c1", sink.clone());
        cell.append(ConversationMessage::user(MessageKind::Input, "{}"));

        assert!(!cell.commit().await.unwrap());
        assert!(sink.persisted.lock().is_empty());
    }

    #[tokio::test]
    async fn commit_skipped_for_placeholder_id() {
        let sink = Arc::new(MemSink::default());
        let cell = cell_with(PENDING_CONVERSATION_ID, sink.clone());
        cell.append(ConversationMessage::assistant(MessageKind::Answer, "a"));

        assert!(!cell.commit().await.unwrap());
        assert!(sink.persisted.lock().is_empty());
    }

    #[tokio::test]
    async fn commit_persists_once_with_one_end_sentinel() {
        let sink = Arc::new(MemSink::default());
        let cell = cell_with("c1", sink.clone());
        cell.append(ConversationMessage::user(MessageKind::Input, r#"{"input":"q"}"#));
        cell.append(ConversationMessage::assistant(MessageKind::Answer, "a"));

        assert!(cell.commit().await.unwrap());
        assert!(!cell.commit().await.unwrap());

        let persisted = sink.persisted.lock();
        assert_eq!(persisted.len(), 1);
        let messages = &persisted[0].messages;
        assert_eq!(messages.len(), 3);
        let ends = messages.iter().filter(|m| m.is_kind(MessageKind::End)).count();
        assert_eq!(ends, 1);
        assert!(messages.last().unwrap().is_kind(MessageKind::End));
    }

    #[tokio::test]
    async fn accumulate_rejects_shrinking_list() {
        let sink = Arc::new(MemSink::default());
        let cell = cell_with("c1", sink);
        cell.append(ConversationMessage::user(MessageKind::Input, "{}"));

        let shrunk = ConversationState::new("c1");
        assert!(matches!(
            cell.accumulate(shrunk),
            Err(Error::StateRegression(_))
        ));
    }

    #[tokio::test]
    async fn accumulate_accepts_strict_extension() {
        let sink = Arc::new(MemSink::default());
        let cell = cell_with("c1", sink);
        cell.append(ConversationMessage::user(MessageKind::Input, "{}"));

        let mut next = cell.snapshot();
        next.messages
            .push(ConversationMessage::assistant(MessageKind::Answer, "a"));
        next.cached_preferences = Some(vec!["prefers charts".into()]);
        cell.accumulate(next).unwrap();

        let state = cell.snapshot();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.cached_preferences.unwrap().len(), 1);
    }
}
