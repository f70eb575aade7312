//! Conversation archive backed by one JSON file per conversation.
//!
//! Persisting is idempotent: the whole record is rewritten each time, so a
//! turn that re-saves after appending produces the same file as a single
//! save of the final state. Reads go through an in-memory cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use std::sync::Arc;

use acre_domain::error::{Error, Result};

use crate::record::ConversationRecord;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sink trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where committed conversations go. The orchestrator only sees this
/// trait; tests substitute an in-memory sink.
#[async_trait::async_trait]
pub trait ConversationSink: Send + Sync {
    async fn persist(&self, record: ConversationRecord) -> Result<()>;
    async fn load(&self, id: &str) -> Result<Option<ConversationRecord>>;
    /// All conversations owned by `user_id`, newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<ConversationRecord>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed archive
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FileArchive {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, ConversationRecord>>>,
}

impl FileArchive {
    /// Open (or create) the archive at `state_path/conversations/`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("conversations");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        tracing::info!(path = %dir.display(), "conversation archive opened");

        Ok(Self {
            dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn file_path(&self, id: &str) -> PathBuf {
        // Conversation ids are UUIDs; reject anything path-like.
        debug_assert!(!id.contains('/') && !id.contains('\\'));
        self.dir.join(format!("{id}.json"))
    }

    fn read_record(path: &Path) -> Result<ConversationRecord> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        serde_json::from_str(&raw).map_err(Error::Json)
    }
}

#[async_trait::async_trait]
impl ConversationSink for FileArchive {
    async fn persist(&self, record: ConversationRecord) -> Result<()> {
        let path = self.file_path(&record.id);
        let json = serde_json::to_string_pretty(&record)?;

        self.cache.write().insert(record.id.clone(), record.clone());

        let id = record.id.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&path, json).map_err(Error::Io))
            .await
            .map_err(|e| Error::Other(format!("archive write task: {e}")))??;

        tracing::debug!(
            conversation_id = %id,
            messages = record.messages.len(),
            "conversation persisted"
        );
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
        if let Some(record) = self.cache.read().get(id) {
            return Ok(Some(record.clone()));
        }

        let path = self.file_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let record =
            tokio::task::spawn_blocking(move || Self::read_record(&path))
                .await
                .map_err(|e| Error::Other(format!("archive read task: {e}")))??;

        self.cache.write().insert(id.to_string(), record.clone());
        Ok(Some(record))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<ConversationRecord>> {
        let dir = self.dir.clone();
        let user_id = user_id.to_string();

        let mut records = tokio::task::spawn_blocking(move || -> Result<Vec<ConversationRecord>> {
            let mut out = Vec::new();
            for entry in std::fs::read_dir(&dir).map_err(Error::Io)? {
                let entry = entry.map_err(Error::Io)?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Self::read_record(&path) {
                    Ok(record) if record.user_id == user_id => out.push(record),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Other(format!("archive list task: {e}")))??;

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
