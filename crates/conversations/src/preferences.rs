//! User research preferences.
//!
//! A flat list of free-text preference lines per user, kept in one JSON
//! file. The orchestrator caches the list on the turn state at turn start
//! so mid-turn edits never shift an in-flight prompt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use acre_domain::error::{Error, Result};

pub struct PreferenceStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl PreferenceStore {
    /// Load or create the store at `state_path/preferences.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("preferences.json");

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn get(&self, user_id: &str) -> Vec<String> {
        self.entries.read().get(user_id).cloned().unwrap_or_default()
    }

    /// Append one preference line and flush.
    pub fn add(&self, user_id: &str, preference: &str) -> Result<()> {
        let preference = preference.trim();
        if preference.is_empty() {
            return Ok(());
        }
        {
            let mut entries = self.entries.write();
            let list = entries.entry(user_id.to_string()).or_default();
            if !list.iter().any(|p| p == preference) {
                list.push(preference.to_string());
            }
        }
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let entries = self.entries.read();
        let json = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(&self.path, json).map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_survive_reload() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = PreferenceStore::new(tmp.path()).unwrap();
            store.add("u1", "prefer charts over tables").unwrap();
            store.add("u1", "focus on the Midwest").unwrap();
            store.add("u1", "prefer charts over tables").unwrap();
        }
        let store = PreferenceStore::new(tmp.path()).unwrap();
        assert_eq!(
            store.get("u1"),
            vec![
                "prefer charts over tables".to_string(),
                "focus on the Midwest".to_string()
            ]
        );
        assert!(store.get("u2").is_empty());
    }
}
