use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::EntryState;

/// One unit of pending or finished work in the ingest queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    /// Where the source PDF was when it was enqueued.
    pub path: PathBuf,
    pub file_name: String,
    pub content_hash: String,
    pub enqueued_at: DateTime<Utc>,
    pub state: EntryState,
    /// Number of processing attempts started (incremented on claim).
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Set once extraction produced a document number.
    #[serde(default)]
    pub document_number: Option<String>,
    /// Earliest time an ERROR entry may be retried.
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Every state this entry has been in, oldest first.
    #[serde(default)]
    pub history: Vec<EntryState>,
}

impl QueueEntry {
    pub fn new(path: PathBuf, content_hash: String) -> Self {
        let now = Utc::now();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            path,
            file_name,
            content_hash,
            enqueued_at: now,
            state: EntryState::Queued,
            attempts: 0,
            last_error: None,
            updated_at: now,
            document_number: None,
            next_attempt_at: None,
            history: vec![EntryState::Queued],
        }
    }

    /// Whether the entry still represents outstanding work.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            EntryState::Queued | EntryState::Processing | EntryState::Error
        )
    }

    /// Short hash prefix for log lines.
    pub fn short_hash(&self) -> &str {
        short_hash(&self.content_hash)
    }
}

pub fn short_hash(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(hash.len());
    &hash[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_starts_queued() {
        let entry = QueueEntry::new(PathBuf::from("/inbox/ddt_001.pdf"), "abc".into());
        assert_eq!(entry.state, EntryState::Queued);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.file_name, "ddt_001.pdf");
        assert_eq!(entry.history, vec![EntryState::Queued]);
        assert!(entry.is_active());
    }

    #[test]
    fn short_hash_truncates() {
        assert_eq!(short_hash("0123456789abcdefgh"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn legacy_entries_without_optional_fields_deserialize() {
        let json = r#"{
            "id": "6f1c1c1e-8a8b-4a51-9a0f-2a4d7a1c2b3d",
            "path": "/inbox/a.pdf",
            "file_name": "a.pdf",
            "content_hash": "h",
            "enqueued_at": "2026-01-01T00:00:00Z",
            "state": "QUEUED",
            "attempts": 0,
            "last_error": null,
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let entry: QueueEntry = serde_json::from_str(json).unwrap();
        assert!(entry.history.is_empty());
        assert!(entry.document_number.is_none());
    }
}
