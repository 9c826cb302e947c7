//! Durable ingest queue.
//!
//! The queue is a JSON file holding every `QueueEntry`. It is read on first
//! use (never at construction) and rewritten atomically after every state
//! transition, so pending work survives a restart. All access goes through
//! one private mutex; `claim()` transitions the chosen entry while holding
//! it, so two callers can never claim the same entry.
//!
//! Job outcomes (`complete`, `fail`) are never lost to a failed write: the
//! new state is published in memory and flushed by the next successful write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::import::write_atomically;
use super::IngestError;
use crate::models::{EntryState, QueueEntry};

const QUEUE_FILE_VERSION: u32 = 1;

/// Write attempts for a job outcome before it is kept in memory only.
const OUTCOME_WRITE_ATTEMPTS: u32 = 3;
const OUTCOME_WRITE_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    entries: Vec<QueueEntry>,
}

#[derive(Debug, Default)]
struct QueueState {
    loaded: bool,
    entries: Vec<QueueEntry>,
    /// In-memory entries are ahead of the file.
    unsaved: bool,
}

/// Outcome of adding a file to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued(Uuid),
    /// Same content is already waiting or being processed.
    AlreadyActive(Uuid),
}

impl Admission {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Queued(id) | Self::AlreadyActive(id) => *id,
        }
    }
}

/// Entry counts per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub by_state: BTreeMap<String, usize>,
    pub total: usize,
}

impl QueueCounts {
    pub fn get(&self, state: EntryState) -> usize {
        self.by_state.get(state.as_str()).copied().unwrap_or(0)
    }
}

pub struct IngestQueue {
    path: PathBuf,
    max_pending: usize,
    state: Mutex<QueueState>,
}

impl IngestQueue {
    /// No I/O happens here; the file is read on first access.
    pub fn new(path: &Path, max_pending: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            max_pending,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().map(|s| s.loaded).unwrap_or(false)
    }

    /// True while a recorded outcome has not reached the queue file yet.
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.lock().map(|s| s.unsaved).unwrap_or(false)
    }

    // ── Producers ───────────────────────────────────────────

    /// Add a file. Content already active in the queue returns its entry.
    pub fn push(&self, path: &Path, content_hash: &str) -> Result<Admission, IngestError> {
        self.mutate(|entries| {
            if let Some(existing) = entries
                .iter()
                .find(|e| e.content_hash == content_hash && e.is_active())
            {
                return Ok(Admission::AlreadyActive(existing.id));
            }

            let pending = entries
                .iter()
                .filter(|e| e.state == EntryState::Queued)
                .count();
            if pending >= self.max_pending {
                return Err(IngestError::CapacityExceeded {
                    pending,
                    max: self.max_pending,
                });
            }

            let entry = QueueEntry::new(path.to_path_buf(), content_hash.to_string());
            let id = entry.id;
            tracing::info!(
                entry_id = %id,
                file = %entry.file_name,
                hash = %entry.short_hash(),
                "Entry queued"
            );
            entries.push(entry);
            Ok(Admission::Queued(id))
        })
    }

    // ── Consumers ───────────────────────────────────────────

    /// Take the oldest QUEUED entry and mark it PROCESSING.
    ///
    /// ERROR entries whose backoff has elapsed are promoted back to QUEUED
    /// first, so they compete by their original enqueue time.
    pub fn claim(&self) -> Result<Option<QueueEntry>, IngestError> {
        let now = Utc::now();
        self.mutate(|entries| {
            for entry in entries.iter_mut().filter(|e| {
                e.state == EntryState::Error && e.next_attempt_at.map_or(true, |at| at <= now)
            }) {
                transition(entry, EntryState::Queued, now)?;
                entry.next_attempt_at = None;
                tracing::debug!(entry_id = %entry.id, attempts = entry.attempts, "Entry re-queued for retry");
            }

            let Some(entry) = entries
                .iter_mut()
                .filter(|e| e.state == EntryState::Queued)
                .min_by_key(|e| e.enqueued_at)
            else {
                return Ok(None);
            };

            transition(entry, EntryState::Processing, now)?;
            entry.attempts += 1;
            tracing::debug!(
                entry_id = %entry.id,
                file = %entry.file_name,
                attempt = entry.attempts,
                "Entry claimed"
            );
            Ok(Some(entry.clone()))
        })
    }

    /// Move a PROCESSING entry to DONE or DUPLICATE.
    pub fn complete(
        &self,
        id: Uuid,
        outcome: EntryState,
        document_number: Option<&str>,
        note: Option<String>,
    ) -> Result<QueueEntry, IngestError> {
        if !matches!(outcome, EntryState::Done | EntryState::Duplicate) {
            return Err(IngestError::InvalidTransition {
                from: EntryState::Processing,
                to: outcome,
            });
        }
        let now = Utc::now();
        self.settle(|entries| {
            let entry = find_mut(entries, id)?;
            transition(entry, outcome, now)?;
            if let Some(number) = document_number {
                entry.document_number = Some(number.to_string());
            }
            entry.last_error = note;
            tracing::info!(
                entry_id = %id,
                file = %entry.file_name,
                state = %outcome,
                document_number = entry.document_number.as_deref().unwrap_or("-"),
                "Entry finished"
            );
            Ok(entry.clone())
        })
    }

    /// Record a failed attempt.
    ///
    /// The entry always passes through ERROR. Transient failures with
    /// attempts left stay there until `retry_after` has elapsed; anything
    /// else ends in QUARANTINED.
    pub fn fail(
        &self,
        id: Uuid,
        error: &IngestError,
        max_attempts: u32,
        retry_after: Duration,
    ) -> Result<QueueEntry, IngestError> {
        let now = Utc::now();
        self.settle(|entries| {
            let entry = find_mut(entries, id)?;
            transition(entry, EntryState::Error, now)?;
            entry.last_error = Some(error.to_string());

            if error.is_transient() && entry.attempts < max_attempts {
                let delay = chrono::Duration::from_std(retry_after)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                entry.next_attempt_at = Some(now + delay);
                tracing::info!(
                    entry_id = %id,
                    attempt = entry.attempts,
                    max_attempts,
                    retry_in = ?retry_after,
                    error = %error,
                    "Attempt failed, will retry"
                );
            } else {
                transition(entry, EntryState::Quarantined, now)?;
                entry.next_attempt_at = None;
                tracing::warn!(
                    entry_id = %id,
                    file = %entry.file_name,
                    attempts = entry.attempts,
                    error = %error,
                    "Entry quarantined"
                );
            }
            Ok(entry.clone())
        })
    }

    /// Manual retry of a quarantined entry, optionally from a new location.
    pub fn requeue_quarantined(
        &self,
        id: Uuid,
        path: Option<PathBuf>,
    ) -> Result<QueueEntry, IngestError> {
        let now = Utc::now();
        self.mutate(|entries| {
            let entry = find_mut(entries, id)?;
            if entry.state != EntryState::Quarantined {
                return Err(IngestError::InvalidTransition {
                    from: entry.state,
                    to: EntryState::Queued,
                });
            }
            transition(entry, EntryState::Queued, now)?;
            entry.attempts = 0;
            entry.next_attempt_at = None;
            if let Some(path) = path {
                entry.path = path;
            }
            tracing::info!(entry_id = %id, "Quarantined entry re-queued");
            Ok(entry.clone())
        })
    }

    /// Point an entry at the file's new location after it was moved.
    pub fn relocate(&self, id: Uuid, path: &Path) -> Result<(), IngestError> {
        self.mutate(|entries| {
            let entry = find_mut(entries, id)?;
            entry.path = path.to_path_buf();
            entry.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Drop terminal entries last touched before `now - retention`.
    pub fn prune_terminal(&self, retention: Duration) -> Result<usize, IngestError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        {
            let state = self.lock_loaded()?;
            if !state
                .entries
                .iter()
                .any(|e| e.state.is_terminal() && e.updated_at < cutoff)
            {
                return Ok(0);
            }
        }
        self.mutate(|entries| {
            let before = entries.len();
            entries.retain(|e| !(e.state.is_terminal() && e.updated_at < cutoff));
            let removed = before - entries.len();
            tracing::info!(removed, "Pruned finished queue entries");
            Ok(removed)
        })
    }

    // ── Queries ─────────────────────────────────────────────

    pub fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, IngestError> {
        let state = self.lock_loaded()?;
        Ok(state.entries.iter().find(|e| e.id == id).cloned())
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Result<Vec<QueueEntry>, IngestError> {
        let state = self.lock_loaded()?;
        let mut entries = state.entries.clone();
        entries.sort_by_key(|e| e.enqueued_at);
        Ok(entries)
    }

    pub fn counts(&self) -> Result<QueueCounts, IngestError> {
        let state = self.lock_loaded()?;
        let mut counts = QueueCounts {
            total: state.entries.len(),
            ..Default::default()
        };
        for entry in &state.entries {
            *counts
                .by_state
                .entry(entry.state.as_str().to_string())
                .or_default() += 1;
        }
        Ok(counts)
    }

    // ── Internal ────────────────────────────────────────────

    fn lock_loaded(&self) -> Result<MutexGuard<'_, QueueState>, IngestError> {
        let mut state = self.state.lock().map_err(|_| IngestError::LockPoisoned)?;
        if !state.loaded {
            let (entries, recovered) = self.load()?;
            state.entries = entries;
            state.loaded = true;
            if recovered > 0 {
                self.persist(&state.entries)?;
            }
        }
        Ok(state)
    }

    /// Apply `f` to a copy of the entries, persist, then publish. A failed
    /// mutation or write leaves the in-memory queue untouched.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<QueueEntry>) -> Result<R, IngestError>,
    ) -> Result<R, IngestError> {
        let mut state = self.lock_loaded()?;
        let mut working = state.entries.clone();
        let result = f(&mut working)?;
        if working != state.entries || state.unsaved {
            self.persist(&working)?;
            state.entries = working;
            if state.unsaved {
                state.unsaved = false;
                tracing::info!(path = %self.path.display(), "Queue file caught up");
            }
        }
        Ok(result)
    }

    /// Like `mutate`, for job outcomes. The write is retried with backoff;
    /// if it still fails the new state is published anyway and marked
    /// unsaved, so the entry never stays PROCESSING after its slot is gone.
    /// The next successful write carries it to disk.
    fn settle<R>(
        &self,
        f: impl FnOnce(&mut Vec<QueueEntry>) -> Result<R, IngestError>,
    ) -> Result<R, IngestError> {
        let mut state = self.lock_loaded()?;
        let mut working = state.entries.clone();
        let result = f(&mut working)?;

        let mut delay = OUTCOME_WRITE_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.persist(&working) {
                Ok(()) => {
                    state.unsaved = false;
                    break;
                }
                Err(e) if attempt < OUTCOME_WRITE_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "Queue write failed, retrying");
                    std::thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %e,
                        "Queue write failed; outcome kept in memory until the next write"
                    );
                    state.unsaved = true;
                    break;
                }
            }
        }
        state.entries = working;
        Ok(result)
    }

    fn load(&self) -> Result<(Vec<QueueEntry>, usize), IngestError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No queue file yet");
                return Ok((Vec::new(), 0));
            }
            Err(e) => return Err(e.into()),
        };
        let file: QueueFile = serde_json::from_slice(&raw)?;

        let now = Utc::now();
        let mut entries = file.entries;
        let mut recovered = 0;
        for entry in entries.iter_mut().filter(|e| e.state == EntryState::Processing) {
            transition(entry, EntryState::Queued, now)?;
            recovered += 1;
            tracing::warn!(
                entry_id = %entry.id,
                file = %entry.file_name,
                "Entry was PROCESSING at shutdown, re-queued"
            );
        }
        tracing::info!(
            path = %self.path.display(),
            entries = entries.len(),
            recovered,
            "Queue loaded"
        );
        Ok((entries, recovered))
    }

    fn persist(&self, entries: &[QueueEntry]) -> Result<(), IngestError> {
        let file = QueueFile {
            version: QUEUE_FILE_VERSION,
            entries: entries.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomically(&self.path, &bytes)?;
        Ok(())
    }
}

fn find_mut(entries: &mut [QueueEntry], id: Uuid) -> Result<&mut QueueEntry, IngestError> {
    entries
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| IngestError::NotFound(format!("queue entry {id}")))
}

fn transition(
    entry: &mut QueueEntry,
    next: EntryState,
    now: DateTime<Utc>,
) -> Result<(), IngestError> {
    if !entry.state.can_transition_to(next) {
        return Err(IngestError::InvalidTransition {
            from: entry.state,
            to: next,
        });
    }
    entry.state = next;
    entry.updated_at = now;
    entry.history.push(next);
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    fn queue_in(dir: &Path, max_pending: usize) -> IngestQueue {
        IngestQueue::new(&dir.join("queue.json"), max_pending)
    }

    #[test]
    fn construction_does_no_io() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("queue.json"), b"not json").unwrap();
        let queue = queue_in(dir.path(), 10);
        assert!(!queue.is_loaded());
        // First access surfaces the corrupt file.
        assert!(matches!(queue.entries(), Err(IngestError::Serialization(_))));
    }

    #[test]
    fn push_then_claim_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let first = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        std::thread::sleep(Duration::from_millis(2));
        let _second = queue.push(Path::new("/inbox/b.pdf"), "h2").unwrap();

        let claimed = queue.claim().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.state, EntryState::Processing);
        assert_eq!(claimed.attempts, 1);
    }

    #[test]
    fn claim_on_empty_queue_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        assert!(queue.claim().unwrap().is_none());
        // Nothing changed, so nothing was written.
        assert!(!dir.path().join("queue.json").exists());
    }

    #[test]
    fn same_hash_is_not_queued_twice() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let first = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap();
        let second = queue.push(Path::new("/inbox/a copy.pdf"), "h1").unwrap();
        assert_eq!(second, Admission::AlreadyActive(first.id()));
        assert_eq!(queue.entries().unwrap().len(), 1);
    }

    #[test]
    fn same_name_different_content_are_separate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let a = queue.push(Path::new("/inbox/scan.pdf"), "h1").unwrap().id();
        let b = queue.push(Path::new("/inbox/scan.pdf"), "h2").unwrap().id();
        assert_ne!(a, b);
    }

    #[test]
    fn capacity_exceeded_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 2);
        queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap();
        queue.push(Path::new("/inbox/b.pdf"), "h2").unwrap();
        let err = queue.push(Path::new("/inbox/c.pdf"), "h3").unwrap_err();
        assert!(matches!(err, IngestError::CapacityExceeded { pending: 2, max: 2 }));

        // Claiming frees room.
        queue.claim().unwrap().unwrap();
        assert!(queue.push(Path::new("/inbox/c.pdf"), "h3").is_ok());
    }

    #[test]
    fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let queue = queue_in(dir.path(), 10);
            queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id()
        };
        let reopened = queue_in(dir.path(), 10);
        let entry = reopened.get(id).unwrap().unwrap();
        assert_eq!(entry.state, EntryState::Queued);
        assert_eq!(entry.content_hash, "h1");
    }

    #[test]
    fn processing_entries_recovered_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let queue = queue_in(dir.path(), 10);
            let id = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
            queue.claim().unwrap().unwrap();
            id
        };
        let reopened = queue_in(dir.path(), 10);
        let entry = reopened.get(id).unwrap().unwrap();
        assert_eq!(entry.state, EntryState::Queued);
        assert_eq!(entry.attempts, 1);
        assert_eq!(
            entry.history,
            vec![EntryState::Queued, EntryState::Processing, EntryState::Queued]
        );
    }

    #[test]
    fn transient_failure_retries_then_quarantines() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let id = queue.push(Path::new("/inbox/b.pdf"), "hb").unwrap().id();

        for attempt in 1..=3 {
            let claimed = queue.claim().unwrap().unwrap();
            assert_eq!(claimed.attempts, attempt);
            let after = queue
                .fail(id, &IngestError::ExtractionTimeout, 3, Duration::ZERO)
                .unwrap();
            if attempt < 3 {
                assert_eq!(after.state, EntryState::Error);
            } else {
                assert_eq!(after.state, EntryState::Quarantined);
            }
        }

        assert!(queue.claim().unwrap().is_none());
        let entry = queue.get(id).unwrap().unwrap();
        assert_eq!(entry.last_error.as_deref(), Some("Extraction timed out"));
    }

    #[test]
    fn backoff_delays_retry() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let id = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        queue.claim().unwrap().unwrap();
        queue
            .fail(id, &IngestError::ExtractionTimeout, 3, Duration::from_secs(3600))
            .unwrap();
        assert!(queue.claim().unwrap().is_none());
        assert_eq!(queue.get(id).unwrap().unwrap().state, EntryState::Error);
    }

    #[test]
    fn permanent_failure_quarantines_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let id = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        queue.claim().unwrap().unwrap();
        let entry = queue
            .fail(
                id,
                &IngestError::ExtractionInvalidResult("missing sender".into()),
                3,
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(entry.state, EntryState::Quarantined);
        assert_eq!(
            entry.history,
            vec![
                EntryState::Queued,
                EntryState::Processing,
                EntryState::Error,
                EntryState::Quarantined
            ]
        );
    }

    #[test]
    fn complete_rejects_non_terminal_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let id = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        queue.claim().unwrap().unwrap();
        assert!(queue.complete(id, EntryState::Error, None, None).is_err());
        let done = queue.complete(id, EntryState::Done, Some("D1"), None).unwrap();
        assert_eq!(done.document_number.as_deref(), Some("D1"));
        // Terminal entries cannot be completed again.
        assert!(matches!(
            queue.complete(id, EntryState::Done, None, None),
            Err(IngestError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn quarantined_entry_can_be_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let id = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        queue.claim().unwrap().unwrap();
        queue
            .fail(id, &IngestError::ExtractionInvalidDocument("blank".into()), 3, Duration::ZERO)
            .unwrap();

        let entry = queue
            .requeue_quarantined(id, Some(PathBuf::from("/quarantine/a.pdf")))
            .unwrap();
        assert_eq!(entry.state, EntryState::Queued);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.path, PathBuf::from("/quarantine/a.pdf"));
    }

    #[test]
    fn prune_removes_only_old_terminal_entries() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path(), 10);
        let done = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        queue.push(Path::new("/inbox/b.pdf"), "h2").unwrap();
        queue.claim().unwrap().unwrap();
        queue.complete(done, EntryState::Done, Some("D1"), None).unwrap();

        assert_eq!(queue.prune_terminal(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(queue.prune_terminal(Duration::ZERO).unwrap(), 1);
        let remaining = queue.entries().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].state, EntryState::Queued);
    }

    #[test]
    fn outcome_survives_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let queue = queue_in(dir.path(), 10);
        let id = queue.push(Path::new("/inbox/a.pdf"), "h1").unwrap().id();
        queue.claim().unwrap().unwrap();

        // A directory in place of the file makes every rename fail, root or not.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), b"x").unwrap();

        let done = queue.complete(id, EntryState::Done, Some("D1"), None).unwrap();
        assert_eq!(done.state, EntryState::Done);
        assert!(queue.has_unsaved_changes());
        assert_eq!(queue.counts().unwrap().get(EntryState::Processing), 0);
        // Other writers still see the failure.
        assert!(queue.push(Path::new("/inbox/b.pdf"), "h2").is_err());

        std::fs::remove_dir_all(&path).unwrap();
        assert!(queue.claim().unwrap().is_none());
        assert!(!queue.has_unsaved_changes());

        let reopened = queue_in(dir.path(), 10);
        assert_eq!(reopened.get(id).unwrap().unwrap().state, EntryState::Done);
    }

    #[test]
    fn concurrent_claims_never_share_an_entry() {
        const ENTRIES: usize = 40;
        const CLAIMERS: usize = 8;
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(queue_in(dir.path(), 100));
        for i in 0..ENTRIES {
            queue
                .push(Path::new(&format!("/inbox/{i}.pdf")), &format!("h{i}"))
                .unwrap();
        }

        let barrier = Arc::new(Barrier::new(CLAIMERS));
        let handles: Vec<_> = (0..CLAIMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let mut mine = Vec::new();
                    while let Some(entry) = queue.claim().unwrap() {
                        mine.push(entry.id);
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "entry {id} claimed twice");
            }
        }
        assert_eq!(seen.len(), ENTRIES);
        assert_eq!(queue.counts().unwrap().get(EntryState::Processing), ENTRIES);
    }
}
