//! Queue-facing commands: enqueue, status, listing, manual retry.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core_state::CoreState;
use crate::models::{EntryState, QueueEntry};
use crate::pipeline::import::{is_within, move_into};
use crate::pipeline::intake::{enqueue, StabilityCheck};
use crate::pipeline::queue::{Admission, QueueCounts};
use crate::pipeline::slots::SlotStats;
use crate::pipeline::IngestError;

/// Result of a manual enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnqueueResponse {
    Queued { entry_id: Uuid },
    /// The same content is already waiting or being processed.
    AlreadyQueued { entry_id: Uuid },
    /// The same content was processed before; nothing was queued.
    Duplicate {
        content_hash: String,
        document_number: Option<String>,
    },
}

/// Status view of one queue entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub entry_id: Uuid,
    pub file_name: String,
    pub state: EntryState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub document_number: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl From<QueueEntry> for EntryStatus {
    fn from(entry: QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            file_name: entry.file_name,
            state: entry.state,
            attempts: entry.attempts,
            last_error: entry.last_error,
            document_number: entry.document_number,
            enqueued_at: entry.enqueued_at,
            updated_at: entry.updated_at,
            next_attempt_at: entry.next_attempt_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueOverview {
    pub counts: QueueCounts,
    pub slots: SlotStats,
}

/// Queue a file the caller uploaded or picked.
pub fn enqueue_file(state: &CoreState, file_path: &str) -> Result<EnqueueResponse, IngestError> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(IngestError::FileUnreadable {
            path: path.to_path_buf(),
            reason: "not a regular file".into(),
        });
    }

    match enqueue(state, path, StabilityCheck::from_config(state)) {
        Ok(Admission::Queued(entry_id)) => Ok(EnqueueResponse::Queued { entry_id }),
        Ok(Admission::AlreadyActive(entry_id)) => Ok(EnqueueResponse::AlreadyQueued { entry_id }),
        Err(IngestError::DuplicateContent {
            hash,
            document_number,
        }) => Ok(EnqueueResponse::Duplicate {
            content_hash: hash,
            document_number,
        }),
        Err(e) => Err(e),
    }
}

pub fn entry_status(state: &CoreState, entry_id: Uuid) -> Result<EntryStatus, IngestError> {
    state
        .queue()
        .get(entry_id)?
        .map(EntryStatus::from)
        .ok_or_else(|| IngestError::NotFound(format!("queue entry {entry_id}")))
}

/// Entries oldest first, optionally only those in `filter`.
pub fn list_entries(
    state: &CoreState,
    filter: Option<EntryState>,
) -> Result<Vec<EntryStatus>, IngestError> {
    Ok(state
        .queue()
        .entries()?
        .into_iter()
        .filter(|e| filter.map_or(true, |s| e.state == s))
        .map(EntryStatus::from)
        .collect())
}

pub fn queue_overview(state: &CoreState) -> Result<QueueOverview, IngestError> {
    Ok(QueueOverview {
        counts: state.queue().counts()?,
        slots: state.slots().stats(),
    })
}

/// Give a quarantined entry a fresh set of attempts. A file parked in the
/// quarantine directory is moved back to the inbox first.
pub fn retry_quarantined(state: &CoreState, entry_id: Uuid) -> Result<EntryStatus, IngestError> {
    let entry = state
        .queue()
        .get(entry_id)?
        .ok_or_else(|| IngestError::NotFound(format!("queue entry {entry_id}")))?;
    if entry.state != EntryState::Quarantined {
        return Err(IngestError::InvalidTransition {
            from: entry.state,
            to: EntryState::Queued,
        });
    }

    let new_path = if is_within(&entry.path, &state.config().quarantine_dir) {
        if !entry.path.is_file() {
            return Err(IngestError::SourceVanished(entry.path));
        }
        Some(move_into(&entry.path, &state.config().inbox_dir)?)
    } else {
        None
    };

    let updated = state.queue().requeue_quarantined(entry_id, new_path)?;
    tracing::info!(entry_id = %entry_id, file = %updated.file_name, "Quarantined entry retried");
    Ok(updated.into())
}
