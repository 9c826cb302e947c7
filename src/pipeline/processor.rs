//! Runs one claimed queue entry to a new state.
//!
//! Flow: read source → dedup by hash → extract (+ rule re-run) → validate
//! → claim document number → archive → table upsert → dedup record.
//! A claim whose later steps fail is released again.
//! The caller's `SlotToken` is moved in and dropped when this returns,
//! after the queue has recorded the outcome.

use std::path::Path;

use chrono::Utc;

use super::dedup::DedupCheck;
use super::extraction::{collapse_whitespace, validate_fields, RuleHints};
use super::import::{archive_source, hash_bytes, is_within, move_into};
use super::slots::SlotToken;
use super::table::Upsert;
use super::IngestError;
use crate::core_state::CoreState;
use crate::models::{short_hash, DocumentRow, EntryState, QueueEntry, RecordStatus};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

enum Completion {
    Done {
        document_number: String,
        upsert: Upsert,
    },
    Duplicate {
        document_number: Option<String>,
        reason: IngestError,
    },
}

/// A validated row plus the rule that shaped it.
pub(crate) struct Extraction {
    pub row: DocumentRow,
    pub rule_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Process a PROCESSING entry while holding `slot`. Returns the entry as
/// recorded in the queue afterwards.
pub fn process_entry(
    state: &CoreState,
    entry: QueueEntry,
    slot: SlotToken<'_>,
) -> Result<QueueEntry, IngestError> {
    let span = tracing::info_span!("process", entry_id = %entry.id, file = %entry.file_name);
    let _enter = span.enter();
    tracing::debug!(attempt = entry.attempts, hash = %entry.short_hash(), "Processing started");

    let result = match execute(state, &entry) {
        Ok(Completion::Done {
            document_number,
            upsert,
        }) => {
            let updated = state
                .queue()
                .complete(entry.id, EntryState::Done, Some(&document_number), None)?;
            if is_within(&entry.path, &state.config().inbox_dir) {
                if let Err(e) = std::fs::remove_file(&entry.path) {
                    tracing::warn!(error = %e, "Could not remove processed file from inbox");
                }
            }
            tracing::info!(
                document_number = %document_number,
                upsert = ?upsert,
                held_ms = slot.held_for().as_millis() as u64,
                "Document stored"
            );
            updated
        }
        Ok(Completion::Duplicate {
            document_number,
            reason,
        }) => {
            let updated = state.queue().complete(
                entry.id,
                EntryState::Duplicate,
                document_number.as_deref(),
                Some(reason.to_string()),
            )?;
            park_file(state, &entry, &state.config().duplicates_dir());
            updated
        }
        Err(error) => {
            let retry_after = retry_delay(state, &entry, &error);
            let updated = state
                .queue()
                .fail(entry.id, &error, state.config().max_attempts, retry_after)?;
            if updated.state == EntryState::Quarantined {
                park_file(state, &entry, &state.config().quarantine_dir);
            }
            updated
        }
    };

    Ok(result)
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn execute(state: &CoreState, entry: &QueueEntry) -> Result<Completion, IngestError> {
    let bytes = read_source(&entry.path)?;
    if !bytes.starts_with(b"%PDF") {
        return Err(IngestError::UnsupportedFileType {
            path: entry.path.clone(),
            detected: "not a PDF".into(),
        });
    }

    let hash = hash_bytes(&bytes);
    if hash != entry.content_hash {
        tracing::warn!(
            queued_hash = %entry.short_hash(),
            current_hash = %short_hash(&hash),
            "Source changed since it was queued; using current content"
        );
    }

    if let DedupCheck::SeenSameHash { document_number } = state.dedup().check(&hash, None)? {
        return Ok(Completion::Duplicate {
            reason: IngestError::DuplicateContent {
                hash,
                document_number: Some(document_number.clone()),
            },
            document_number: Some(document_number),
        });
    }

    let Extraction { row, rule_id } = extract_document(state, &bytes, None, Utc::now().date_naive())?;
    let document_number = row.document_number.clone();

    match state
        .dedup()
        .claim_document_number(&hash, &document_number, Utc::now())?
    {
        DedupCheck::New => {}
        DedupCheck::SeenSameHash { document_number } => {
            return Ok(Completion::Duplicate {
                reason: IngestError::DuplicateContent {
                    hash,
                    document_number: Some(document_number.clone()),
                },
                document_number: Some(document_number),
            });
        }
        DedupCheck::SeenDifferentHashSameDocNumber { existing_hash } => {
            return Ok(Completion::Duplicate {
                reason: IngestError::DuplicateDocumentNumber {
                    document_number: document_number.clone(),
                    existing_hash,
                },
                document_number: Some(document_number),
            });
        }
    }

    match store_claimed(state, entry, &hash, row, rule_id.as_deref()) {
        Ok(upsert) => Ok(Completion::Done {
            document_number,
            upsert,
        }),
        Err(e) => {
            if let Err(release) = state.dedup().release_claim(&hash) {
                tracing::error!(error = %release, "Could not release document number claim");
            }
            Err(e)
        }
    }
}

/// Archive, write the table row and complete the claimed dedup record.
fn store_claimed(
    state: &CoreState,
    entry: &QueueEntry,
    hash: &str,
    row: DocumentRow,
    rule_id: Option<&str>,
) -> Result<Upsert, IngestError> {
    let document_number = row.document_number.clone();
    let archived = archive_source(&entry.path, &state.config().archive_dir, hash)?;
    let upsert = state.table().update_or_append(row)?;
    state.dedup().record(
        hash,
        &document_number,
        Utc::now(),
        RecordStatus::Done,
        Some(&archived),
        rule_id,
    )?;
    Ok(upsert)
}

/// Extract and validate, consulting the rule matcher.
///
/// With a known sender the rule is resolved up front. Otherwise a plain
/// first pass reveals the sender, and a matching rule triggers a second,
/// hinted pass.
pub(crate) fn extract_document(
    state: &CoreState,
    bytes: &[u8],
    known_sender: Option<&str>,
    inserted_on: chrono::NaiveDate,
) -> Result<Extraction, IngestError> {
    let hints: Option<RuleHints> = match known_sender {
        Some(sender) => state.rules().match_rule(sender, None),
        None => {
            let first = state.extractor().extract(bytes, None)?;
            match state
                .rules()
                .match_rule(&collapse_whitespace(&first.sender), None)
            {
                Some(hints) => Some(hints),
                None => {
                    let row = validate_fields(&first, inserted_on, None)?;
                    return Ok(Extraction { row, rule_id: None });
                }
            }
        }
    };

    if let Some(h) = &hints {
        tracing::debug!(rule_id = %h.rule_id, "Extracting with rule hints");
    }
    let fields = state.extractor().extract(bytes, hints.as_ref())?;
    let rule_id = hints.map(|h| h.rule_id);
    let row = validate_fields(&fields, inserted_on, rule_id.as_deref())?;
    Ok(Extraction { row, rule_id })
}

fn read_source(path: &Path) -> Result<Vec<u8>, IngestError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Err(IngestError::FileUnreadable {
            path: path.to_path_buf(),
            reason: "zero-byte file".into(),
        }),
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(IngestError::SourceVanished(path.to_path_buf()))
        }
        Err(e) => Err(IngestError::FileUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn retry_delay(state: &CoreState, entry: &QueueEntry, error: &IngestError) -> std::time::Duration {
    let backoff = state.config().backoff_for(entry.attempts);
    match error {
        IngestError::ExtractionRateLimited {
            retry_after: Some(wait),
        } => backoff.max(*wait),
        _ => backoff,
    }
}

/// Move an inbox file out of the way; files enqueued from elsewhere stay put.
fn park_file(state: &CoreState, entry: &QueueEntry, dir: &Path) {
    if !is_within(&entry.path, &state.config().inbox_dir) || !entry.path.exists() {
        return;
    }
    match move_into(&entry.path, dir) {
        Ok(target) => {
            if let Err(e) = state.queue().relocate(entry.id, &target) {
                tracing::warn!(error = %e, "Could not record new file location");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, target = %dir.display(), "Could not move file out of inbox")
        }
    }
}
