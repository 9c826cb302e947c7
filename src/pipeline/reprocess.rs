//! Explicit re-extraction of an already-stored document.
//!
//! Skips the dedup short-circuit but still runs under a worker slot, so a
//! reprocess counts against the same concurrency cap as queue work.

use chrono::Utc;

use super::processor::{extract_document, Extraction};
use super::IngestError;
use crate::core_state::CoreState;
use crate::models::DocumentRow;

pub struct ReprocessCoordinator<'a> {
    state: &'a CoreState,
}

impl<'a> ReprocessCoordinator<'a> {
    pub fn new(state: &'a CoreState) -> Self {
        Self { state }
    }

    /// Re-run extraction for `document_number` and replace its row in place.
    ///
    /// Fails with `NotFound` when no DONE record exists or its archived
    /// source is gone, and with `ExtractionInvalidResult` when the new pass
    /// reads a different document number. The stored row is untouched on
    /// any failure.
    pub fn reprocess(&self, document_number: &str) -> Result<DocumentRow, IngestError> {
        let state = self.state;
        let record = state
            .dedup()
            .find_by_document_number(document_number)?
            .ok_or_else(|| IngestError::NotFound(format!("document {document_number}")))?;

        let source = record
            .source_path
            .clone()
            .filter(|p| p.is_file())
            .ok_or_else(|| {
                IngestError::NotFound(format!("source file for document {document_number}"))
            })?;

        let slot = state.slots().acquire_slot(state.config().slot_timeout)?;
        tracing::info!(document_number, source = %source.display(), "Reprocessing document");

        let bytes = std::fs::read(&source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                IngestError::NotFound(format!("source file for document {document_number}"))
            }
            _ => IngestError::FileUnreadable {
                path: source.clone(),
                reason: e.to_string(),
            },
        })?;

        let existing = state.table().find(document_number)?;
        let inserted_on = existing
            .as_ref()
            .map(|row| row.inserted_on)
            .unwrap_or_else(|| Utc::now().date_naive());
        let sender = existing.as_ref().map(|row| row.sender.as_str());

        let Extraction { row, rule_id } = extract_document(state, &bytes, sender, inserted_on)?;
        if row.document_number != document_number {
            return Err(IngestError::ExtractionInvalidResult(format!(
                "reprocess read document number {} instead of {document_number}",
                row.document_number
            )));
        }

        let upsert = state.table().update_or_append(row.clone())?;
        let updated =
            state
                .dedup()
                .record_reprocess(&record.content_hash, Utc::now(), rule_id.as_deref())?;

        tracing::info!(
            document_number,
            upsert = ?upsert,
            rule_id = ?rule_id,
            reprocess_count = updated.reprocess_count,
            held_ms = slot.held_for().as_millis() as u64,
            "Document reprocessed"
        );
        Ok(row)
    }
}
