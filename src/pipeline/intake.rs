//! Turning a file on disk into a queue entry.

use std::path::Path;
use std::time::Duration;

use super::dedup::DedupCheck;
use super::import::{compute_content_hash, ensure_pdf, wait_until_stable};
use super::queue::Admission;
use super::IngestError;
use crate::core_state::CoreState;
use crate::models::short_hash;

/// How much stability checking `enqueue` still has to do.
#[derive(Debug, Clone, Copy)]
pub enum StabilityCheck {
    /// Poll the file until it stops changing.
    Wait { polls: u32, interval: Duration },
    /// The caller already watched the file settle.
    AlreadyStable,
}

impl StabilityCheck {
    pub fn from_config(state: &CoreState) -> Self {
        let config = state.config();
        Self::Wait {
            polls: config.stability_polls,
            interval: config.stability_interval,
        }
    }
}

/// Validate, fingerprint and queue one file.
///
/// Fails with `FileUnreadable` (missing, empty, or never settles),
/// `UnsupportedFileType` (not a PDF by content), `DuplicateContent` (the
/// same bytes were already processed) or `CapacityExceeded`.
pub fn enqueue(
    state: &CoreState,
    path: &Path,
    stability: StabilityCheck,
) -> Result<Admission, IngestError> {
    if let StabilityCheck::Wait { polls, interval } = stability {
        wait_until_stable(path, polls, interval)?;
    }
    ensure_pdf(path)?;
    let hash = compute_content_hash(path)?;

    if let DedupCheck::SeenSameHash { document_number } = state.dedup().check(&hash, None)? {
        tracing::info!(
            file = %path.display(),
            hash = %short_hash(&hash),
            document_number = %document_number,
            "Already processed, not queued"
        );
        return Err(IngestError::DuplicateContent {
            hash,
            document_number: Some(document_number),
        });
    }

    state.queue().push(path, &hash)
}
