//! Inbox polling.
//!
//! Each `poll` lists the inbox once. A file is enqueued only after its size
//! and mtime stay the same across `stability_polls` consecutive polls, so
//! partial copies are never read. Files that cannot be queued are moved
//! out of the inbox (duplicates to the archive, rejects to quarantine).
//! A settled file without a `.pdf` name is rejected without being read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::import::{has_pdf_extension, move_into, FileSignature, StabilityTracker};
use super::intake::{enqueue, StabilityCheck};
use super::IngestError;
use crate::core_state::CoreState;

/// Suffixes used by browsers and copy tools for in-flight files.
const TEMP_SUFFIXES: [&str; 4] = ["~", ".part", ".tmp", ".crdownload"];

/// What one inbox pass did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PollReport {
    pub queued: Vec<Uuid>,
    pub duplicates: usize,
    pub rejected: usize,
    /// Stable files left in place because the queue is full.
    pub deferred: usize,
}

pub struct InboxWatcher {
    inbox: PathBuf,
    required_polls: u32,
    tracker: StabilityTracker,
    /// Files already queued, keyed to the signature they had at the time.
    handled: HashMap<PathBuf, FileSignature>,
}

impl InboxWatcher {
    pub fn new(state: &CoreState) -> Self {
        Self {
            inbox: state.config().inbox_dir.clone(),
            required_polls: state.config().stability_polls,
            tracker: StabilityTracker::new(),
            handled: HashMap::new(),
        }
    }

    pub fn poll(&mut self, state: &CoreState) -> Result<PollReport, IngestError> {
        let mut report = PollReport::default();
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(&self.inbox)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_candidate(p))
            .collect();
        candidates.sort();

        for path in candidates {
            let Ok(signature) = FileSignature::of(&path) else {
                continue;
            };
            if self.handled.get(&path) == Some(&signature) {
                continue;
            }
            if !self.tracker.observe(&path, signature, self.required_polls) {
                continue;
            }

            let admitted = if has_pdf_extension(&path) {
                enqueue(state, &path, StabilityCheck::AlreadyStable)
            } else {
                Err(IngestError::UnsupportedFileType {
                    path: path.clone(),
                    detected: "no .pdf extension".into(),
                })
            };

            match admitted {
                Ok(admission) => {
                    self.tracker.forget(&path);
                    self.handled.insert(path, signature);
                    report.queued.push(admission.id());
                }
                Err(IngestError::DuplicateContent { .. }) => {
                    self.tracker.forget(&path);
                    report.duplicates += 1;
                    relocate(&path, &state.config().duplicates_dir());
                }
                Err(
                    e @ (IngestError::UnsupportedFileType { .. }
                    | IngestError::FileUnreadable { .. }),
                ) => {
                    tracing::warn!(file = %path.display(), error = %e, "Rejected from inbox");
                    self.tracker.forget(&path);
                    report.rejected += 1;
                    relocate(&path, &state.config().quarantine_dir);
                }
                Err(IngestError::CapacityExceeded { pending, max }) => {
                    tracing::warn!(pending, max, file = %path.display(), "Queue full, deferring");
                    report.deferred += 1;
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "Could not enqueue");
                }
            }
        }

        self.tracker.retain(Path::exists);
        self.handled.retain(|p, _| p.exists());

        if !report.queued.is_empty() || report.duplicates + report.rejected > 0 {
            tracing::info!(
                queued = report.queued.len(),
                duplicates = report.duplicates,
                rejected = report.rejected,
                deferred = report.deferred,
                "Inbox scanned"
            );
        }
        Ok(report)
    }
}

/// Hidden files and in-flight downloads are left alone.
fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && !TEMP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn relocate(path: &Path, dir: &Path) {
    if let Err(e) = move_into(path, dir) {
        tracing::error!(file = %path.display(), target = %dir.display(), error = %e, "Could not move file");
    }
}
