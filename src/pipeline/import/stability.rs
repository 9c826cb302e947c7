use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::pipeline::IngestError;

/// Upper bound on observations, as a multiple of the required stable polls.
const MAX_OBSERVATION_FACTOR: u32 = 4;

/// Size and modification time of a file at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileSignature {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Block until `path` shows the same signature `polls` times in a row.
///
/// Gives up with `FileUnreadable` when the file keeps changing or
/// cannot be inspected.
pub fn wait_until_stable(
    path: &Path,
    polls: u32,
    interval: Duration,
) -> Result<FileSignature, IngestError> {
    let polls = polls.max(1);
    let mut previous: Option<FileSignature> = None;
    let mut streak = 0u32;

    for round in 0..polls * MAX_OBSERVATION_FACTOR {
        let current = FileSignature::of(path).map_err(|e| IngestError::FileUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if previous == Some(current) {
            streak += 1;
        } else {
            previous = Some(current);
            streak = 1;
        }
        if streak >= polls {
            return Ok(current);
        }
        if round + 1 < polls * MAX_OBSERVATION_FACTOR {
            std::thread::sleep(interval);
        }
    }

    Err(IngestError::FileUnreadable {
        path: path.to_path_buf(),
        reason: format!(
            "still changing after {} checks",
            polls * MAX_OBSERVATION_FACTOR
        ),
    })
}

/// Cross-poll stability bookkeeping for the inbox watcher.
#[derive(Debug, Default)]
pub struct StabilityTracker {
    observed: HashMap<PathBuf, (FileSignature, u32)>,
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Returns true once the signature has been
    /// identical for `required` consecutive observations.
    pub fn observe(&mut self, path: &Path, signature: FileSignature, required: u32) -> bool {
        let slot = self
            .observed
            .entry(path.to_path_buf())
            .or_insert((signature, 0));
        if slot.0 == signature {
            slot.1 += 1;
        } else {
            *slot = (signature, 1);
        }
        slot.1 >= required.max(1)
    }

    pub fn forget(&mut self, path: &Path) {
        self.observed.remove(path);
    }

    /// Drop bookkeeping for paths no longer present.
    pub fn retain(&mut self, keep: impl Fn(&Path) -> bool) {
        self.observed.retain(|path, _| keep(path));
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}
