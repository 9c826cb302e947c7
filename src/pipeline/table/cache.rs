//! Cached view of the persisted document table.
//!
//! `read()` returns the cached snapshot while the backing file's stamp
//! (mtime + length) is unchanged and re-parses otherwise. Writers are
//! serialized by `writer`, a lock private to this cache; a write replaces
//! the file, then installs the new rows as the snapshot before returning.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::csv_table::{read_rows, write_rows};
use crate::models::DocumentRow;
use crate::pipeline::IngestError;

/// What identifies one version of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl SourceStamp {
    /// `None` when the file does not exist.
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

struct CacheEntry {
    rows: Arc<Vec<DocumentRow>>,
    stamp: Option<SourceStamp>,
    loaded_at: Instant,
}

/// Result of `update_or_append`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upsert {
    Replaced,
    Appended,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub total_rows: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

pub struct StoreCache {
    path: PathBuf,
    snapshot: RwLock<Option<CacheEntry>>,
    writer: Mutex<()>,
    parse_count: AtomicU64,
}

impl StoreCache {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            snapshot: RwLock::new(None),
            writer: Mutex::new(()),
            parse_count: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every row, in table order.
    pub fn read(&self) -> Result<Vec<DocumentRow>, IngestError> {
        Ok(self.current_rows()?.as_ref().clone())
    }

    /// Row for a document number, if present.
    pub fn find(&self, document_number: &str) -> Result<Option<DocumentRow>, IngestError> {
        Ok(self
            .current_rows()?
            .iter()
            .find(|r| r.document_number == document_number)
            .cloned())
    }

    /// Replace the row keyed by `row.document_number` in place, or append it.
    pub fn update_or_append(&self, row: DocumentRow) -> Result<Upsert, IngestError> {
        let _writer = self.writer.lock().map_err(|_| IngestError::LockPoisoned)?;

        let mut rows = self.current_rows()?.as_ref().clone();
        let outcome = match rows
            .iter_mut()
            .find(|r| r.document_number == row.document_number)
        {
            Some(existing) => {
                *existing = row;
                Upsert::Replaced
            }
            None => {
                rows.push(row);
                Upsert::Appended
            }
        };

        self.replace_file(rows)?;
        tracing::debug!(outcome = ?outcome, path = %self.path.display(), "Document table updated");
        Ok(outcome)
    }

    /// Empty the table (header only) and reset the snapshot.
    pub fn clear_all(&self) -> Result<usize, IngestError> {
        let _writer = self.writer.lock().map_err(|_| IngestError::LockPoisoned)?;
        let removed = self.current_rows()?.len();
        self.replace_file(Vec::new())?;
        tracing::info!(removed, path = %self.path.display(), "Document table cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<TableStats, IngestError> {
        let total_rows = self.current_rows()?.len();
        let last_modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(TableStats {
            total_rows,
            last_modified,
        })
    }

    /// How many times the backing file has been parsed.
    pub fn parse_count(&self) -> u64 {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// Age of the current snapshot, if one is loaded.
    pub fn snapshot_age(&self) -> Option<std::time::Duration> {
        let guard = self.snapshot.read().ok()?;
        guard.as_ref().map(|entry| entry.loaded_at.elapsed())
    }

    // ── Internal ────────────────────────────────────────────

    fn current_rows(&self) -> Result<Arc<Vec<DocumentRow>>, IngestError> {
        let stamp = SourceStamp::of(&self.path);
        {
            let guard = self.snapshot.read().map_err(|_| IngestError::LockPoisoned)?;
            if let Some(entry) = guard.as_ref() {
                if entry.stamp == stamp {
                    return Ok(Arc::clone(&entry.rows));
                }
            }
        }

        let mut guard = self.snapshot.write().map_err(|_| IngestError::LockPoisoned)?;
        // Another reader may have refreshed while we waited.
        let stamp = SourceStamp::of(&self.path);
        if let Some(entry) = guard.as_ref() {
            if entry.stamp == stamp {
                return Ok(Arc::clone(&entry.rows));
            }
        }

        let rows = Arc::new(read_rows(&self.path)?);
        self.parse_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(rows = rows.len(), path = %self.path.display(), "Document table parsed");
        *guard = Some(CacheEntry {
            rows: Arc::clone(&rows),
            stamp,
            loaded_at: Instant::now(),
        });
        Ok(rows)
    }

    /// Caller holds `writer`.
    fn replace_file(&self, rows: Vec<DocumentRow>) -> Result<(), IngestError> {
        let written = write_rows(&self.path, &rows);
        let mut guard = self.snapshot.write().map_err(|_| IngestError::LockPoisoned)?;
        match written {
            Ok(()) => {
                *guard = Some(CacheEntry {
                    rows: Arc::new(rows),
                    stamp: SourceStamp::of(&self.path),
                    loaded_at: Instant::now(),
                });
                Ok(())
            }
            Err(e) => {
                // The file state is unknown; force the next read to parse it.
                *guard = None;
                Err(e)
            }
        }
    }
}
