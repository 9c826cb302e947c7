//! Processed-document bookkeeping.
//!
//! Answers "has this content already been handled?" so a re-delivered file
//! becomes a no-op. Backed by SQLite; the connection is opened (and the
//! schema migrated) on first use and guarded by this store's own mutex.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::IngestError;
use crate::db::{self, DatabaseError};
use crate::models::{ProcessedDocumentRecord, RecordStatus};

/// Dedup verdict for an arriving document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupCheck {
    New,
    SeenSameHash { document_number: String },
    SeenDifferentHashSameDocNumber { existing_hash: String },
}

enum Backing {
    File(PathBuf),
    #[cfg(test)]
    Memory,
}

pub struct DedupStore {
    backing: Backing,
    conn: Mutex<Option<Connection>>,
}

impl DedupStore {
    /// Store backed by the SQLite file at `path`. Nothing is opened yet.
    pub fn new(path: &Path) -> Self {
        Self {
            backing: Backing::File(path.to_path_buf()),
            conn: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory,
            conn: Mutex::new(None),
        }
    }

    /// Look up a content hash, and optionally the document number it
    /// produced, against everything recorded so far.
    pub fn check(
        &self,
        hash: &str,
        document_number: Option<&str>,
    ) -> Result<DedupCheck, IngestError> {
        let guard = self.connection()?;
        let conn = connected(&guard)?;

        if let Some(record) = db::get_processed_by_hash(conn, hash)? {
            return Ok(DedupCheck::SeenSameHash {
                document_number: record.document_number,
            });
        }
        if let Some(number) = document_number {
            if let Some(record) = db::get_done_by_document_number(conn, number)? {
                return Ok(DedupCheck::SeenDifferentHashSameDocNumber {
                    existing_hash: record.content_hash,
                });
            }
        }
        Ok(DedupCheck::New)
    }

    /// Atomically take ownership of `document_number` for `hash`.
    ///
    /// Check and insert share one transaction, so of two workers that
    /// extracted the same number from different bytes exactly one gets
    /// `New`. The winner holds a DONE record without a source path until
    /// `record` completes it, or `release_claim` drops it. A loser's hash
    /// is stored as DUPLICATE in the same transaction.
    pub fn claim_document_number(
        &self,
        hash: &str,
        document_number: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<DedupCheck, IngestError> {
        let mut guard = self.connection()?;
        let conn = guard.as_mut().ok_or(IngestError::LockPoisoned)?;
        let tx = conn.transaction()?;

        if let Some(record) = db::get_processed_by_hash(&tx, hash)? {
            return Ok(DedupCheck::SeenSameHash {
                document_number: record.document_number,
            });
        }

        let owner = db::get_done_by_document_number(&tx, document_number)?;
        let status = if owner.is_some() {
            RecordStatus::Duplicate
        } else {
            RecordStatus::Done
        };
        db::upsert_processed_document(
            &tx,
            &ProcessedDocumentRecord {
                content_hash: hash.to_string(),
                document_number: document_number.to_string(),
                processed_at,
                status,
                source_path: None,
                rule_id: None,
                reprocess_count: 0,
            },
        )?;
        tx.commit()?;

        Ok(match owner {
            Some(record) => {
                tracing::debug!(
                    hash = %crate::models::short_hash(hash),
                    document_number,
                    owner = %crate::models::short_hash(&record.content_hash),
                    "Document number already owned"
                );
                DedupCheck::SeenDifferentHashSameDocNumber {
                    existing_hash: record.content_hash,
                }
            }
            None => DedupCheck::New,
        })
    }

    /// Drop a claim whose document never got stored.
    pub fn release_claim(&self, hash: &str) -> Result<(), IngestError> {
        let guard = self.connection()?;
        if db::delete_pending_claim(connected(&guard)?, hash)? {
            tracing::debug!(hash = %crate::models::short_hash(hash), "Document number claim released");
        }
        Ok(())
    }

    /// Record a processed hash. Runs in its own transaction; an existing
    /// record for the hash keeps its reprocess counter.
    pub fn record(
        &self,
        hash: &str,
        document_number: &str,
        processed_at: DateTime<Utc>,
        status: RecordStatus,
        source_path: Option<&Path>,
        rule_id: Option<&str>,
    ) -> Result<(), IngestError> {
        let mut guard = self.connection()?;
        let conn = guard.as_mut().ok_or(IngestError::LockPoisoned)?;
        let tx = conn.transaction()?;

        let reprocess_count = db::get_processed_by_hash(&tx, hash)?
            .map(|r| r.reprocess_count)
            .unwrap_or(0);
        db::upsert_processed_document(
            &tx,
            &ProcessedDocumentRecord {
                content_hash: hash.to_string(),
                document_number: document_number.to_string(),
                processed_at,
                status,
                source_path: source_path.map(Path::to_path_buf),
                rule_id: rule_id.map(str::to_string),
                reprocess_count,
            },
        )?;
        tx.commit()?;

        tracing::debug!(
            hash = %crate::models::short_hash(hash),
            document_number,
            status = %status,
            "Processed document recorded"
        );
        Ok(())
    }

    /// Bump bookkeeping after an explicit reprocess of `hash`.
    pub fn record_reprocess(
        &self,
        hash: &str,
        processed_at: DateTime<Utc>,
        rule_id: Option<&str>,
    ) -> Result<ProcessedDocumentRecord, IngestError> {
        let mut guard = self.connection()?;
        let conn = guard.as_mut().ok_or(IngestError::LockPoisoned)?;
        let tx = conn.transaction()?;

        let mut record = db::get_processed_by_hash(&tx, hash)?
            .ok_or_else(|| IngestError::NotFound(format!("processed record for {hash}")))?;
        record.processed_at = processed_at;
        record.rule_id = rule_id.map(str::to_string);
        record.reprocess_count += 1;
        db::upsert_processed_document(&tx, &record)?;
        tx.commit()?;
        Ok(record)
    }

    /// The DONE record that owns `document_number`.
    pub fn find_by_document_number(
        &self,
        document_number: &str,
    ) -> Result<Option<ProcessedDocumentRecord>, IngestError> {
        let guard = self.connection()?;
        Ok(db::get_done_by_document_number(connected(&guard)?, document_number)?)
    }

    pub fn find_by_hash(&self, hash: &str) -> Result<Option<ProcessedDocumentRecord>, IngestError> {
        let guard = self.connection()?;
        Ok(db::get_processed_by_hash(connected(&guard)?, hash)?)
    }

    pub fn count(&self) -> Result<i64, IngestError> {
        let guard = self.connection()?;
        Ok(db::count_processed_documents(connected(&guard)?)?)
    }

    // ── Internal ────────────────────────────────────────────

    fn connection(&self) -> Result<MutexGuard<'_, Option<Connection>>, IngestError> {
        let mut guard = self.conn.lock().map_err(|_| IngestError::LockPoisoned)?;
        if guard.is_none() {
            let conn = match &self.backing {
                Backing::File(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    db::open_database(path)
                }
                #[cfg(test)]
                Backing::Memory => db::open_memory_database(),
            }
            .map_err(|e| match e {
                DatabaseError::SchemaTooNew { found, supported } => {
                    IngestError::MigrationRequired { found, supported }
                }
                other => IngestError::Database(other),
            })?;
            tracing::debug!("Dedup store opened");
            *guard = Some(conn);
        }
        Ok(guard)
    }
}

fn connected<'a>(guard: &'a MutexGuard<'_, Option<Connection>>) -> Result<&'a Connection, IngestError> {
    guard.as_ref().ok_or(IngestError::LockPoisoned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use proptest::prelude::*;

    #[test]
    fn unknown_hash_is_new() {
        let store = DedupStore::in_memory();
        assert_eq!(store.check("h1", None).unwrap(), DedupCheck::New);
        assert_eq!(store.check("h1", Some("D1")).unwrap(), DedupCheck::New);
    }

    #[test]
    fn same_document_number_different_hash() {
        let store = DedupStore::in_memory();
        store
            .record("h1", "D1", Utc::now(), RecordStatus::Done, None, None)
            .unwrap();
        assert_eq!(
            store.check("h2", Some("D1")).unwrap(),
            DedupCheck::SeenDifferentHashSameDocNumber {
                existing_hash: "h1".into()
            }
        );
        assert_eq!(store.check("h2", None).unwrap(), DedupCheck::New);
    }

    #[test]
    fn document_number_claimed_once() {
        let store = DedupStore::in_memory();
        assert_eq!(store.claim_document_number("h1", "D1", Utc::now()).unwrap(), DedupCheck::New);
        assert_eq!(
            store.claim_document_number("h2", "D1", Utc::now()).unwrap(),
            DedupCheck::SeenDifferentHashSameDocNumber {
                existing_hash: "h1".into()
            }
        );
        assert_eq!(
            store.find_by_hash("h2").unwrap().unwrap().status,
            RecordStatus::Duplicate
        );
        assert_eq!(
            store.claim_document_number("h1", "D1", Utc::now()).unwrap(),
            DedupCheck::SeenSameHash {
                document_number: "D1".into()
            }
        );
    }

    #[test]
    fn released_claim_frees_the_number() {
        let store = DedupStore::in_memory();
        store.claim_document_number("h1", "D1", Utc::now()).unwrap();
        store.release_claim("h1").unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.claim_document_number("h2", "D1", Utc::now()).unwrap(), DedupCheck::New);

        // A completed record is not a pending claim.
        store
            .record("h2", "D1", Utc::now(), RecordStatus::Done, Some(Path::new("/archive/h2.pdf")), None)
            .unwrap();
        store.release_claim("h2").unwrap();
        assert_eq!(store.find_by_document_number("D1").unwrap().unwrap().content_hash, "h2");
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DedupStore::new(&dir.path().join("processed.db")));
        let barrier = Arc::new(std::sync::Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|worker| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store
                        .claim_document_number(&format!("h{worker}"), "D1", Utc::now())
                        .unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|verdict| *verdict == DedupCheck::New)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.count().unwrap(), 6);
    }

    #[test]
    fn lazy_open_creates_file_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("processed.db");
        let store = DedupStore::new(&path);
        assert!(!path.exists());
        assert_eq!(store.count().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn newer_schema_requires_migration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.db");
        {
            let conn = db::open_database(&path).unwrap();
            conn.execute("INSERT INTO schema_version (version) VALUES (42)", [])
                .unwrap();
        }
        let store = DedupStore::new(&path);
        let err = store.check("h1", None).unwrap_err();
        assert!(matches!(err, IngestError::MigrationRequired { found: 42, .. }));
    }

    #[test]
    fn reprocess_bumps_counter_and_keeps_source() {
        let store = DedupStore::in_memory();
        store
            .record(
                "h1",
                "D1",
                Utc::now(),
                RecordStatus::Done,
                Some(Path::new("/archive/h1.pdf")),
                None,
            )
            .unwrap();
        let record = store.record_reprocess("h1", Utc::now(), Some("sum-rows")).unwrap();
        assert_eq!(record.reprocess_count, 1);
        assert_eq!(record.rule_id.as_deref(), Some("sum-rows"));
        assert_eq!(record.source_path, Some(PathBuf::from("/archive/h1.pdf")));
        assert!(store.record_reprocess("missing", Utc::now(), None).is_err());
    }

    #[test]
    fn concurrent_records_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DedupStore::new(&dir.path().join("processed.db")));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let hash = format!("h{worker}-{i}");
                        store
                            .record(&hash, &format!("D{worker}-{i}"), Utc::now(), RecordStatus::Done, None, None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count().unwrap(), 40);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn recorded_hash_is_seen(hash in "[A-Za-z0-9_-]{1,43}", number in "[A-Z0-9/-]{1,12}") {
            let store = DedupStore::in_memory();
            store.record(&hash, &number, Utc::now(), RecordStatus::Done, None, None).unwrap();
            prop_assert_eq!(
                store.check(&hash, None).unwrap(),
                DedupCheck::SeenSameHash { document_number: number.clone() }
            );
        }
    }
}
