use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::models::{ProcessedDocumentRecord, RecordStatus};

// ═══════════════════════════════════════════
// Processed Document Repository
// ═══════════════════════════════════════════

const RECORD_COLUMNS: &str =
    "content_hash, document_number, processed_at, status, source_path, rule_id, reprocess_count";

/// Insert a record, or overwrite the one stored under the same hash.
pub fn upsert_processed_document(
    conn: &Connection,
    record: &ProcessedDocumentRecord,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO processed_documents
            (content_hash, document_number, processed_at, status, source_path, rule_id, reprocess_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (content_hash) DO UPDATE SET
            document_number = excluded.document_number,
            processed_at = excluded.processed_at,
            status = excluded.status,
            source_path = COALESCE(excluded.source_path, processed_documents.source_path),
            rule_id = excluded.rule_id,
            reprocess_count = excluded.reprocess_count",
        params![
            record.content_hash,
            record.document_number,
            record.processed_at,
            record.status.as_str(),
            record.source_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            record.rule_id,
            record.reprocess_count,
        ],
    )?;
    Ok(())
}

pub fn get_processed_by_hash(
    conn: &Connection,
    hash: &str,
) -> Result<Option<ProcessedDocumentRecord>, DatabaseError> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM processed_documents WHERE content_hash = ?1");
    let raw = conn
        .query_row(&sql, params![hash], RawRecord::from_row)
        .optional()?;
    raw.map(RawRecord::into_record).transpose()
}

/// The successfully processed record holding this document number, if any.
pub fn get_done_by_document_number(
    conn: &Connection,
    document_number: &str,
) -> Result<Option<ProcessedDocumentRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM processed_documents
         WHERE document_number = ?1 AND status = 'DONE'
         ORDER BY processed_at DESC LIMIT 1"
    );
    let raw = conn
        .query_row(&sql, params![document_number], RawRecord::from_row)
        .optional()?;
    raw.map(RawRecord::into_record).transpose()
}

/// Remove an unfinished DONE claim (no archived source yet). Returns
/// whether a row was removed.
pub fn delete_pending_claim(conn: &Connection, hash: &str) -> Result<bool, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM processed_documents
         WHERE content_hash = ?1 AND status = 'DONE' AND source_path IS NULL",
        params![hash],
    )?;
    Ok(removed > 0)
}

pub fn count_processed_documents(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM processed_documents", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count)
}

struct RawRecord {
    content_hash: String,
    document_number: String,
    processed_at: DateTime<Utc>,
    status: String,
    source_path: Option<String>,
    rule_id: Option<String>,
    reprocess_count: u32,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_hash: row.get(0)?,
            document_number: row.get(1)?,
            processed_at: row.get(2)?,
            status: row.get(3)?,
            source_path: row.get(4)?,
            rule_id: row.get(5)?,
            reprocess_count: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<ProcessedDocumentRecord, DatabaseError> {
        Ok(ProcessedDocumentRecord {
            content_hash: self.content_hash,
            document_number: self.document_number,
            processed_at: self.processed_at,
            status: RecordStatus::from_str(&self.status)?,
            source_path: self.source_path.map(PathBuf::from),
            rule_id: self.rule_id,
            reprocess_count: self.reprocess_count,
        })
    }
}
