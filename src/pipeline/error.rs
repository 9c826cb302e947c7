use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::EntryState;

/// Failure taxonomy for every ingest operation.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File unreadable: {path}: {reason}")]
    FileUnreadable { path: PathBuf, reason: String },

    #[error("Unsupported file type for {path}: {detected}")]
    UnsupportedFileType { path: PathBuf, detected: String },

    #[error("Content already processed (hash {hash})")]
    DuplicateContent {
        hash: String,
        document_number: Option<String>,
    },

    #[error("Document number {document_number} already recorded from a different file")]
    DuplicateDocumentNumber {
        document_number: String,
        existing_hash: String,
    },

    #[error("Queue at capacity: {pending} pending entries (max {max})")]
    CapacityExceeded { pending: usize, max: usize },

    #[error("No processing slot freed up within {0:?}")]
    SlotTimeout(Duration),

    #[error("Extraction timed out")]
    ExtractionTimeout,

    #[error("Extraction service rate limited the request")]
    ExtractionRateLimited { retry_after: Option<Duration> },

    #[error("Extraction service rejected the document: {0}")]
    ExtractionInvalidDocument(String),

    #[error("Extraction result failed validation: {0}")]
    ExtractionInvalidResult(String),

    #[error("Document table write conflict: {0}")]
    StoreWriteConflict(String),

    #[error("Database schema v{found} is newer than supported v{supported}")]
    MigrationRequired { found: i64, supported: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("source vanished: {0}")]
    SourceVanished(PathBuf),

    #[error("Invalid queue transition {from} -> {to}")]
    InvalidTransition { from: EntryState, to: EntryState },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal lock error")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Transient failures feed the retry counter; everything else is
    /// quarantined on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ExtractionTimeout
                | Self::ExtractionRateLimited { .. }
                | Self::SlotTimeout(_)
                | Self::StoreWriteConflict(_)
                | Self::SourceVanished(_)
                | Self::Io(_)
        )
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(err))
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(IngestError::ExtractionTimeout.is_transient());
        assert!(IngestError::ExtractionRateLimited { retry_after: None }.is_transient());
        assert!(IngestError::SourceVanished(PathBuf::from("/x.pdf")).is_transient());
        assert!(!IngestError::ExtractionInvalidResult("missing date".into()).is_transient());
        assert!(!IngestError::ExtractionInvalidDocument("blank".into()).is_transient());
        assert!(!IngestError::UnsupportedFileType {
            path: PathBuf::from("/x.txt"),
            detected: "text".into()
        }
        .is_transient());
    }

    #[test]
    fn source_vanished_message() {
        let err = IngestError::SourceVanished(PathBuf::from("/inbox/a.pdf"));
        assert!(err.to_string().starts_with("source vanished"));
    }
}
