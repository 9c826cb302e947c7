use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::RecordStatus;

/// Dedup bookkeeping for one content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocumentRecord {
    pub content_hash: String,
    pub document_number: String,
    pub processed_at: DateTime<Utc>,
    pub status: RecordStatus,
    /// Archived copy of the source, used by reprocessing.
    pub source_path: Option<PathBuf>,
    pub rule_id: Option<String>,
    pub reprocess_count: u32,
}
