//! Document-table commands: listing, stats, clearing and reprocessing.

use serde::Serialize;

use crate::core_state::CoreState;
use crate::models::DocumentRow;
use crate::pipeline::reprocess::ReprocessCoordinator;
use crate::pipeline::table::TableStats;
use crate::pipeline::IngestError;

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub rows_deleted: usize,
}

/// All stored rows in table order.
pub fn list_documents(state: &CoreState) -> Result<Vec<DocumentRow>, IngestError> {
    state.table().read()
}

pub fn table_stats(state: &CoreState) -> Result<TableStats, IngestError> {
    state.table().stats()
}

/// Empty the document table. Dedup bookkeeping is kept, so already
/// processed files are still recognised afterwards.
pub fn clear_documents(state: &CoreState) -> Result<ClearResult, IngestError> {
    let rows_deleted = state.table().clear_all()?;
    Ok(ClearResult { rows_deleted })
}

/// Re-extract a stored document under the current rules.
pub fn reprocess_document(
    state: &CoreState,
    document_number: &str,
) -> Result<DocumentRow, IngestError> {
    let document_number = document_number.trim();
    if document_number.is_empty() {
        return Err(IngestError::NotFound("empty document number".into()));
    }
    ReprocessCoordinator::new(state).reprocess(document_number)
}
