use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the persisted document table. `document_number` is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub document_date: NaiveDate,
    pub sender: String,
    pub recipient: String,
    pub document_number: String,
    pub total_weight: Decimal,
    pub inserted_on: NaiveDate,
    /// Rule or layout-model id that shaped the extraction, if any.
    pub provenance: Option<String>,
}

/// Raw fields as returned by the extraction service, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub date: String,
    pub sender: String,
    pub recipient: String,
    pub document_number: String,
    pub total_weight: String,
}
