//! Seams to the external extraction service and rule matcher.
//!
//! - `ExtractionAdapter`: document bytes (+ optional rule hints) to raw fields
//! - `RuleMatcher`: sender / raw text to an optional rule with overrides
//!
//! The pipeline treats both as black boxes; `validate` turns raw fields
//! into a `DocumentRow` or an `ExtractionInvalidResult`.

pub mod http;
pub mod mock;
pub mod rules;
pub mod validate;

pub use http::*;
pub use mock::*;
pub use rules::*;
pub use validate::*;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ExtractedFields, TotalWeightMode};
use crate::pipeline::IngestError;

/// Typed failures the extraction service can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("timed out")]
    Timeout,
}

impl From<ExtractionFailure> for IngestError {
    fn from(failure: ExtractionFailure) -> Self {
        match failure {
            ExtractionFailure::RateLimited { retry_after } => {
                IngestError::ExtractionRateLimited { retry_after }
            }
            ExtractionFailure::InvalidDocument(reason) => {
                IngestError::ExtractionInvalidDocument(reason)
            }
            ExtractionFailure::Timeout => IngestError::ExtractionTimeout,
        }
    }
}

/// Adjustments a rule asks the extraction service to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOverrides {
    #[serde(default)]
    pub total_weight_mode: TotalWeightMode,
    #[serde(default)]
    pub multipage: bool,
}

/// Hints forwarded to the extraction service when a rule matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHints {
    pub rule_id: String,
    pub instructions: String,
    pub overrides: RuleOverrides,
}

/// External document extraction service.
pub trait ExtractionAdapter: Send + Sync {
    fn extract(
        &self,
        file_bytes: &[u8],
        hints: Option<&RuleHints>,
    ) -> Result<ExtractedFields, ExtractionFailure>;
}

/// External rule / layout-model matcher.
pub trait RuleMatcher: Send + Sync {
    /// Rule for this sender (or raw text), if any.
    fn match_rule(&self, sender: &str, raw_text: Option<&str>) -> Option<RuleHints>;
}

/// Matcher that never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRules;

impl RuleMatcher for NoRules {
    fn match_rule(&self, _sender: &str, _raw_text: Option<&str>) -> Option<RuleHints> {
        None
    }
}
