use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::models::{DocumentRow, ExtractedFields};
use crate::pipeline::IngestError;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static WEIGHT_UNIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*kg\.?\s*$").unwrap());

/// Date layouts seen on shipment documents, tried in order.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"];

/// Normalize and check raw extraction output.
///
/// Every problem found is reported in one `ExtractionInvalidResult` so the
/// operator can correct the document in a single pass.
pub fn validate_fields(
    fields: &ExtractedFields,
    inserted_on: NaiveDate,
    provenance: Option<&str>,
) -> Result<DocumentRow, IngestError> {
    let mut problems = Vec::new();

    let sender = required_text("sender", &fields.sender, &mut problems);
    let recipient = required_text("recipient", &fields.recipient, &mut problems);
    let document_number = required_text("document_number", &fields.document_number, &mut problems);

    let document_date = match parse_date(&fields.date) {
        Some(date) => Some(date),
        None => {
            problems.push(format!("date {:?} is not a recognised date", fields.date));
            None
        }
    };

    let total_weight = match parse_weight(&fields.total_weight) {
        Ok(weight) => Some(weight),
        Err(problem) => {
            problems.push(problem);
            None
        }
    };

    if let (Some(s), Some(r)) = (&sender, &recipient) {
        if s.to_lowercase() == r.to_lowercase() {
            problems.push("sender and recipient are the same party".into());
        }
    }

    match (document_date, sender, recipient, document_number, total_weight) {
        (Some(document_date), Some(sender), Some(recipient), Some(document_number), Some(total_weight))
            if problems.is_empty() =>
        {
            Ok(DocumentRow {
                document_date,
                sender,
                recipient,
                document_number,
                total_weight,
                inserted_on,
                provenance: provenance.map(str::to_string),
            })
        }
        _ => Err(IngestError::ExtractionInvalidResult(problems.join("; "))),
    }
}

/// Collapse internal whitespace and trim.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Timestamps carry the date in front of a `T` or a space.
    let raw = raw.split(['T', ' ']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Non-negative decimal; `,` is accepted as the decimal separator and `.`
/// as a thousands separator when both appear.
pub fn parse_weight(raw: &str) -> Result<Decimal, String> {
    let trimmed = WEIGHT_UNIT.replace(raw.trim(), "");
    let trimmed = trimmed.trim();
    if trimmed.is_empty() {
        return Err("total_weight is missing".into());
    }
    let normalized = if trimmed.contains(',') && trimmed.contains('.') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.replace(',', ".")
    };
    let weight = Decimal::from_str(&normalized)
        .map_err(|_| format!("total_weight {raw:?} is not a number"))?;
    if weight.is_sign_negative() && !weight.is_zero() {
        return Err(format!("total_weight {raw:?} is negative"));
    }
    Ok(weight.normalize())
}

fn required_text(name: &str, raw: &str, problems: &mut Vec<String>) -> Option<String> {
    let value = collapse_whitespace(raw);
    if value.is_empty() {
        problems.push(format!("{name} is empty"));
        None
    } else {
        Some(value)
    }
}
