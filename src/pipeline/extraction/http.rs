use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{ExtractionAdapter, ExtractionFailure, RuleHints};
use crate::models::ExtractedFields;
use crate::pipeline::IngestError;

/// Extraction service reached over HTTP.
///
/// POSTs the PDF (base64) plus any rule hints as JSON and expects the five
/// fields back. Status codes map onto `ExtractionFailure`:
/// 429 → `RateLimited`, 408/504/5xx and transport errors → `Timeout`,
/// any other 4xx → `InvalidDocument`.
pub struct HttpExtractionAdapter {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct ExtractionRequest<'a> {
    file_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a RuleHints>,
}

/// Accepts both the English field names and the Italian ones older
/// deployments of the service still emit.
#[derive(Deserialize)]
struct ExtractionResponse {
    #[serde(alias = "data")]
    date: Option<String>,
    #[serde(alias = "mittente")]
    sender: Option<String>,
    #[serde(alias = "destinatario")]
    recipient: Option<String>,
    #[serde(alias = "numero_documento")]
    document_number: Option<serde_json::Value>,
    #[serde(alias = "totale_kg")]
    total_weight: Option<serde_json::Value>,
}

impl HttpExtractionAdapter {
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self, IngestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IngestError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key,
            client,
            timeout,
        })
    }
}

impl ExtractionAdapter for HttpExtractionAdapter {
    fn extract(
        &self,
        file_bytes: &[u8],
        hints: Option<&RuleHints>,
    ) -> Result<ExtractedFields, ExtractionFailure> {
        let body = ExtractionRequest {
            file_base64: base64::engine::general_purpose::STANDARD.encode(file_bytes),
            rule: hints,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            tracing::warn!(
                endpoint = %self.endpoint,
                timeout_secs = self.timeout.as_secs(),
                error = %e,
                "Extraction request failed"
            );
            ExtractionFailure::Timeout
        })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, retry_after.as_deref(), &body));
        }

        let parsed: ExtractionResponse = response
            .json()
            .map_err(|e| ExtractionFailure::InvalidDocument(format!("unreadable response: {e}")))?;
        Ok(parsed.into_fields())
    }
}

impl ExtractionResponse {
    fn into_fields(self) -> ExtractedFields {
        ExtractedFields {
            date: self.date.unwrap_or_default(),
            sender: self.sender.unwrap_or_default(),
            recipient: self.recipient.unwrap_or_default(),
            document_number: self.document_number.map(value_to_text).unwrap_or_default(),
            total_weight: self.total_weight.map(value_to_text).unwrap_or_default(),
        }
    }
}

fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Map a non-success status to a typed failure.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> ExtractionFailure {
    match status {
        429 => ExtractionFailure::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        408 | 504 => ExtractionFailure::Timeout,
        500..=599 => {
            tracing::warn!(status, body = %truncate(body, 200), "Extraction service error");
            ExtractionFailure::Timeout
        }
        _ => ExtractionFailure::InvalidDocument(format!("HTTP {status}: {}", truncate(body, 200))),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        assert_eq!(
            classify_status(429, Some("30"), ""),
            ExtractionFailure::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
        assert_eq!(
            classify_status(429, Some("Wed, 21 Oct 2026 07:28:00 GMT"), ""),
            ExtractionFailure::RateLimited { retry_after: None }
        );
    }

    #[test]
    fn server_errors_are_transient() {
        assert_eq!(classify_status(504, None, ""), ExtractionFailure::Timeout);
        assert_eq!(classify_status(503, None, "overloaded"), ExtractionFailure::Timeout);
        assert_eq!(classify_status(408, None, ""), ExtractionFailure::Timeout);
    }

    #[test]
    fn client_errors_reject_the_document() {
        let failure = classify_status(422, None, "not a transport document");
        assert_eq!(
            failure,
            ExtractionFailure::InvalidDocument("HTTP 422: not a transport document".into())
        );
    }

    #[test]
    fn response_accepts_numbers_and_legacy_names() {
        let parsed: ExtractionResponse = serde_json::from_str(
            r#"{"data": "27/11/2024", "mittente": "Rossi", "destinatario": "Nord",
                "numero_documento": 118, "totale_kg": 1250.5}"#,
        )
        .unwrap();
        let fields = parsed.into_fields();
        assert_eq!(fields.date, "27/11/2024");
        assert_eq!(fields.document_number, "118");
        assert_eq!(fields.total_weight, "1250.5");
    }

    #[test]
    fn missing_fields_become_empty() {
        let parsed: ExtractionResponse = serde_json::from_str(r#"{"sender": "Rossi"}"#).unwrap();
        let fields = parsed.into_fields();
        assert_eq!(fields.sender, "Rossi");
        assert!(fields.date.is_empty());
        assert!(fields.total_weight.is_empty());
    }

    #[test]
    fn request_omits_absent_rule() {
        let json = serde_json::to_value(ExtractionRequest {
            file_base64: "JVBERg".into(),
            rule: None,
        })
        .unwrap();
        assert!(json.get("rule").is_none());
    }

    #[test]
    fn unreachable_service_is_a_timeout() {
        let adapter =
            HttpExtractionAdapter::new("http://127.0.0.1:1/extract", Duration::from_secs(2), None)
                .unwrap();
        assert_eq!(adapter.extract(b"%PDF-1.4", None), Err(ExtractionFailure::Timeout));
    }
}
