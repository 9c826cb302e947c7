use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ExtractionAdapter, ExtractionFailure, RuleHints};
use crate::models::ExtractedFields;

type Responder =
    Box<dyn Fn(&[u8], Option<&RuleHints>) -> Result<ExtractedFields, ExtractionFailure> + Send + Sync>;

/// Scriptable adapter for tests and offline runs.
///
/// Scripted responses are served first, in order; afterwards the responder
/// (or the default fields) answers every call.
pub struct MockExtractionAdapter {
    scripted: Mutex<VecDeque<Result<ExtractedFields, ExtractionFailure>>>,
    responder: Option<Responder>,
    default_fields: ExtractedFields,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    seen_hints: Mutex<Vec<Option<String>>>,
}

impl MockExtractionAdapter {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            responder: None,
            default_fields: Self::default_fields(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            seen_hints: Mutex::new(Vec::new()),
        }
    }

    /// A well-formed document `D1` from Trasporti Rossi.
    pub fn default_fields() -> ExtractedFields {
        ExtractedFields {
            date: "2024-11-27".into(),
            sender: "Trasporti Rossi S.r.l.".into(),
            recipient: "Magazzino Nord S.p.A.".into(),
            document_number: "D1".into(),
            total_weight: "1250,5".into(),
        }
    }

    /// Fields returned once the script runs out.
    pub fn returning(mut self, fields: ExtractedFields) -> Self {
        self.default_fields = fields;
        self
    }

    /// Compute the answer from the bytes and hints.
    pub fn responding_with(
        mut self,
        f: impl Fn(&[u8], Option<&RuleHints>) -> Result<ExtractedFields, ExtractionFailure>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.responder = Some(Box::new(f));
        self
    }

    /// Simulated service latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-off response.
    pub fn push_response(&self, response: Result<ExtractedFields, ExtractionFailure>) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.push_back(response);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Rule id passed on each call, in call order.
    pub fn seen_rule_ids(&self) -> Vec<Option<String>> {
        self.seen_hints.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Default for MockExtractionAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionAdapter for MockExtractionAdapter {
    fn extract(
        &self,
        file_bytes: &[u8],
        hints: Option<&RuleHints>,
    ) -> Result<ExtractedFields, ExtractionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now_active, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_hints.lock() {
            seen.push(hints.map(|h| h.rule_id.clone()));
        }

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let scripted = self.scripted.lock().ok().and_then(|mut s| s.pop_front());
        let result = match scripted {
            Some(response) => response,
            None => match &self.responder {
                Some(responder) => responder(file_bytes, hints),
                None => Ok(self.default_fields.clone()),
            },
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
