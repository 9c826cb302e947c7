//! Ingest pipeline configuration.
//!
//! Every tunable lives in `IngestConfig` with a documented default.
//! `from_env()` overlays `DDT_*` variables on top of the defaults and
//! `validate()` rejects values the pipeline cannot run with.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::config;
use crate::pipeline::IngestError;

/// Default number of simultaneously active extraction jobs (K).
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
/// Default processing attempts before quarantine (M).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default ceiling on QUEUED entries.
pub const DEFAULT_MAX_PENDING: usize = 500;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub base_dir: PathBuf,
    /// Watched directory; stable PDFs here are enqueued automatically.
    pub inbox_dir: PathBuf,
    /// Files that exhausted retries or could not be read.
    pub quarantine_dir: PathBuf,
    /// Archived sources of processed documents, keyed by content hash.
    pub archive_dir: PathBuf,
    pub queue_file: PathBuf,
    pub dedup_db: PathBuf,
    pub table_file: PathBuf,
    pub rules_file: PathBuf,
    /// K: cap on concurrently active extraction jobs.
    pub max_concurrent_jobs: usize,
    /// Threads pulling from the queue. Slots still bound concurrency.
    pub worker_threads: usize,
    /// M: attempts before an entry is quarantined.
    pub max_attempts: u32,
    /// Enqueue fails with `CapacityExceeded` at this many QUEUED entries.
    pub max_pending: usize,
    pub slot_timeout: Duration,
    pub extraction_timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive identical size/mtime observations before a file is read.
    pub stability_polls: u32,
    pub stability_interval: Duration,
    /// First retry delay; doubled for every further attempt.
    pub retry_backoff_base: Duration,
    pub retry_backoff_max: Duration,
    /// How long terminal entries stay in the queue file.
    pub terminal_retention: Duration,
    pub extraction_endpoint: String,
    #[serde(skip_serializing)]
    pub extraction_api_key: Option<String>,
}

impl IngestConfig {
    /// Defaults rooted at `base`.
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            base_dir: base.to_path_buf(),
            inbox_dir: base.join("inbox"),
            quarantine_dir: base.join("quarantine"),
            archive_dir: base.join("archive"),
            queue_file: base.join("queue.json"),
            dedup_db: base.join("processed_documents.db"),
            table_file: base.join("documents.csv"),
            rules_file: base.join("rules.json"),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            worker_threads: DEFAULT_MAX_CONCURRENT_JOBS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_pending: DEFAULT_MAX_PENDING,
            slot_timeout: Duration::from_secs(300),
            extraction_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(2000),
            stability_polls: 3,
            stability_interval: Duration::from_millis(500),
            retry_backoff_base: Duration::from_secs(30),
            retry_backoff_max: Duration::from_secs(15 * 60),
            terminal_retention: Duration::from_secs(168 * 3600),
            extraction_endpoint: "http://127.0.0.1:8787/extract".into(),
            extraction_api_key: None,
        }
    }

    /// Defaults under the application data dir, overridden by `DDT_*` variables.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(config::app_data_dir(), |key| std::env::var(key).ok())
    }

    fn from_lookup(
        base: PathBuf,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, IngestError> {
        let mut cfg = Self::with_base_dir(&base);

        if let Some(dir) = lookup("DDT_INBOX_DIR") {
            cfg.inbox_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("DDT_TABLE_FILE") {
            cfg.table_file = PathBuf::from(file);
        }
        if let Some(file) = lookup("DDT_RULES_FILE") {
            cfg.rules_file = PathBuf::from(file);
        }
        if let Some(k) = parse_var::<usize>(&lookup, "DDT_MAX_CONCURRENT_PDF")? {
            cfg.max_concurrent_jobs = k;
            cfg.worker_threads = k;
        }
        if let Some(n) = parse_var::<usize>(&lookup, "DDT_WORKER_THREADS")? {
            cfg.worker_threads = n;
        }
        if let Some(m) = parse_var::<u32>(&lookup, "DDT_MAX_ATTEMPTS")? {
            cfg.max_attempts = m;
        }
        if let Some(max) = parse_var::<usize>(&lookup, "DDT_MAX_PENDING")? {
            cfg.max_pending = max;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DDT_SLOT_TIMEOUT_SECS")? {
            cfg.slot_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DDT_EXTRACTION_TIMEOUT_SECS")? {
            cfg.extraction_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "DDT_POLL_INTERVAL_MS")? {
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "DDT_RETRY_BACKOFF_SECS")? {
            cfg.retry_backoff_base = Duration::from_secs(secs);
        }
        if let Some(hours) = parse_var::<u64>(&lookup, "DDT_RETENTION_HOURS")? {
            cfg.terminal_retention = Duration::from_secs(hours * 3600);
        }
        if let Some(url) = lookup("DDT_EXTRACTION_URL") {
            cfg.extraction_endpoint = url;
        }
        cfg.extraction_api_key = lookup("DDT_EXTRACTION_API_KEY").filter(|k| !k.is_empty());

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        let invalid = |msg: &str| Err(IngestError::Config(msg.to_string()));
        if self.max_concurrent_jobs == 0 {
            return invalid("max_concurrent_jobs must be at least 1");
        }
        if self.worker_threads == 0 {
            return invalid("worker_threads must be at least 1");
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if self.max_pending == 0 {
            return invalid("max_pending must be at least 1");
        }
        if self.stability_polls == 0 {
            return invalid("stability_polls must be at least 1");
        }
        if self.slot_timeout.is_zero() {
            return invalid("slot_timeout must be non-zero");
        }
        if self.extraction_endpoint.trim().is_empty() {
            return invalid("extraction_endpoint is empty");
        }
        Ok(())
    }

    /// Retry delay after the given number of attempts (1-based).
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        self.retry_backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.retry_backoff_max)
    }

    pub fn duplicates_dir(&self) -> PathBuf {
        self.archive_dir.join("duplicates")
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, IngestError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| IngestError::Config(format!("{key} is not a valid number: {raw:?}"))),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = IngestConfig::with_base_dir(Path::new("/data/ddt"));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_concurrent_jobs, 2);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.slot_timeout, Duration::from_secs(300));
        assert_eq!(cfg.inbox_dir, PathBuf::from("/data/ddt/inbox"));
        assert_eq!(cfg.duplicates_dir(), PathBuf::from("/data/ddt/archive/duplicates"));
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = IngestConfig::from_lookup(
            PathBuf::from("/data/ddt"),
            lookup_from(&[
                ("DDT_MAX_CONCURRENT_PDF", "4"),
                ("DDT_MAX_ATTEMPTS", "5"),
                ("DDT_INBOX_DIR", "/srv/inbox"),
                ("DDT_SLOT_TIMEOUT_SECS", "10"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.max_concurrent_jobs, 4);
        assert_eq!(cfg.worker_threads, 4);
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.inbox_dir, PathBuf::from("/srv/inbox"));
        assert_eq!(cfg.slot_timeout, Duration::from_secs(10));
    }

    #[test]
    fn malformed_number_is_config_error() {
        let err = IngestConfig::from_lookup(
            PathBuf::from("/data/ddt"),
            lookup_from(&[("DDT_MAX_PENDING", "lots")]),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = IngestConfig::from_lookup(
            PathBuf::from("/data/ddt"),
            lookup_from(&[("DDT_MAX_CONCURRENT_PDF", "0")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_concurrent_jobs"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut cfg = IngestConfig::with_base_dir(Path::new("/tmp"));
        cfg.retry_backoff_base = Duration::from_secs(10);
        cfg.retry_backoff_max = Duration::from_secs(35);
        assert_eq!(cfg.backoff_for(1), Duration::from_secs(10));
        assert_eq!(cfg.backoff_for(2), Duration::from_secs(20));
        assert_eq!(cfg.backoff_for(3), Duration::from_secs(35));
        assert_eq!(cfg.backoff_for(40), Duration::from_secs(35));
    }

    #[test]
    fn api_key_not_serialized() {
        let mut cfg = IngestConfig::with_base_dir(Path::new("/tmp"));
        cfg.extraction_api_key = Some("secret".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }
}
