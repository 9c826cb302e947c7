//! Shared pipeline context.
//!
//! `CoreState` is built once at startup, wrapped in `Arc`, and handed to
//! every command and background thread. Each component it holds owns its
//! own lock; no lock here spans two components.

use crate::ingest_config::IngestConfig;
use crate::pipeline::dedup::DedupStore;
use crate::pipeline::extraction::{ExtractionAdapter, RuleMatcher};
use crate::pipeline::queue::IngestQueue;
use crate::pipeline::slots::SlotPool;
use crate::pipeline::table::StoreCache;
use crate::pipeline::IngestError;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: IngestConfig,
    /// Durable pending-work queue (lazy-loaded).
    queue: IngestQueue,
    /// Processed hashes / document numbers (lazy-opened).
    dedup: DedupStore,
    /// Cached view of the document table.
    table: StoreCache,
    /// K-slot concurrency budget shared by workers and reprocessing.
    slots: SlotPool,
    extractor: Box<dyn ExtractionAdapter>,
    rules: Box<dyn RuleMatcher>,
}

impl CoreState {
    /// Validate the config and create the working directories.
    /// Queue, dedup store and table are not touched until first use.
    pub fn new(
        config: IngestConfig,
        extractor: Box<dyn ExtractionAdapter>,
        rules: Box<dyn RuleMatcher>,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        for dir in [
            &config.base_dir,
            &config.inbox_dir,
            &config.quarantine_dir,
            &config.archive_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self {
            queue: IngestQueue::new(&config.queue_file, config.max_pending),
            dedup: DedupStore::new(&config.dedup_db),
            table: StoreCache::new(&config.table_file),
            slots: SlotPool::new(config.max_concurrent_jobs),
            extractor,
            rules,
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn queue(&self) -> &IngestQueue {
        &self.queue
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn table(&self) -> &StoreCache {
        &self.table
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    pub fn extractor(&self) -> &dyn ExtractionAdapter {
        self.extractor.as_ref()
    }

    pub fn rules(&self) -> &dyn RuleMatcher {
        self.rules.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::{MockExtractionAdapter, NoRules};

    #[test]
    fn new_creates_directories_but_defers_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = IngestConfig::with_base_dir(dir.path());
        let state = CoreState::new(
            config.clone(),
            Box::new(MockExtractionAdapter::new()),
            Box::new(NoRules),
        )
        .unwrap();

        assert!(config.inbox_dir.is_dir());
        assert!(config.quarantine_dir.is_dir());
        assert!(config.archive_dir.is_dir());
        assert!(!state.queue().is_loaded());
        assert!(!config.dedup_db.exists());
        assert_eq!(state.slots().capacity(), 2);
    }

    #[test]
    fn invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig::with_base_dir(dir.path());
        config.max_attempts = 0;
        let result = CoreState::new(
            config,
            Box::new(MockExtractionAdapter::new()),
            Box::new(NoRules),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
