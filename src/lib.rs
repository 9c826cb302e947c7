pub mod commands;
pub mod config;
pub mod core_state;
pub mod db;
pub mod ingest_config;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::core_state::CoreState;
use crate::ingest_config::IngestConfig;
use crate::pipeline::extraction::{HttpExtractionAdapter, KeywordRuleMatcher};
use crate::pipeline::IngestError;

/// Start the pipeline and block until Ctrl-C, then stop the workers.
pub fn run() -> Result<(), IngestError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let cfg = IngestConfig::from_env()?;
    tracing::debug!(
        config = %serde_json::to_string(&cfg).unwrap_or_default(),
        "Configuration loaded"
    );

    let extractor = HttpExtractionAdapter::new(
        &cfg.extraction_endpoint,
        cfg.extraction_timeout,
        cfg.extraction_api_key.clone(),
    )?;
    let rules = KeywordRuleMatcher::new(&cfg.rules_file);

    let state = Arc::new(CoreState::new(cfg, Box::new(extractor), Box::new(rules))?);
    let workers = pipeline::worker::start_workers(Arc::clone(&state))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())?;

    tracing::info!("Shutdown requested, waiting for running jobs");
    workers.shutdown();
    drop(workers);

    let counts = state.queue().counts()?;
    tracing::info!(
        total = counts.total,
        pending = counts.get(models::EntryState::Queued),
        "{} stopped",
        config::APP_NAME
    );
    Ok(())
}
