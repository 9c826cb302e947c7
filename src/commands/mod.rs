//! Control surface for the UI/API layer that embeds the pipeline.
//!
//! Every command takes the shared `CoreState` and returns plain serializable
//! data, so a transport (HTTP, IPC, CLI) can wrap them one-to-one.

pub mod documents;
pub mod ingest;

/// Liveness probe.
pub fn health_check() -> String {
    tracing::debug!("Health check called");
    "ok".to_string()
}
