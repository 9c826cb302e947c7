//! Background threads: one inbox watcher plus a fixed set of workers.
//!
//! A worker takes a slot first and only then claims an entry, so an entry
//! is never PROCESSING without a slot behind it. The slot is handed to
//! `process_entry` and released when that call returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::processor::process_entry;
use super::watcher::InboxWatcher;
use super::IngestError;
use crate::core_state::CoreState;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(100);

/// How often the watcher prunes old terminal entries.
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Handle for the watcher and worker threads.
///
/// `shutdown()` asks every thread to stop after its current job; dropping
/// the handle also waits for them to finish.
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Spawn the inbox watcher and `worker_threads` workers.
pub fn start_workers(state: Arc<CoreState>) -> Result<WorkerHandle, IngestError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(state.config().worker_threads + 1);

    {
        let state = Arc::clone(&state);
        let flag = Arc::clone(&shutdown);
        handles.push(
            std::thread::Builder::new()
                .name("ddt-watcher".into())
                .spawn(move || watcher_loop(&state, &flag))?,
        );
    }

    for n in 0..state.config().worker_threads {
        let state = Arc::clone(&state);
        let flag = Arc::clone(&shutdown);
        handles.push(
            std::thread::Builder::new()
                .name(format!("ddt-worker-{n}"))
                .spawn(move || worker_loop(&state, &flag, n))?,
        );
    }

    tracing::info!(
        workers = state.config().worker_threads,
        max_concurrent = state.config().max_concurrent_jobs,
        inbox = %state.config().inbox_dir.display(),
        "Pipeline started"
    );
    Ok(WorkerHandle { shutdown, handles })
}

/// Process claimable entries on the calling thread until none are left.
/// Returns how many entries were processed.
pub fn run_until_idle(state: &CoreState) -> Result<usize, IngestError> {
    let mut processed = 0;
    loop {
        let slot = state.slots().acquire_slot(state.config().slot_timeout)?;
        let Some(entry) = state.queue().claim()? else {
            return Ok(processed);
        };
        process_entry(state, entry, slot)?;
        processed += 1;
    }
}

// ── Internal ────────────────────────────────────────────────

fn worker_loop(state: &CoreState, shutdown: &AtomicBool, worker: usize) {
    tracing::debug!(worker, "Worker started");
    while !shutdown.load(Ordering::Relaxed) {
        let worked = {
            let slot = match state.slots().acquire_slot(state.config().poll_interval) {
                Ok(slot) => slot,
                Err(IngestError::SlotTimeout(_)) => continue,
                Err(e) => {
                    tracing::error!(worker, error = %e, "Slot acquisition failed");
                    sleep_unless_shutdown(shutdown, state.config().poll_interval);
                    continue;
                }
            };
            match state.queue().claim() {
                Ok(Some(entry)) => {
                    if let Err(e) = process_entry(state, entry, slot) {
                        tracing::error!(worker, error = %e, "Could not record job outcome");
                    }
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    tracing::error!(worker, error = %e, "Queue claim failed");
                    false
                }
            }
        };
        if !worked {
            sleep_unless_shutdown(shutdown, state.config().poll_interval);
        }
    }
    tracing::debug!(worker, "Worker stopped");
}

fn watcher_loop(state: &CoreState, shutdown: &AtomicBool) {
    let mut watcher = InboxWatcher::new(state);
    let mut last_prune: Option<Instant> = None;

    while !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = watcher.poll(state) {
            tracing::error!(error = %e, "Inbox poll failed");
        }

        if last_prune.map_or(true, |at| at.elapsed() >= PRUNE_INTERVAL) {
            match state.queue().prune_terminal(state.config().terminal_retention) {
                Ok(0) => {}
                Ok(pruned) => tracing::info!(pruned, "Old queue entries pruned"),
                Err(e) => tracing::warn!(error = %e, "Queue prune failed"),
            }
            last_prune = Some(Instant::now());
        }

        sleep_unless_shutdown(shutdown, state.config().poll_interval);
    }
    tracing::info!("Inbox watcher shutting down");
}

fn sleep_unless_shutdown(shutdown: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(SLEEP_GRANULARITY.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest_config::IngestConfig;
    use crate::models::EntryState;
    use crate::pipeline::extraction::{MockExtractionAdapter, NoRules};

    #[test]
    fn sleep_returns_early_on_shutdown() {
        let flag = AtomicBool::new(true);
        let started = Instant::now();
        sleep_unless_shutdown(&flag, Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn run_until_idle_on_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::new(
            IngestConfig::with_base_dir(dir.path()),
            Box::new(MockExtractionAdapter::new()),
            Box::new(NoRules),
        )
        .unwrap();
        assert_eq!(run_until_idle(&state).unwrap(), 0);
        assert_eq!(state.slots().available(), 2);
    }

    #[test]
    fn threads_pick_up_inbox_files_and_stop_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig::with_base_dir(dir.path());
        config.poll_interval = Duration::from_millis(20);
        config.stability_polls = 1;
        let state = Arc::new(
            CoreState::new(config, Box::new(MockExtractionAdapter::new()), Box::new(NoRules))
                .unwrap(),
        );
        std::fs::write(state.config().inbox_dir.join("d1.pdf"), b"%PDF-1.4 d1").unwrap();

        let handle = start_workers(Arc::clone(&state)).unwrap();
        assert_eq!(handle.thread_count(), 3);

        let deadline = Instant::now() + Duration::from_secs(10);
        while state.queue().counts().unwrap().get(EntryState::Done) == 0 {
            assert!(Instant::now() < deadline, "file was not processed in time");
            std::thread::sleep(Duration::from_millis(20));
        }
        drop(handle);

        assert_eq!(state.table().read().unwrap().len(), 1);
        assert!(!state.config().inbox_dir.join("d1.pdf").exists());
        assert_eq!(state.slots().available(), state.slots().capacity());
    }
}
