//! Concurrency budget for extraction jobs.
//!
//! `SlotPool` lives in `CoreState` and caps how many jobs run at once.
//! A job may only run while it owns a `SlotToken`:
//! - `acquire_slot()` blocks up to a timeout and returns a token only on success
//! - the token's `Drop` is the single place a slot is handed back
//! - there is no public release method, so a slot cannot be returned twice
//!   and a failed acquisition has nothing to release

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::pipeline::IngestError;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Observable pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub capacity: usize,
    pub in_use: usize,
    /// Highest `in_use` ever observed.
    pub peak_in_use: usize,
    pub acquired_total: u64,
    pub released_total: u64,
}

#[derive(Debug, Default)]
struct SlotState {
    in_use: usize,
    peak_in_use: usize,
    acquired_total: u64,
    released_total: u64,
}

// ═══════════════════════════════════════════════════════════
// SlotPool
// ═══════════════════════════════════════════════════════════

/// Counting pool of K processing slots.
pub struct SlotPool {
    capacity: usize,
    state: Mutex<SlotState>,
    freed: Condvar,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(SlotState::default()),
            freed: Condvar::new(),
        }
    }

    /// Wait up to `timeout` for a free slot.
    ///
    /// The returned token must be held for the whole job; dropping it
    /// frees the slot.
    ///
    /// # Example
    /// ```ignore
    /// let _slot = state.slots().acquire_slot(config.slot_timeout)?;
    /// // ... extract, validate, write ... slot freed here
    /// ```
    pub fn acquire_slot(&self, timeout: Duration) -> Result<SlotToken<'_>, IngestError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;

        while state.in_use >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(capacity = self.capacity, waited = ?timeout, "Slot acquisition timed out");
                return Err(IngestError::SlotTimeout(timeout));
            }
            let (guard, _) = self
                .freed
                .wait_timeout(state, deadline - now)
                .map_err(|_| IngestError::LockPoisoned)?;
            state = guard;
        }

        Ok(self.issue(&mut state))
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire_slot(&self) -> Option<SlotToken<'_>> {
        let mut state = self.lock().ok()?;
        if state.in_use >= self.capacity {
            return None;
        }
        Some(self.issue(&mut state))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.lock()
            .map(|s| self.capacity.saturating_sub(s.in_use))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> SlotStats {
        let state = match self.lock() {
            Ok(state) => state,
            Err(_) => {
                return SlotStats {
                    capacity: self.capacity,
                    in_use: 0,
                    peak_in_use: 0,
                    acquired_total: 0,
                    released_total: 0,
                }
            }
        };
        SlotStats {
            capacity: self.capacity,
            in_use: state.in_use,
            peak_in_use: state.peak_in_use,
            acquired_total: state.acquired_total,
            released_total: state.released_total,
        }
    }

    // ── Internal ────────────────────────────────────────────

    fn lock(&self) -> Result<MutexGuard<'_, SlotState>, IngestError> {
        self.state.lock().map_err(|_| IngestError::LockPoisoned)
    }

    fn issue(&self, state: &mut SlotState) -> SlotToken<'_> {
        state.in_use += 1;
        state.acquired_total += 1;
        state.peak_in_use = state.peak_in_use.max(state.in_use);
        SlotToken {
            pool: self,
            acquired_at: Instant::now(),
        }
    }

    /// Only reachable from `SlotToken::drop`.
    fn release(&self) {
        // A poisoned lock still holds valid counters; recover them so the
        // slot is never lost.
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.in_use = state.in_use.saturating_sub(1);
        state.released_total += 1;
        drop(state);
        self.freed.notify_one();
    }
}

// ═══════════════════════════════════════════════════════════
// SlotToken: RAII slot ownership
// ═══════════════════════════════════════════════════════════

/// Proof of one occupied slot. Dropping it frees the slot.
#[must_use = "dropping the token frees the slot immediately"]
pub struct SlotToken<'a> {
    pool: &'a SlotPool,
    acquired_at: Instant,
}

impl SlotToken<'_> {
    /// How long this token has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for SlotToken<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotToken")
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl Drop for SlotToken<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
