//! Concurrency registry.
//!
//! # Responsibilities
//! - Count in-flight dispatches (never below zero)
//! - Hold the live set of cancellation handles
//! - Global stop: cancel everything and raise the stop flag for a short window
//!
//! # Design Decisions
//! - The stop flag is a deadline, not a boolean plus timer: it reads as set
//!   until `stop_window` has passed since the latest stop
//! - Handles are removed before they are cancelled, so a handle is never
//!   cancelled twice by overlapping stops

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::cancel::Cancel;

/// How long the global stop flag stays raised after a stop.
pub const STOP_WINDOW: Duration = Duration::from_secs(1);

/// Identifier of a registered handle.
pub type HandleId = u64;

/// Tracks in-flight operations and cancellable handles.
pub struct Registry {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    handles: DashMap<HandleId, Arc<dyn Cancel>>,
    next_handle: AtomicU64,
    stopped_until: Mutex<Option<Instant>>,
    stop_window: Duration,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_stop_window(STOP_WINDOW)
    }

    pub fn with_stop_window(stop_window: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
            stopped_until: Mutex::new(None),
            stop_window,
        }
    }

    /// Add a handle to the live set.
    pub fn register(&self, handle: Arc<dyn Cancel>) -> HandleId {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, handle);
        id
    }

    /// Remove a handle without cancelling it. Unknown ids are ignored.
    pub fn deregister(&self, id: HandleId) -> bool {
        self.handles.remove(&id).is_some()
    }

    /// Number of live handles.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Mark the start of a dispatch. The returned guard ends it exactly once.
    pub fn begin_operation(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        metrics::record_in_flight(now);
        InFlightGuard {
            registry: self,
            finished: false,
        }
    }

    fn end_operation(&self) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        metrics::record_in_flight(previous.saturating_sub(1));
    }

    /// Current in-flight count.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// True while a global stop window is open.
    pub fn is_stopped(&self) -> bool {
        let until = *self.stopped_until.lock().unwrap_or_else(PoisonError::into_inner);
        until.is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Cancel every live handle, clear the set and raise the stop flag.
    ///
    /// Returns the number of handles cancelled.
    pub fn stop_all(&self) -> usize {
        *self.stopped_until.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Instant::now() + self.stop_window);

        let ids: Vec<HandleId> = self.handles.iter().map(|entry| *entry.key()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, handle)) = self.handles.remove(&id) {
                handle.cancel();
                cancelled += 1;
            }
        }

        metrics::record_global_stop(cancelled);
        tracing::info!(cancelled, in_flight = self.in_flight(), "Global stop");
        cancelled
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("in_flight", &self.in_flight())
            .field("live_handles", &self.live_handles())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A RAII guard for one in-flight dispatch.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    registry: &'a Registry,
    finished: bool,
}

impl InFlightGuard<'_> {
    /// End the operation now instead of at drop.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.finished {
            self.finished = true;
            self.registry.end_operation();
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
