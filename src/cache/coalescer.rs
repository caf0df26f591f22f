// Request coalescer.
// Tracks at most one in-flight fetch per key so concurrent callers share one upstream call.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::error::FetchError;

use super::store::CacheEntry;

/// Result of one fetch-and-store: the entry as written, or why the fetch failed.
pub type FetchOutcome = Result<Arc<CacheEntry>, FetchError>;

/// Shared, awaitable outcome of one in-flight fetch. Clones resolve to the same result.
pub type PendingOutcome = Shared<BoxFuture<'static, FetchOutcome>>;

/// Map of in-flight fetches keyed by cache key.
///
/// Markers are only registered and removed here; the fetch itself runs in its
/// own task so callers that stop waiting do not cancel it.
#[derive(Default)]
pub struct Coalescer {
    in_flight: Mutex<HashMap<String, PendingOutcome>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared outcome for `key`, if a fetch is underway.
    pub fn in_flight(&self, key: &str) -> Option<PendingOutcome> {
        self.in_flight.lock().get(key).cloned()
    }

    /// Register `outcome` as the in-flight fetch for `key`.
    ///
    /// Replaces any existing marker. Callers already holding the previous
    /// outcome keep awaiting it; both fetches read the same upstream data.
    pub fn begin(&self, key: &str, outcome: PendingOutcome) {
        self.begin_with(key, move || outcome);
    }

    /// Like [`Coalescer::begin`], but creates the outcome while holding the map
    /// lock, so a fetch task spawned by `start` cannot end before its marker exists.
    pub fn begin_with<F>(&self, key: &str, start: F) -> PendingOutcome
    where
        F: FnOnce() -> PendingOutcome,
    {
        let mut in_flight = self.in_flight.lock();
        let outcome = start();
        if in_flight
            .insert(key.to_string(), outcome.clone())
            .is_some()
        {
            tracing::debug!(key, "replaced in-flight fetch marker");
        }
        outcome
    }

    /// Clear the marker for `key`, whoever registered it.
    pub fn end(&self, key: &str) {
        self.in_flight.lock().remove(key);
    }

    /// Attach to the in-flight fetch for `key`, or register the one `start` creates.
    ///
    /// Check and insert happen under one lock. `start` must only spawn work,
    /// never wait on it. Returns whether `start` was called.
    pub fn join_or_begin<F>(&self, key: &str, start: F) -> (PendingOutcome, bool)
    where
        F: FnOnce() -> PendingOutcome,
    {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(key) {
            tracing::trace!(key, "joined in-flight fetch");
            return (existing.clone(), false);
        }

        let outcome = start();
        in_flight.insert(key.to_string(), outcome.clone());
        (outcome, true)
    }

    /// Number of fetches currently in flight.
    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calls [`Coalescer::end`] for a key when dropped, so the marker goes away
/// on success, failure, panic, or task abort alike.
pub struct EndGuard {
    coalescer: Arc<Coalescer>,
    key: String,
}

impl EndGuard {
    pub fn new(coalescer: Arc<Coalescer>, key: impl Into<String>) -> Self {
        Self {
            coalescer,
            key: key.into(),
        }
    }
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        self.coalescer.end(&self.key);
    }
}
