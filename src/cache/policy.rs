// Refresh policy.
// The decision matrix the request path follows for one key.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{FetchError, LookupError};
use crate::snapshot::Snapshot;

use super::store::CacheEntry;

/// What the request path does next for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A fresh entry exists.
    ServeCached,
    /// No fresh entry, but another caller's fetch is underway.
    AwaitInFlight,
    /// No fresh entry and nothing in flight.
    StartFetch,
}

/// A snapshot handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served {
    pub snapshot: Snapshot,
    /// Unix seconds at which the snapshot was stored.
    pub generated_at: i64,
    /// False only when this lookup awaited a real upstream read.
    pub from_cache: bool,
    /// Served because a refresh failed and nothing fresher exists.
    pub stale: bool,
}

impl Served {
    pub fn cached(entry: &CacheEntry) -> Self {
        Self {
            snapshot: entry.data.clone(),
            generated_at: entry.generated_at,
            from_cache: true,
            stale: false,
        }
    }

    pub fn fetched(entry: &CacheEntry) -> Self {
        Self {
            from_cache: false,
            ..Self::cached(entry)
        }
    }

    pub fn stale(entry: &CacheEntry) -> Self {
        Self {
            stale: true,
            ..Self::cached(entry)
        }
    }
}

/// TTL-driven freshness rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub ttl_seconds: u64,
}

impl RefreshPolicy {
    pub fn new(ttl_seconds: u64) -> Self {
        Self { ttl_seconds }
    }

    /// Freshness beats coalescing, and coalescing beats a redundant upstream call.
    pub fn decide(&self, has_fresh: bool, has_in_flight: bool) -> Decision {
        match (has_fresh, has_in_flight) {
            (true, _) => Decision::ServeCached,
            (false, true) => Decision::AwaitInFlight,
            (false, false) => Decision::StartFetch,
        }
    }

    /// After a failed fetch: serve any prior entry as stale, else surface the typed failure.
    pub fn resolve_failure(
        &self,
        key: &str,
        error: FetchError,
        stale: Option<Arc<CacheEntry>>,
    ) -> Result<Served, LookupError> {
        match stale {
            Some(entry) => {
                tracing::warn!(
                    key,
                    error = %error,
                    generated_at = entry.generated_at,
                    "refresh failed, serving stale snapshot"
                );
                Ok(Served::stale(&entry))
            }
            None => {
                tracing::warn!(key, error = %error, "refresh failed with no snapshot to fall back on");
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::snapshot;

    fn entry() -> Arc<CacheEntry> {
        Arc::new(CacheEntry {
            key: "octocat".to_string(),
            generated_at: 100,
            data: snapshot("octocat", 1),
        })
    }

    #[test]
    fn test_decision_matrix() {
        let policy = RefreshPolicy::new(60);
        assert_eq!(policy.decide(true, false), Decision::ServeCached);
        assert_eq!(policy.decide(true, true), Decision::ServeCached);
        assert_eq!(policy.decide(false, true), Decision::AwaitInFlight);
        assert_eq!(policy.decide(false, false), Decision::StartFetch);
    }

    #[test]
    fn test_failure_with_stale_entry_serves_stale() {
        let policy = RefreshPolicy::new(60);
        let served = policy
            .resolve_failure("octocat", FetchError::upstream("boom"), Some(entry()))
            .unwrap();

        assert!(served.stale);
        assert!(served.from_cache);
        assert_eq!(served.generated_at, 100);
        assert_eq!(served.snapshot, snapshot("octocat", 1));
    }

    #[test]
    fn test_failure_without_entry_keeps_taxonomy() {
        let policy = RefreshPolicy::new(60);

        let err = policy
            .resolve_failure(
                "octocat",
                FetchError::RateLimited {
                    retry_after_secs: Some(42),
                    reset_at: Some(1_700_000_000),
                },
                None,
            )
            .unwrap_err();
        assert_eq!(
            err,
            LookupError::RateLimited {
                retry_after_secs: Some(42),
                reset_at: Some(1_700_000_000),
            }
        );

        let err = policy
            .resolve_failure("octocat", FetchError::upstream("boom"), None)
            .unwrap_err();
        assert!(matches!(err, LookupError::Unavailable { .. }));
    }

    #[test]
    fn test_served_flags() {
        let e = entry();
        assert!(Served::cached(&e).from_cache);
        assert!(!Served::fetched(&e).from_cache);
        assert!(!Served::fetched(&e).stale);
    }
}
