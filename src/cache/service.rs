// Snapshot cache service.
// The read path: fresh hit, join an in-flight fetch, or start one, with stale-if-error fallback.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::error::{FetchError, LookupError};
use crate::fetch::{FetchOptions, Fetcher};

use super::coalescer::{Coalescer, EndGuard, FetchOutcome, PendingOutcome};
use super::policy::{Decision, RefreshPolicy, Served};
use super::store::SnapshotStore;

/// Read-through cache in front of a [`Fetcher`].
///
/// Cheap to clone; clones share the store, the coalescer and the fetcher.
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<SnapshotStore>,
    coalescer: Arc<Coalescer>,
    fetcher: Arc<dyn Fetcher>,
    policy: RefreshPolicy,
    options: FetchOptions,
}

impl SnapshotCache {
    pub fn new(
        store: Arc<SnapshotStore>,
        fetcher: Arc<dyn Fetcher>,
        policy: RefreshPolicy,
        options: FetchOptions,
    ) -> Self {
        Self {
            store,
            coalescer: Arc::new(Coalescer::new()),
            fetcher,
            policy,
            options,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn coalescer(&self) -> &Arc<Coalescer> {
        &self.coalescer
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Serve the snapshot for `key`.
    ///
    /// Returns data (fresh, freshly fetched, or explicitly stale) whenever any
    /// snapshot for the key exists; otherwise the typed fetch failure.
    pub async fn lookup(&self, key: &str) -> Result<Served, LookupError> {
        if key.trim().is_empty() {
            return Err(LookupError::Configuration(
                "a GitHub username is required".to_string(),
            ));
        }

        let fresh = self.store.valid_entry(key, self.policy.ttl_seconds);
        let in_flight = match fresh {
            Some(_) => None,
            None => self.coalescer.in_flight(key),
        };

        let decision = self.policy.decide(fresh.is_some(), in_flight.is_some());
        let outcome = match (decision, fresh, in_flight) {
            (Decision::ServeCached, Some(entry), _) => {
                tracing::trace!(key, "serving fresh snapshot from cache");
                return Ok(Served::cached(&entry));
            }
            (Decision::AwaitInFlight, _, Some(pending)) => {
                tracing::debug!(key, "awaiting in-flight fetch");
                pending.await
            }
            _ => self.start_or_join(key).await,
        };

        match outcome {
            Ok(entry) => Ok(Served::fetched(&entry)),
            Err(err) => self
                .policy
                .resolve_failure(key, err, self.store.entry(key)),
        }
    }

    /// Fetch `key` now, without waiting on a fetch someone else started.
    ///
    /// The new fetch is registered as the in-flight one, so lookups arriving
    /// meanwhile coalesce onto it.
    pub async fn refresh(&self, key: &str) -> FetchOutcome {
        let pending = self.coalescer.begin_with(key, || self.spawn_fetch(key));
        pending.await
    }

    /// Seconds until the entry for `key` goes stale.
    pub fn remaining_ttl(&self, key: &str) -> u64 {
        self.store.remaining_ttl(key, self.policy.ttl_seconds)
    }

    async fn start_or_join(&self, key: &str) -> FetchOutcome {
        let (pending, started) = self
            .coalescer
            .join_or_begin(key, || self.spawn_fetch(key));
        if started {
            tracing::debug!(key, "started upstream fetch");
        } else {
            tracing::debug!(key, "joined upstream fetch started by another caller");
        }
        pending.await
    }

    /// Spawn fetch-and-store for `key` as its own task.
    ///
    /// The task outlives any caller, and its guard clears the in-flight
    /// marker after the store write, whatever the outcome.
    fn spawn_fetch(&self, key: &str) -> PendingOutcome {
        let store = self.store.clone();
        let fetcher = self.fetcher.clone();
        let options = self.options.clone();
        let guard = EndGuard::new(self.coalescer.clone(), key);
        let key = key.to_string();

        let task = tokio::spawn(async move {
            let _guard = guard;
            fetch_and_store(fetcher.as_ref(), &store, &key, &options).await
        });

        task.map(|joined| {
            joined.unwrap_or_else(|err| {
                Err(FetchError::upstream(format!("fetch task failed: {err}")))
            })
        })
        .boxed()
        .shared()
    }
}

async fn fetch_and_store(
    fetcher: &dyn Fetcher,
    store: &Arc<SnapshotStore>,
    key: &str,
    options: &FetchOptions,
) -> FetchOutcome {
    let started = Instant::now();

    let data = match fetcher.fetch(key, options).await {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(
                key,
                error = %err,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "upstream fetch failed"
            );
            return Err(err);
        }
    };

    let entry = store.set(key, data);

    let persist_store = store.clone();
    let persist_key = key.to_string();
    if let Err(err) =
        tokio::task::spawn_blocking(move || persist_store.persist(&persist_key)).await
    {
        tracing::error!(key, error = %err, "snapshot persist task failed");
    }

    tracing::debug!(
        key,
        generated_at = entry.generated_at,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetched and stored snapshot"
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::paths::record_path;
    use crate::test_support::{FakeFetcher, snapshot};
    use futures::future::join_all;
    use tempfile::TempDir;

    const TTL: u64 = 600;

    struct Harness {
        cache: SnapshotCache,
        fetcher: Arc<FakeFetcher>,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    fn harness(fetcher: Arc<FakeFetcher>) -> Harness {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(SnapshotStore::with_clock(dir.path(), clock.clone()));
        let cache = SnapshotCache::new(
            store,
            fetcher.clone(),
            RefreshPolicy::new(TTL),
            FetchOptions::default(),
        );
        Harness {
            cache,
            fetcher,
            clock,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_then_serves_from_cache() {
        let h = harness(FakeFetcher::new());

        let first = h.cache.lookup("octocat").await.unwrap();
        assert!(!first.from_cache);
        assert!(!first.stale);
        assert_eq!(first.snapshot, snapshot("octocat", 1));
        assert_eq!(first.generated_at, 10_000);

        let second = h.cache.lookup("octocat").await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.snapshot, snapshot("octocat", 1));
        assert_eq!(h.fetcher.calls(), 1);
        assert!(h.cache.coalescer().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_writes_through_to_disk() {
        let h = harness(FakeFetcher::new());
        h.cache.lookup("octocat").await.unwrap();

        let path = record_path(h.cache.store().dir(), "octocat");
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let h = harness(FakeFetcher::new());
        h.cache.lookup("octocat").await.unwrap();

        h.clock.advance(TTL as i64);
        assert_eq!(h.cache.remaining_ttl("octocat"), 0);

        let served = h.cache.lookup("octocat").await.unwrap();
        assert!(!served.from_cache);
        assert_eq!(served.snapshot, snapshot("octocat", 2));
        assert_eq!(served.generated_at, 10_000 + TTL as i64);
        assert_eq!(h.fetcher.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_share_one_fetch() {
        let h = harness(FakeFetcher::gated());

        let lookups: Vec<_> = (0..16)
            .map(|_| {
                let cache = h.cache.clone();
                tokio::spawn(async move { cache.lookup("octocat").await })
            })
            .collect();

        // Let every lookup reach the coalescer before the fetch can finish.
        while h.fetcher.calls() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        h.fetcher.open_gate();

        let results = join_all(lookups).await;
        for result in results {
            let served = result.unwrap().unwrap();
            assert_eq!(served.snapshot, snapshot("octocat", 1));
        }
        assert_eq!(h.fetcher.calls(), 1);
        assert!(h.cache.coalescer().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_fetch() {
        let h = harness(FakeFetcher::gated());
        h.fetcher.fail("octocat", FetchError::upstream("boom"));

        let lookups = join_all((0..5).map(|_| h.cache.lookup("octocat")));
        let open = async {
            while h.fetcher.calls() == 0 {
                tokio::task::yield_now().await;
            }
            h.fetcher.open_gate();
        };
        let (results, ()) = tokio::join!(lookups, open);

        for result in results {
            assert!(matches!(result, Err(LookupError::Unavailable { .. })));
        }
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_served_when_refresh_fails() {
        let h = harness(FakeFetcher::new());
        h.cache.lookup("octocat").await.unwrap();

        h.clock.advance(TTL as i64 + 5);
        h.fetcher.fail(
            "octocat",
            FetchError::RateLimited {
                retry_after_secs: Some(60),
                reset_at: None,
            },
        );

        let served = h.cache.lookup("octocat").await.unwrap();
        assert!(served.stale);
        assert!(served.from_cache);
        assert_eq!(served.snapshot, snapshot("octocat", 1));
        assert_eq!(served.generated_at, 10_000);

        // The failed fetch left the entry untouched.
        assert_eq!(h.cache.store().entry("octocat").unwrap().generated_at, 10_000);
    }

    #[tokio::test]
    async fn test_failure_without_entry_surfaces_rate_limit() {
        let h = harness(FakeFetcher::new());
        h.fetcher.fail(
            "ghost",
            FetchError::RateLimited {
                retry_after_secs: Some(120),
                reset_at: Some(1_700_000_000),
            },
        );

        let err = h.cache.lookup("ghost").await.unwrap_err();
        assert_eq!(
            err,
            LookupError::RateLimited {
                retry_after_secs: Some(120),
                reset_at: Some(1_700_000_000),
            }
        );
        assert!(h.cache.coalescer().is_empty());
    }

    #[tokio::test]
    async fn test_failure_without_entry_surfaces_generic_error() {
        let h = harness(FakeFetcher::new());
        h.fetcher.fail("ghost", FetchError::upstream("HTTP 502"));

        let err = h.cache.lookup("ghost").await.unwrap_err();
        assert_eq!(
            err,
            LookupError::Unavailable {
                message: "HTTP 502".to_string()
            }
        );

        // Next lookup tries again.
        let served = h.cache.lookup("ghost").await.unwrap();
        assert_eq!(served.snapshot, snapshot("ghost", 2));
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let h = harness(FakeFetcher::new());
        let err = h.cache.lookup("  ").await.unwrap_err();
        assert!(matches!(err, LookupError::Configuration(_)));
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_ignores_fresh_entry() {
        let h = harness(FakeFetcher::new());
        h.cache.lookup("octocat").await.unwrap();

        let entry = h.cache.refresh("octocat").await.unwrap();
        assert_eq!(entry.data, snapshot("octocat", 2));
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(h.cache.store().get("octocat"), Some(snapshot("octocat", 2)));
    }

    #[tokio::test]
    async fn test_lookup_joins_refresh_in_progress() {
        let h = harness(FakeFetcher::gated());

        let refresh = h.cache.refresh("octocat");
        let lookup = async {
            while h.cache.coalescer().in_flight("octocat").is_none() {
                tokio::task::yield_now().await;
            }
            h.cache.lookup("octocat").await
        };
        let open = async {
            while h.fetcher.calls() == 0 {
                tokio::task::yield_now().await;
            }
            h.fetcher.open_gate();
        };

        let (refreshed, served, ()) = tokio::join!(refresh, lookup, open);
        assert_eq!(refreshed.unwrap().data, snapshot("octocat", 1));
        let served = served.unwrap();
        assert!(!served.from_cache);
        assert_eq!(served.snapshot, snapshot("octocat", 1));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_lookup_still_completes_fetch() {
        let h = harness(FakeFetcher::gated());

        let lookup = h.cache.lookup("octocat");
        let abandoned = tokio::time::timeout(std::time::Duration::from_millis(10), lookup).await;
        assert!(abandoned.is_err());

        h.fetcher.open_gate();
        while h.cache.store().get("octocat").is_none() {
            tokio::task::yield_now().await;
        }
        while !h.cache.coalescer().is_empty() {
            tokio::task::yield_now().await;
        }

        let served = h.cache.lookup("octocat").await.unwrap();
        assert!(served.from_cache);
        assert_eq!(h.fetcher.calls(), 1);
    }
}
