// Test helpers shared by the cache and refresh tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::FetchError;
use crate::fetch::{FetchOptions, Fetcher};
use crate::snapshot::{Profile, Snapshot};

/// Snapshot distinguishable by login and a version number.
pub fn snapshot(login: &str, version: u32) -> Snapshot {
    Snapshot {
        profile: Profile {
            login: login.to_string(),
            public_repos: version,
            ..Profile::default()
        },
        repositories_analyzed: version,
        ..Snapshot::default()
    }
}

/// Fetcher with scripted outcomes and an optional gate that holds fetches open.
///
/// Without a scripted outcome a fetch succeeds with `snapshot(key, n)` where
/// `n` is the per-key call number.
#[derive(Default)]
pub struct FakeFetcher {
    calls: AtomicUsize,
    per_key: Mutex<HashMap<String, usize>>,
    scripted: Mutex<HashMap<String, VecDeque<Result<Snapshot, FetchError>>>>,
    gate: Option<Semaphore>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fetches block until `open_gate` is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    /// Queue the outcome of the next fetch for `key`.
    pub fn push(&self, key: &str, outcome: Result<Snapshot, FetchError>) {
        self.scripted
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn fail(&self, key: &str, err: FetchError) {
        self.push(key, Err(err));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.per_key.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, key: &str, _options: &FetchOptions) -> Result<Snapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut per_key = self.per_key.lock();
            let count = per_key.entry(key.to_string()).or_default();
            *count += 1;
            *count
        };

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| FetchError::upstream(e.to_string()))?
                .forget();
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(snapshot(key, call as u32)))
    }
}
