// Fetch adapter seam.
// The cache only knows how to ask for a snapshot; how it is built lives behind this trait.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::snapshot::Snapshot;

/// Knobs passed to every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Upper bound on repositories analysed per user.
    pub max_repos: u32,
    /// Whether forked repositories contribute to the aggregate.
    pub include_forks: bool,
    /// Commits listed per repository (one page, at most 100).
    pub commits_per_repo: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_repos: 100,
            include_forks: false,
            commits_per_repo: 100,
        }
    }
}

/// Produces a fresh snapshot for a key from the upstream API.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, key: &str, options: &FetchOptions) -> Result<Snapshot, FetchError>;
}
