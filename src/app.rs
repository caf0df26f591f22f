// Application wiring.
// Builds the cache stack from settings and runs the binary's two modes.

use std::io;
use std::sync::Arc;

use crate::cache::{RefreshPolicy, Served, SnapshotCache, SnapshotStore};
use crate::config::Settings;
use crate::error::{ConfigError, LookupError};
use crate::fetch::Fetcher;
use crate::github::{GitHubClient, GitHubFetcher};
use crate::refresh::RefreshDriver;

/// Cache service plus the driver that keeps configured users warm.
pub struct App {
    cache: SnapshotCache,
    driver: RefreshDriver,
}

impl App {
    /// Build against the live GitHub API.
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let client = GitHubClient::new(
            settings.github_token.as_deref(),
            settings.github_api_url.clone(),
        )?;
        Ok(Self::with_fetcher(settings, Arc::new(GitHubFetcher::new(client))))
    }

    pub fn with_fetcher(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = Arc::new(SnapshotStore::new(&settings.cache_dir));
        let cache = SnapshotCache::new(
            store,
            fetcher,
            RefreshPolicy::new(settings.ttl_seconds),
            settings.fetch.clone(),
        );
        let driver = RefreshDriver::new(
            cache.clone(),
            settings.users.clone(),
            settings.schedule.clone(),
            settings.key_delay,
        );
        Self { cache, driver }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn driver(&self) -> &RefreshDriver {
        &self.driver
    }

    /// Restore persisted snapshots into memory.
    pub fn load(&self) -> usize {
        let loaded = self.cache.store().load_all();
        tracing::info!(
            loaded,
            dir = %self.cache.store().dir().display(),
            "restored persisted snapshots"
        );
        loaded
    }

    /// Keep configured users warm until Ctrl-C.
    pub async fn run(&self) -> io::Result<()> {
        self.load();
        self.driver.start();

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown requested");
        self.driver.stop();
        Ok(())
    }

    /// Serve one lookup through the cache.
    pub async fn show(&self, login: &str) -> Result<Served, LookupError> {
        self.load();
        self.cache.lookup(login).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliArgs;
    use crate::refresh::DriverState;
    use crate::test_support::{FakeFetcher, snapshot};
    use clap::Parser;
    use tempfile::TempDir;

    fn settings(dir: &TempDir, users: &str) -> Settings {
        let args = CliArgs::try_parse_from([
            "ghsnap",
            "--cache-dir",
            dir.path().to_str().unwrap(),
            "--users",
            users,
            "--key-delay-ms",
            "0",
        ])
        .unwrap();
        Settings::from_args(&args).unwrap()
    }

    #[tokio::test]
    async fn test_show_serves_persisted_snapshot_without_fetching() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, "octocat");

        let seeded = SnapshotStore::new(dir.path());
        seeded.set("octocat", snapshot("octocat", 7));
        seeded.persist("octocat");

        let fetcher = FakeFetcher::new();
        let app = App::with_fetcher(&settings, fetcher.clone());
        let served = app.show("octocat").await.unwrap();

        assert!(served.from_cache);
        assert_eq!(served.snapshot, snapshot("octocat", 7));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_show_fetches_unknown_user() {
        let dir = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new();
        let app = App::with_fetcher(&settings(&dir, "octocat"), fetcher.clone());

        let served = app.show("torvalds").await.unwrap();

        assert!(!served.from_cache);
        assert_eq!(fetcher.calls_for("torvalds"), 1);
    }

    #[tokio::test]
    async fn test_driver_uses_configured_users() {
        let dir = TempDir::new().unwrap();
        let app = App::with_fetcher(&settings(&dir, "a,b"), FakeFetcher::new());

        assert_eq!(app.driver().keys(), ["a".to_string(), "b".to_string()]);
        assert_eq!(app.driver().state(), DriverState::Stopped);
        assert_eq!(app.cache().policy().ttl_seconds, 6 * 60 * 60);
    }
}
