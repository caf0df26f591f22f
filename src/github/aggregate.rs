// Snapshot aggregation over the GitHub API.
// Walks a user's repositories and folds languages and commits into one Snapshot.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::fetch::{FetchOptions, Fetcher};
use crate::snapshot::{CommitSummary, Profile, Snapshot, language_shares};

use super::client::GitHubClient;
use super::types::{CommitEntry, Repository, User};

const REPOS_PER_PAGE: u32 = 100;
const MAX_COMMITS_PER_PAGE: u32 = 100;

/// Fetch adapter backed by the GitHub REST API.
pub struct GitHubFetcher {
    client: GitHubClient,
}

impl GitHubFetcher {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    /// List owned repositories, most recently pushed first, up to `max_repos`.
    async fn list_repos(
        &self,
        login: &str,
        options: &FetchOptions,
    ) -> Result<Vec<Repository>, FetchError> {
        let mut repos = Vec::new();
        let mut page = 1;

        loop {
            let batch = self.client.get_user_repos(login, page, REPOS_PER_PAGE).await?;
            let short_page = (batch.len() as u32) < REPOS_PER_PAGE;

            repos.extend(
                batch
                    .into_iter()
                    .filter(|repo| options.include_forks || !repo.fork),
            );

            if short_page || repos.len() >= options.max_repos as usize {
                break;
            }
            page += 1;
        }

        repos.truncate(options.max_repos as usize);
        Ok(repos)
    }
}

#[async_trait]
impl Fetcher for GitHubFetcher {
    async fn fetch(&self, key: &str, options: &FetchOptions) -> Result<Snapshot, FetchError> {
        let started = Instant::now();

        let user = self.client.get_user(key).await?;
        let repos = self.list_repos(&user.login, options).await?;
        let per_page = options.commits_per_repo.clamp(1, MAX_COMMITS_PER_PAGE);

        let mut aggregate = Aggregate::new(&user);

        for repo in &repos {
            aggregate.add_repository(repo);

            match self
                .client
                .get_repo_languages(&repo.owner.login, &repo.name)
                .await
            {
                Ok(languages) => aggregate.add_languages(languages),
                Err(err) if err.is_rate_limited() => return Err(err),
                Err(err) => {
                    tracing::warn!(repo = %repo.full_name, error = %err, "skipping languages")
                }
            }

            match self
                .client
                .get_author_commits(&repo.owner.login, &repo.name, &user.login, per_page)
                .await
            {
                Ok(commits) => aggregate.add_commits(&commits),
                Err(err) if err.is_rate_limited() => return Err(err),
                Err(err) => tracing::warn!(repo = %repo.full_name, error = %err, "skipping commits"),
            }
        }

        let snapshot = aggregate.finish(Utc::now());

        tracing::debug!(
            key,
            repositories = snapshot.repositories_analyzed,
            commits = snapshot.commits.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregated GitHub snapshot"
        );

        Ok(snapshot)
    }
}

/// Running totals while walking repositories.
#[derive(Debug, Default)]
struct Aggregate {
    profile: Profile,
    languages: BTreeMap<String, u64>,
    repositories: u32,
    stars: u64,
    forks: u64,
    commits: CommitSummary,
}

impl Aggregate {
    fn new(user: &User) -> Self {
        Self {
            profile: Profile {
                login: user.login.clone(),
                name: user.name.clone(),
                avatar_url: user.avatar_url.clone(),
                bio: user.bio.clone(),
                company: user.company.clone(),
                location: user.location.clone(),
                blog: user.blog.clone().filter(|b| !b.is_empty()),
                public_repos: user.public_repos,
                followers: user.followers,
                following: user.following,
                created_at: user.created_at,
            },
            ..Self::default()
        }
    }

    fn add_repository(&mut self, repo: &Repository) {
        self.repositories += 1;
        self.stars += repo.stargazers_count;
        self.forks += repo.forks_count;
    }

    fn add_languages(&mut self, languages: BTreeMap<String, u64>) {
        for (name, bytes) in languages {
            *self.languages.entry(name).or_default() += bytes;
        }
    }

    fn add_commits(&mut self, commits: &[CommitEntry]) {
        let dates: Vec<DateTime<Utc>> = commits.iter().filter_map(CommitEntry::date).collect();
        self.commits.record_repository(&dates);
    }

    fn finish(self, fetched_at: DateTime<Utc>) -> Snapshot {
        let (languages, total_language_bytes) = language_shares(self.languages);
        Snapshot {
            profile: self.profile,
            languages,
            total_language_bytes,
            repositories_analyzed: self.repositories,
            total_stars: self.stars,
            total_forks: self.forks,
            commits: self.commits,
            fetched_at: Some(fetched_at),
        }
    }
}
