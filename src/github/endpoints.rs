// GitHub API endpoint functions.
// Provides typed methods for the reads the snapshot aggregator needs.

use std::collections::BTreeMap;

use reqwest::StatusCode;

use crate::error::FetchError;

use super::client::{GitHubClient, check_response};
use super::types::{CommitEntry, Repository, User};

type Result<T> = std::result::Result<T, FetchError>;

impl GitHubClient {
    /// Get a user's public profile.
    pub async fn get_user(&self, login: &str) -> Result<User> {
        let response = self.get(&format!("/users/{}", login)).await?;
        let user: User = response.json().await?;
        Ok(user)
    }

    /// Get one page of repositories owned by a user, most recently pushed first.
    pub async fn get_user_repos(
        &self,
        login: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        let params = [
            ("type", "owner"),
            ("sort", "pushed"),
            ("direction", "desc"),
            ("page", &page.to_string()),
            ("per_page", &per_page.to_string()),
        ];
        let response = self
            .get_with_params(&format!("/users/{}/repos", login), &params)
            .await?;
        let repos: Vec<Repository> = response.json().await?;
        Ok(repos)
    }

    /// Get language byte counts for a repository.
    pub async fn get_repo_languages(&self, owner: &str, repo: &str) -> Result<BTreeMap<String, u64>> {
        let response = self
            .get(&format!("/repos/{}/{}/languages", owner, repo))
            .await?;
        let languages: BTreeMap<String, u64> = response.json().await?;
        Ok(languages)
    }

    /// Get the most recent commits authored by `author` in a repository.
    ///
    /// An empty repository answers 409 Conflict, which is reported as no commits.
    pub async fn get_author_commits(
        &self,
        owner: &str,
        repo: &str,
        author: &str,
        per_page: u32,
    ) -> Result<Vec<CommitEntry>> {
        let params = [("author", author), ("per_page", &per_page.to_string())];
        let response = self
            .get_raw(&format!("/repos/{}/{}/commits", owner, repo), &params)
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(Vec::new());
        }

        let response = check_response(response).await?;
        let commits: Vec<CommitEntry> = response.json().await?;
        Ok(commits)
    }
}
