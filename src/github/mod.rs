// GitHub API module.
// Provides the client, response types, and the snapshot-producing fetch adapter.

pub mod aggregate;
pub mod client;
pub mod endpoints;
pub mod types;

pub use aggregate::GitHubFetcher;
pub use client::{GITHUB_API_BASE, GitHubClient};
