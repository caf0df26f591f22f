// Snapshot payload.
// The aggregated view of one GitHub user that the cache stores and serves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated result for one user, as produced by a fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub profile: Profile,
    /// Languages sorted by byte count, largest first.
    pub languages: Vec<LanguageShare>,
    pub total_language_bytes: u64,
    pub repositories_analyzed: u32,
    pub total_stars: u64,
    pub total_forks: u64,
    pub commits: CommitSummary,
    /// When the upstream aggregation finished.
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Public profile fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub public_repos: u32,
    pub followers: u32,
    pub following: u32,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub name: String,
    pub bytes: u64,
    /// Share of all analysed bytes, 0-100, two decimals.
    pub percentage: f64,
}

/// Commits authored by the user across analysed repositories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub total: u64,
    pub repositories_with_commits: u32,
    pub first_commit_at: Option<DateTime<Utc>>,
    pub last_commit_at: Option<DateTime<Utc>>,
}

impl CommitSummary {
    /// Fold one repository's commit timestamps into the summary.
    pub fn record_repository(&mut self, dates: &[DateTime<Utc>]) {
        if dates.is_empty() {
            return;
        }
        self.total += dates.len() as u64;
        self.repositories_with_commits += 1;

        for &date in dates {
            self.first_commit_at = Some(self.first_commit_at.map_or(date, |d| d.min(date)));
            self.last_commit_at = Some(self.last_commit_at.map_or(date, |d| d.max(date)));
        }
    }
}

/// Turn summed byte counts into shares sorted largest first (ties by name).
pub fn language_shares<I>(totals: I) -> (Vec<LanguageShare>, u64)
where
    I: IntoIterator<Item = (String, u64)>,
{
    let mut entries: Vec<(String, u64)> = totals.into_iter().filter(|(_, b)| *b > 0).collect();
    let total: u64 = entries.iter().map(|(_, b)| b).sum();

    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let shares = entries
        .into_iter()
        .map(|(name, bytes)| {
            let percentage = if total == 0 {
                0.0
            } else {
                (bytes as f64 / total as f64 * 10_000.0).round() / 100.0
            };
            LanguageShare {
                name,
                bytes,
                percentage,
            }
        })
        .collect();

    (shares, total)
}
