//! Configuration: command-line flags with environment fallbacks, validated into [`Settings`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::cache::paths::default_snapshot_dir;
use crate::error::ConfigError;
use crate::fetch::FetchOptions;
use crate::github::GITHUB_API_BASE;
use crate::refresh::{DEFAULT_SCHEDULE, DEFAULT_TIMEZONE, RefreshSchedule};

const DEFAULT_TTL_SECONDS: u64 = 6 * 60 * 60;
const DEFAULT_KEY_DELAY_MS: u64 = 2_000;
const DEFAULT_MAX_REPOS: u32 = 100;
const DEFAULT_COMMITS_PER_REPO: u32 = 100;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments for the ghsnap binary.
#[derive(Debug, Parser)]
#[command(
    name = "ghsnap",
    version,
    about = "Keeps aggregated GitHub user snapshots cached and warm"
)]
pub struct CliArgs {
    /// GitHub token; requests are unauthenticated without one.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Base URL of the GitHub REST API.
    #[arg(long, env = "GHSNAP_GITHUB_API_URL", default_value = GITHUB_API_BASE)]
    pub github_api_url: String,

    /// Comma-separated usernames refreshed on the schedule.
    #[arg(long, env = "GHSNAP_USERS", value_delimiter = ',')]
    pub users: Vec<String>,

    /// Seconds a snapshot stays fresh.
    #[arg(long, env = "GHSNAP_TTL_SECONDS", default_value_t = DEFAULT_TTL_SECONDS)]
    pub ttl_seconds: u64,

    /// Cron expression (seconds first) for scheduled refreshes.
    #[arg(long, env = "GHSNAP_SCHEDULE", default_value = DEFAULT_SCHEDULE)]
    pub schedule: String,

    /// IANA timezone the schedule is evaluated in.
    #[arg(long, env = "GHSNAP_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// Directory for persisted snapshots.
    #[arg(long, env = "GHSNAP_CACHE_DIR", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Pause between users within one refresh pass, in milliseconds.
    #[arg(long, env = "GHSNAP_KEY_DELAY_MS", default_value_t = DEFAULT_KEY_DELAY_MS)]
    pub key_delay_ms: u64,

    /// Maximum repositories analysed per user.
    #[arg(long, env = "GHSNAP_MAX_REPOS", default_value_t = DEFAULT_MAX_REPOS)]
    pub max_repos: u32,

    /// Count forked repositories too.
    #[arg(long, env = "GHSNAP_INCLUDE_FORKS")]
    pub include_forks: bool,

    /// Commits listed per repository (1-100).
    #[arg(long, env = "GHSNAP_COMMITS_PER_REPO", default_value_t = DEFAULT_COMMITS_PER_REPO)]
    pub commits_per_repo: u32,

    /// Base log level (trace|debug|info|warn|error); RUST_LOG overrides it.
    #[arg(long, env = "GHSNAP_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "GHSNAP_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Load persisted snapshots, keep configured users warm until Ctrl-C.
    Run,
    /// Look up one user's snapshot and print it as JSON.
    Show {
        /// GitHub username.
        login: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub users: Vec<String>,
    pub ttl_seconds: u64,
    pub schedule: RefreshSchedule,
    pub cache_dir: PathBuf,
    pub key_delay: Duration,
    pub fetch: FetchOptions,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        if args.ttl_seconds == 0 {
            return Err(ConfigError::ZeroTtl);
        }

        let cache_dir = match &args.cache_dir {
            Some(dir) => dir.clone(),
            None => default_snapshot_dir().ok_or(ConfigError::MissingCacheDir)?,
        };

        let level = LevelFilter::from_str(&args.log_level)
            .map_err(|_| ConfigError::LogLevel(args.log_level.clone()))?;

        Ok(Self {
            github_token: args
                .github_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            github_api_url: args.github_api_url.clone(),
            users: validate_users(&args.users)?,
            ttl_seconds: args.ttl_seconds,
            schedule: RefreshSchedule::parse(&args.schedule, &args.timezone)?,
            cache_dir,
            key_delay: Duration::from_millis(args.key_delay_ms),
            fetch: FetchOptions {
                max_repos: args.max_repos,
                include_forks: args.include_forks,
                commits_per_repo: args.commits_per_repo.clamp(1, 100),
            },
            logging: LoggingSettings {
                level,
                format: if args.log_json {
                    LogFormat::Json
                } else {
                    LogFormat::Compact
                },
            },
        })
    }
}

/// Trim names and reject blanks and duplicates, keeping configured order.
///
/// A single blank entry (an empty `GHSNAP_USERS`) means no users.
fn validate_users(raw: &[String]) -> Result<Vec<String>, ConfigError> {
    if let [only] = raw {
        if only.trim().is_empty() {
            return Ok(Vec::new());
        }
    }

    let mut seen = HashSet::new();
    let mut users = Vec::with_capacity(raw.len());
    for name in raw {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::DuplicateUsername(name.to_string()));
        }
        users.push(name.to_string());
    }
    Ok(users)
}
