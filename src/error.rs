// Error types for ghsnap.
// Separates upstream fetch failures, lookup failures seen by callers,
// persistence failures (logged only) and configuration failures.

use thiserror::Error;

/// Failure of a single upstream fetch.
///
/// Cloneable so one outcome can be handed to every coalesced caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("GitHub rate limit exceeded{}", describe_retry(.retry_after_secs, .reset_at))]
    RateLimited {
        retry_after_secs: Option<u64>,
        reset_at: Option<i64>,
    },

    #[error("GitHub API error: {message}")]
    Upstream { message: String },
}

impl FetchError {
    pub fn upstream(message: impl Into<String>) -> Self {
        FetchError::Upstream {
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::upstream(err.to_string())
    }
}

/// Failure returned at the serving boundary when no snapshot, fresh or stale, exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("rate limited by GitHub{}", describe_retry(.retry_after_secs, .reset_at))]
    RateLimited {
        retry_after_secs: Option<u64>,
        reset_at: Option<i64>,
    },

    #[error("snapshot unavailable: {message}")]
    Unavailable { message: String },

    #[error("invalid lookup: {0}")]
    Configuration(String),
}

impl From<FetchError> for LookupError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::RateLimited {
                retry_after_secs,
                reset_at,
            } => LookupError::RateLimited {
                retry_after_secs,
                reset_at,
            },
            FetchError::Upstream { message } => LookupError::Unavailable { message },
        }
    }
}

/// Disk read/write failure. Never surfaced to callers.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no entry for key `{0}`")]
    MissingEntry(String),
}

/// Invalid or inconsistent settings, fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid cron schedule `{expression}`: {reason}")]
    Schedule { expression: String, reason: String },

    #[error("unknown timezone `{0}`")]
    Timezone(String),

    #[error("TTL must be greater than zero")]
    ZeroTtl,

    #[error("username list contains an empty entry")]
    EmptyUsername,

    #[error("username `{0}` is configured more than once")]
    DuplicateUsername(String),

    #[error("no cache directory configured and no platform cache directory available")]
    MissingCacheDir,

    #[error("invalid GitHub token: {0}")]
    Token(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("unknown log level `{0}`")]
    LogLevel(String),
}

/// Top-level error for the binary.
#[derive(Error, Debug)]
pub enum GhsnapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to initialise logging: {0}")]
    Telemetry(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GhsnapError>;

fn describe_retry(retry_after_secs: &Option<u64>, reset_at: &Option<i64>) -> String {
    match (*retry_after_secs, *reset_at) {
        (Some(secs), _) => format!(", retry after {secs}s"),
        (None, Some(reset)) => chrono::DateTime::from_timestamp(reset, 0)
            .map(|dt| format!(", resets at {}", dt.format("%H:%M:%S")))
            .unwrap_or_default(),
        (None, None) => String::new(),
    }
}
