// GitHub API HTTP client.
// Handles authentication, rate limit tracking, and response classification.

use parking_lot::Mutex;
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};

use crate::error::{ConfigError, FetchError};

use super::types::RateLimit;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub API client with optional authentication and rate limit tracking.
///
/// Shared between concurrent fetches, so the rate limit snapshot sits behind a lock.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a new client. Without a token requests are unauthenticated (60/hour).
    pub fn new(token: Option<&str>, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();

        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ConfigError::Token(e.to_string()))?,
            );
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("ghsnap/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Get the most recently observed rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit.lock().clone()
    }

    /// Make a GET request with query parameters, returning the raw response
    /// after rate limit tracking. Status is not checked.
    pub async fn get_raw<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<Response, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.get(&url).query(params).send().await?;

        self.update_rate_limit(response.headers());
        Ok(response)
    }

    /// Make a GET request with query parameters and convert error statuses.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<Response, FetchError> {
        let response = self.get_raw(endpoint, params).await?;
        check_response(response).await
    }

    /// Make a GET request to the GitHub API.
    pub async fn get(&self, endpoint: &str) -> Result<Response, FetchError> {
        self.get_with_params(endpoint, &[] as &[(&str, &str)]).await
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, headers: &HeaderMap) {
        let mut rate_limit = self.rate_limit.lock();

        if let Some(limit) = header_number(headers, "x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header_number(headers, "x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header_number(headers, "x-ratelimit-reset") {
            rate_limit.reset = reset;
        }

        if rate_limit.remaining == 0 && rate_limit.limit > 0 {
            tracing::warn!(
                limit = rate_limit.limit,
                reset = rate_limit.reset,
                "GitHub rate limit exhausted"
            );
        }
    }
}

/// Check response status and convert errors.
pub async fn check_response(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if let Some(err) = rate_limit_error(status, response.headers()) {
        return Err(err);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(FetchError::upstream(
            "authentication failed: invalid or expired token",
        )),
        StatusCode::NOT_FOUND => Err(FetchError::upstream(format!(
            "resource not found: {}",
            response.url()
        ))),
        status => Err(FetchError::upstream(format!(
            "HTTP {}: {}",
            status,
            response.text().await.unwrap_or_default()
        ))),
    }
}

/// Detect GitHub throttling from status and headers.
///
/// Primary limits answer 403/429 with `x-ratelimit-remaining: 0`; secondary
/// limits send `Retry-After` instead.
pub fn rate_limit_error(status: StatusCode, headers: &HeaderMap) -> Option<FetchError> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let retry_after_secs = header_number(headers, RETRY_AFTER.as_str());
    let remaining = header_number(headers, "x-ratelimit-remaining");
    let reset_at = header_number(headers, "x-ratelimit-reset").map(|r| r as i64);

    if retry_after_secs.is_some() || remaining == Some(0) {
        Some(FetchError::RateLimited {
            retry_after_secs,
            reset_at,
        })
    } else {
        None
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
