//! Rate-limit-aware REST + GraphQL client (§4.1).
//!
//! Grounded on `original_source/src/ace/github/api_client.py`'s retry table
//! and on the general "closed error enum, retry loop over owned request
//! data" idiom the teacher uses for its harness subprocess calls
//! (`gator-core::harness::claude_code`). No HTTP client exists in the
//! teacher's dependency stack (it talks to Postgres); `reqwest` is
//! introduced fresh here, matching the wider example pack's GitHub-API
//! client usage.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use thiserror::Error;

/// Status codes that must never be retried even if somehow re-seen — a
/// defensive list matching §8's invariant ("the retry layer never issues a
/// retry after receiving a non-retryable 4xx").
const NON_RETRYABLE_4XX: &[u16] = &[400, 401, 404, 422];

/// Status codes that are always retryable regardless of headers.
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("graphql rate limit exhausted: {0}")]
    GraphQlRateLimited(String),
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// A REST response, returned even on non-2xx status once retries are
/// exhausted — per §4.1, "on exhausted retries return the final response;
/// callers treat non-2xx as fail" rather than the client deciding for them.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value, RemoteError> {
        serde_json::from_str(&self.body).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

/// Tunables for the retry/backoff contract.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_retry_config(base_url, token, RetryConfig::default())
    }

    pub fn with_retry_config(
        base_url: impl Into<String>,
        token: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build http client");
        RemoteClient {
            http,
            base_url: base_url.into(),
            token: token.into(),
            retry,
        }
    }

    pub async fn get(&self, path: &str) -> Result<RemoteResponse, RemoteError> {
        self.request(reqwest::Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<RemoteResponse, RemoteError> {
        self.request(reqwest::Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<RemoteResponse, RemoteError> {
        self.request(reqwest::Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<RemoteResponse, RemoteError> {
        self.request(reqwest::Method::DELETE, path, None).await
    }

    /// Execute a GraphQL query, retrying rate-limited responses per §4.1.
    /// On exhaustion of GraphQL-rate-limit retries, raises
    /// `RemoteError::GraphQlRateLimited` — a distinct kind from a plain
    /// transport/status failure.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, RemoteError> {
        let body = serde_json::json!({ "query": query, "variables": variables });

        let mut attempt = 0;
        loop {
            let response = self.request(reqwest::Method::POST, "/graphql", Some(body.clone())).await?;
            let parsed = response.json()?;

            if let Some(message) = graphql_rate_limit_message(&parsed) {
                if attempt >= self.retry.max_retries {
                    return Err(RemoteError::GraphQlRateLimited(message));
                }
                let delay = backoff_delay(&self.retry, attempt);
                tracing::warn!(attempt, ?delay, "graphql rate limited, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Ok(parsed);
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<RemoteResponse, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token);
            if let Some(ref b) = body {
                builder = builder.json(b);
            }

            let send_result = builder.send().await;

            let response = match send_result {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= self.retry.max_retries {
                        return Err(RemoteError::Transport(e.to_string()));
                    }
                    let delay = backoff_delay(&self.retry, attempt);
                    tracing::warn!(attempt, error = %e, ?delay, "transport error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status().as_u16();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
                .collect();
            let body_text = response.text().await.unwrap_or_default();

            if should_retry(status, &headers) && attempt < self.retry.max_retries {
                let delay = select_delay(&self.retry, status, &headers, attempt);
                tracing::warn!(attempt, status, ?delay, "retryable response, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Ok(RemoteResponse {
                status,
                headers,
                body: body_text,
            });
        }
    }
}

/// Whether a status/header combination should be retried per §4.1.
fn should_retry(status: u16, headers: &HashMap<String, String>) -> bool {
    if NON_RETRYABLE_4XX.contains(&status) {
        return false;
    }
    if RETRYABLE_STATUSES.contains(&status) {
        return true;
    }
    if status == 403 {
        let rate_limit_exhausted = headers
            .get("x-ratelimit-remaining")
            .map(|v| v == "0")
            .unwrap_or(false);
        let has_retry_after = headers.contains_key("retry-after");
        return rate_limit_exhausted || has_retry_after;
    }
    false
}

/// Delay selection per §4.1: Retry-After header, then rate-limit reset,
/// then exponential backoff with jitter.
fn select_delay(
    retry: &RetryConfig,
    _status: u16,
    headers: &HashMap<String, String>,
    attempt: u32,
) -> Duration {
    if let Some(retry_after) = headers.get("retry-after").and_then(|v| v.parse::<f64>().ok()) {
        return Duration::from_secs_f64(retry_after.max(0.0));
    }

    if headers.get("x-ratelimit-remaining").map(|v| v == "0").unwrap_or(false) {
        if let Some(reset) = headers.get("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
            let now = chrono::Utc::now().timestamp();
            let remaining = (reset - now).max(0);
            return Duration::from_secs(remaining as u64) + Duration::from_secs(1);
        }
    }

    backoff_delay(retry, attempt)
}

/// Exponential backoff with uniform jitter, clamped to `maxDelay`:
/// `base * 2^attempt + jitter(0, base)`.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let base = retry.base_delay.as_secs_f64();
    let exp = base * 2f64.powi(attempt as i32);
    let jitter = rand::rng().random_range(0.0..base.max(f64::MIN_POSITIVE));
    let total = (exp + jitter).min(retry.max_delay.as_secs_f64());
    Duration::from_secs_f64(total)
}

fn graphql_rate_limit_message(parsed: &Value) -> Option<String> {
    let errors = parsed.get("errors")?.as_array()?;
    for err in errors {
        let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("");
        let kind = err.get("type").and_then(|t| t.as_str()).unwrap_or("");
        if message.to_lowercase().contains("rate limit") || kind.to_lowercase().contains("rate limit") {
            return Some(if !message.is_empty() { message.to_string() } else { kind.to_string() });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_4xx_never_retried() {
        for status in NON_RETRYABLE_4XX {
            assert!(!should_retry(*status, &HashMap::new()));
        }
    }

    #[test]
    fn standard_retryable_statuses() {
        for status in RETRYABLE_STATUSES {
            assert!(should_retry(*status, &HashMap::new()));
        }
    }

    #[test]
    fn forbidden_is_retryable_only_with_rate_limit_signal() {
        assert!(!should_retry(403, &HashMap::new()));

        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-remaining".to_string(), "0".to_string());
        assert!(should_retry(403, &headers));

        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "5".to_string());
        assert!(should_retry(403, &headers));
    }

    #[test]
    fn select_delay_prefers_retry_after_header() {
        let retry = RetryConfig::default();
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "3.5".to_string());
        let delay = select_delay(&retry, 429, &headers, 0);
        assert_eq!(delay, Duration::from_secs_f64(3.5));
    }

    #[test]
    fn select_delay_uses_rate_limit_reset_when_no_retry_after() {
        let retry = RetryConfig::default();
        let now = chrono::Utc::now().timestamp();
        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-remaining".to_string(), "0".to_string());
        headers.insert("x-ratelimit-reset".to_string(), (now + 5).to_string());
        let delay = select_delay(&retry, 403, &headers, 0);
        // scenario 4: reset ~5s out -> sleeps ~6s (reset-now, floor 0) + 1s
        assert!(delay.as_secs_f64() >= 5.0 && delay.as_secs_f64() <= 7.0);
    }

    #[test]
    fn select_delay_falls_back_to_backoff() {
        let retry = RetryConfig::default();
        let delay = select_delay(&retry, 500, &HashMap::new(), 0);
        assert!(delay.as_secs_f64() >= retry.base_delay.as_secs_f64());
        assert!(delay <= retry.max_delay);
    }

    #[test]
    fn backoff_clamped_to_max_delay() {
        let retry = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        let delay = backoff_delay(&retry, 10);
        assert!(delay <= retry.max_delay);
    }

    #[test]
    fn graphql_rate_limit_detected_by_message() {
        let parsed = serde_json::json!({
            "errors": [{"message": "API rate limit exceeded for installation"}]
        });
        assert!(graphql_rate_limit_message(&parsed).is_some());
    }

    #[test]
    fn graphql_rate_limit_detected_by_type() {
        let parsed = serde_json::json!({
            "errors": [{"type": "RATE_LIMITED", "message": "slow down"}]
        });
        assert!(graphql_rate_limit_message(&parsed).is_some());
    }

    #[test]
    fn graphql_non_rate_limit_errors_ignored() {
        let parsed = serde_json::json!({
            "errors": [{"message": "field not found"}]
        });
        assert!(graphql_rate_limit_message(&parsed).is_none());
    }

    #[tokio::test]
    async fn get_retries_on_503_then_succeeds() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::with_retry_config(
            server.uri(),
            "token",
            RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
            },
        );

        let response = client.get("/flaky").await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");
    }

    #[tokio::test]
    async fn get_returns_final_response_after_exhausting_retries() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/always-503"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RemoteClient::with_retry_config(
            server.uri(),
            "token",
            RetryConfig {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        );

        let response = client.get("/always-503").await.unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn get_does_not_retry_404() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteClient::new(server.uri(), "token");
        let response = client.get("/missing").await.unwrap();
        assert_eq!(response.status, 404);
    }
}
