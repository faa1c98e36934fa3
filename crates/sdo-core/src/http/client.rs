//! HTTP client for GitHub API, raw content and CDN mirrors.
//!
//! This module wraps `reqwest` with:
//! - Automatic retry with exponential backoff for timeouts, connection
//!   failures and unexpected statuses
//! - 404 reported as a definitive `NotFound`, never retried
//! - API rate limits (403/429) reported immediately with reset metadata
//! - Optional bearer token, attached only to requests that ask for it
//! - Cooperative cancellation checked before every attempt
//!
//! # Examples
//!
//! ```no_run
//! use sdo_core::http::{HttpClient, HttpClientConfig};
//! use sdo_core::transport::{FetchRequest, Transport};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_max_retries(5)
//!     .with_token(Some("ghp_example".to_string()));
//!
//! let client = HttpClient::with_config(config)?;
//! let bytes = client
//!     .fetch(FetchRequest::api("https://api.github.com/repos/owner/name/branches/42"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};

use crate::cancel::Cancellation;
use crate::error::FetchError;
use crate::transport::{EndpointKind, FetchRequest, Transport};

const DEFAULT_USER_AGENT: &str = concat!("sdo/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

pub struct HttpClient {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
    token: Option<String>,
    cancel: Cancellation,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .user_agent(&config.user_agent);

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            token: config.token,
            cancel: Cancellation::new(),
        })
    }

    /// Observe a cancellation flag before every attempt and backoff sleep.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// GET with retries, mapping the final outcome onto [`FetchError`].
    pub async fn get_bytes(&self, request: FetchRequest<'_>) -> Result<Vec<u8>, FetchError> {
        let url = request.url;
        let mut last_reason = String::from("no attempt made");

        for attempt in 0..=self.max_retries {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            match self.execute_get(request).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.bytes().await {
                            Ok(bytes) => return Ok(bytes.to_vec()),
                            Err(e) => last_reason = format!("body read failed: {}", e),
                        }
                    } else if status == StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound { url: url.to_string() });
                    } else if let Some(reset_at) = self.rate_limit(request.kind, response).await {
                        log::warn!("Rate limited on {}", url);
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            reset_at,
                        });
                    } else if request.kind == EndpointKind::Api && status == StatusCode::FORBIDDEN {
                        return Err(FetchError::Network {
                            url: url.to_string(),
                            reason: "HTTP 403".to_string(),
                        });
                    } else {
                        last_reason = format!("HTTP {}", status.as_u16());
                    }
                }
                Err(e) => {
                    last_reason = if e.is_timeout() {
                        "timed out".to_string()
                    } else if e.is_connect() {
                        format!("connection failed: {}", e)
                    } else {
                        e.to_string()
                    };
                }
            }

            log::debug!("Attempt {} for {} failed: {}", attempt + 1, url, last_reason);

            // Don't sleep after the last attempt
            if attempt < self.max_retries {
                // Exponential backoff: 1s, 2s, 4s, 8s, etc.
                let delay = self.retry_delay * 2_u32.pow(attempt);
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::Network {
            url: url.to_string(),
            reason: format!("{} after {} attempts", last_reason, self.max_retries + 1),
        })
    }

    /// Execute a GET request without retries
    async fn execute_get(&self, request: FetchRequest<'_>) -> Result<Response, reqwest::Error> {
        let mut builder = self.client.get(request.url);

        if request.kind == EndpointKind::Api {
            builder = builder.header("Accept", GITHUB_ACCEPT);
        }

        if request.use_token {
            if let Some(ref token) = self.token {
                builder = builder.bearer_auth(token);
            }
        }

        builder.send().await
    }

    /// Classify a non-success API response as a rate limit.
    ///
    /// Returns `Some(reset_at)` when the response is a rate limit. The reset
    /// hint itself may be absent.
    async fn rate_limit(
        &self,
        kind: EndpointKind,
        response: Response,
    ) -> Option<Option<DateTime<Utc>>> {
        if kind != EndpointKind::Api {
            return None;
        }

        let status = response.status();
        if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
            return None;
        }

        let headers = response.headers().clone();
        let exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);

        let limited = status == StatusCode::TOO_MANY_REQUESTS
            || exhausted
            || response
                .text()
                .await
                .map(|body| body.to_lowercase().contains("rate limit"))
                .unwrap_or(false);

        limited.then(|| reset_hint(&headers))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(request).await
    }
}

/// Reset time from `x-ratelimit-reset` (epoch seconds) or `retry-after`
/// (delta seconds).
fn reset_hint(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(epoch) = header("x-ratelimit-reset") {
        return DateTime::from_timestamp(epoch, 0);
    }

    header("retry-after").map(|secs| Utc::now() + chrono::Duration::seconds(secs))
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub token: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            token: None,
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fast_client(token: Option<&str>) -> HttpClient {
        let config = HttpClientConfig::new()
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(1))
            .with_token(token.map(str::to_string));
        HttpClient::with_config(config).unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = HttpClientConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_connect_timeout(Duration::from_secs(5))
            .with_max_retries(5)
            .with_proxy("http://proxy.local:3128".to_string());

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.proxy.as_deref(), Some("http://proxy.local:3128"));
    }

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();

        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.proxy.is_none());
        assert!(config.token.is_none());
    }

    #[test]
    fn test_reset_hint_epoch() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", "1700000000".parse().unwrap());
        let reset = reset_hint(&headers).unwrap();
        assert_eq!(reset.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_reset_hint_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "60".parse().unwrap());
        let reset = reset_hint(&headers).unwrap();
        assert!(reset > Utc::now());
    }

    #[tokio::test]
    async fn test_client_creation() {
        assert!(HttpClient::new().is_ok());

        let config = HttpClientConfig::new().with_proxy("http://proxy.local:3128".to_string());
        assert!(HttpClient::with_config(config).is_ok());
    }

    #[tokio::test]
    async fn test_success_returns_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/file");
                then.status(200).body("hello");
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/file");
        let bytes = client.fetch(FetchRequest::content(&url, false)).await.unwrap();

        assert_eq!(bytes, b"hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_404_is_not_found_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/missing");
        let result = client.fetch(FetchRequest::api(&url)).await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_server_error_retries_then_network() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(502);
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/flaky");
        let result = client.fetch(FetchRequest::content(&url, false)).await;

        match result {
            Err(FetchError::Network { reason, .. }) => assert!(reason.contains("HTTP 502")),
            other => panic!("expected network error, got {:?}", other),
        }
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_api_rate_limit_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/o/r/branches/1");
                then.status(403)
                    .header("x-ratelimit-remaining", "0")
                    .header("x-ratelimit-reset", "1700000000")
                    .body(r#"{"message": "API rate limit exceeded"}"#);
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/repos/o/r/branches/1");
        let result = client.fetch(FetchRequest::api(&url)).await;

        match result {
            Err(FetchError::RateLimited { reset_at, .. }) => {
                assert_eq!(reset_at.unwrap().timestamp(), 1_700_000_000);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_429_on_api_is_rate_limited() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api");
                then.status(429).header("retry-after", "30");
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/api");
        let result = client.fetch(FetchRequest::api(&url)).await;
        assert!(matches!(result, Err(FetchError::RateLimited { reset_at: Some(_), .. })));
    }

    #[tokio::test]
    async fn test_plain_403_on_api_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/private");
                then.status(403).body(r#"{"message": "Resource not accessible"}"#);
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/private");
        let result = client.fetch(FetchRequest::api(&url)).await;
        assert!(matches!(result, Err(FetchError::Network { reason, .. }) if reason == "HTTP 403"));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_403_on_content_is_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/raw");
                then.status(403).body("rate limit");
            })
            .await;

        let client = fast_client(None);
        let url = server.url("/raw");
        let result = client.fetch(FetchRequest::content(&url, false)).await;
        assert!(matches!(result, Err(FetchError::Network { .. })));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_token_only_when_requested() {
        let server = MockServer::start_async().await;
        let authed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/authed")
                    .header("Authorization", "Bearer ghp_secret")
                    .header("Accept", GITHUB_ACCEPT);
                then.status(200).body("ok");
            })
            .await;
        let anonymous = server
            .mock_async(|when, then| {
                when.method(GET).path("/anon").matches(|req| {
                    !req.headers
                        .iter()
                        .flatten()
                        .any(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                });
                then.status(200).body("ok");
            })
            .await;

        let client = fast_client(Some("ghp_secret"));
        let authed_url = server.url("/authed");
        let anon_url = server.url("/anon");
        client.fetch(FetchRequest::api(&authed_url)).await.unwrap();
        client.fetch(FetchRequest::content(&anon_url, false)).await.unwrap();

        authed.assert_async().await;
        anonymous.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancelled_client_makes_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/x");
                then.status(200);
            })
            .await;

        let cancel = Cancellation::new();
        cancel.cancel();
        let client = fast_client(None).with_cancellation(cancel);
        let url = server.url("/x");

        assert_eq!(client.fetch(FetchRequest::api(&url)).await, Err(FetchError::Cancelled));
        mock.assert_hits_async(0).await;
    }
}
