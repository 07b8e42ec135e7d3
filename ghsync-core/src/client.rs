//! GitHub API transport
//!
//! A shared `reqwest` client carrying the bearer credential, plus the retry
//! policy applied to every GET: 429/5xx statuses and connection failures are
//! retried with exponential backoff, everything else surfaces immediately.

use crate::constants::{GITHUB_ACCEPT, RETRYABLE_STATUSES, USER_AGENT};
use crate::context::Context;
use crate::error::{Result, SyncError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for a server supplied Retry-After
const MAX_RETRY_AFTER_SECS: u64 = 300;

/// Exponential backoff settings for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay, doubles with each retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_context(ctx: &Context) -> Self {
        Self {
            max_retries: ctx.max_retries,
            base_delay: Duration::from_millis(ctx.retry_base_ms),
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(6); // cap at 64x
        self.base_delay * (1u32 << exp)
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// A successful response whose body has been read completely
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Raw `Link` header
    pub link: Option<String>,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body. Malformed JSON is a protocol error, not retried.
    pub fn json(&self, url: &str) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(|err| SyncError::FatalRequest {
            status: None,
            url: url.to_string(),
            message: format!("invalid JSON body: {}", err),
        })
    }
}

/// Authenticated GitHub API client, cheap to clone
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Build a client with bearer auth from the context
    pub fn new(ctx: &Context) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        if !ctx.github_token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", ctx.github_token))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(ctx.timeout())
            .build()?;

        Ok(Self {
            client,
            api_url: ctx.api_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_context(ctx),
        })
    }

    /// Absolute URL for an API path such as `/repos/owner/repo`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// GET with retries, returns only successful responses. The body is read
    /// inside the retry loop so a connection dropped mid-body is retried too.
    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        let mut retry = 0;
        loop {
            let (reason, retry_after) = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    let link = response
                        .headers()
                        .get(LINK)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    match response.text().await {
                        Ok(body) => return Ok(ApiResponse { link, body }),
                        Err(err) => (format!("reading body: {}", err), None),
                    }
                }
                Ok(response) if is_retryable_status(response.status()) => {
                    let retry_after = parse_retry_after(&response);
                    (format!("status {}", response.status()), retry_after)
                }
                Ok(response) => return Err(fatal_response(url, response).await),
                Err(err) if is_retryable_error(&err) => (err.to_string(), None),
                Err(err) => return Err(err.into()),
            };

            if retry >= self.retry.max_retries {
                return Err(SyncError::TransientNetwork(format!(
                    "GET {} failed after {} attempts: {}",
                    url,
                    retry + 1,
                    reason
                )));
            }

            retry += 1;
            let delay = self.retry.delay(retry).max(retry_after.unwrap_or_default());
            warn!(
                url = %url,
                retry,
                delay_ms = delay.as_millis() as u64,
                "request failed ({}), retrying",
                reason
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// GET a single JSON document
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        self.get(url).await?.json(url)
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

async fn fatal_response(url: &str, response: Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(url = %url, status = status.as_u16(), "non-retryable response: {}", body);

    // GitHub error bodies look like {"message": "...", "documentation_url": "..."}
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());

    SyncError::FatalRequest {
        status: Some(status.as_u16()),
        url: url.to_string(),
        message,
    }
}
