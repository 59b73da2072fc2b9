//! HTTP access with bounded retries.
//!
//! Every provider sends its requests through [`RetryingClient`] instead of
//! calling `reqwest::RequestBuilder::send()` directly. Two layers of retry
//! apply:
//!
//! 1. **Connection-level**: connect errors, timeouts, HTTP 429 and HTTP 5xx
//!    are retried up to [`RetryPolicy::max_retries`] times with exponential
//!    backoff. Other 4xx responses are permanent.
//! 2. **Body-decode** ([`RetryingClient::json`] only): a body that is not
//!    valid JSON (truncated or garbled response) is re-fetched up to
//!    [`RetryPolicy::max_body_retries`] times, then surfaces as
//!    [`ProviderError::Parse`].
//!
//! Valid JSON of the wrong shape is not retried.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::providers::{
    ClientBuildSnafu, InvalidHeaderSnafu, ParseSnafu, ProviderError, ProviderInitError,
    RequestSnafu, StatusSnafu,
};

/// Maximum length of the response body preview included in logs and errors.
const BODY_PREVIEW_LEN: usize = 300;

/// Retry budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one for transient failures.
    pub max_retries: u32,
    /// Re-fetches after a response body failed to decode.
    pub max_body_retries: u32,
    /// Delay before the first retry; doubles with every further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_body_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Client-wide HTTP settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Per-request timeout (connect + transfer).
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Upper bound on requests per second across all concurrent callers.
    /// `None` disables client-side rate limiting.
    pub requests_per_second: Option<NonZeroU32>,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            requests_per_second: Some(nonzero_ext::nonzero!(4u32)),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// A `reqwest::Client` paired with a retry policy and an optional rate limiter.
///
/// Cheap to clone; clones share the connection pool and the limiter.
#[derive(Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryPolicy,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RetryingClient {
    /// Builds the underlying client with browser-like default headers.
    pub fn new(settings: &HttpSettings) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7",
            ),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&settings.user_agent).context(InvalidHeaderSnafu)?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .context(ClientBuildSnafu)?;

        let limiter = settings
            .requests_per_second
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            client,
            policy: settings.retry,
            limiter,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends a request and returns the body as text.
    ///
    /// `build` is called once per attempt because request builders are
    /// consumed by `send()`.
    pub async fn text<F>(&self, build: F) -> Result<String, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_err = None;
        for body_attempt in 0..=self.policy.max_body_retries {
            if body_attempt > 0 {
                tokio::time::sleep(self.policy.delay_for(body_attempt)).await;
            }
            let response = self.send(&build).await?;
            match response.text().await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(
                        "body read failed (attempt {}/{}): {e}",
                        body_attempt + 1,
                        self.policy.max_body_retries + 1
                    );
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e).context(RequestSnafu),
            None => ParseSnafu {
                message: "no response body".to_string(),
            }
            .fail(),
        }
    }

    /// Sends a request and decodes the JSON body into `T`.
    pub async fn json<T, F>(&self, build: F) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_message = String::new();
        for body_attempt in 0..=self.policy.max_body_retries {
            if body_attempt > 0 {
                tokio::time::sleep(self.policy.delay_for(body_attempt)).await;
            }
            let response = self.send(&build).await?;
            let url = response.url().to_string();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!("body read failed for {url}: {e}");
                    last_message = format!("body read failed for {url}: {e}");
                    continue;
                }
            };

            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => {
                    return serde_json::from_value(value).map_err(|e| {
                        ParseSnafu {
                            message: format!("unexpected JSON shape from {url}: {e}"),
                        }
                        .build()
                    });
                }
                Err(e) => {
                    let preview = preview(&text);
                    warn!(
                        "JSON decode failed (attempt {}/{}) for {url}: {e}; body: {preview}",
                        body_attempt + 1,
                        self.policy.max_body_retries + 1
                    );
                    last_message = format!("invalid JSON from {url}: {e}; body: {preview}");
                }
            }
        }
        ParseSnafu {
            message: last_message,
        }
        .fail()
    }

    /// Connection-level retry loop shared by [`Self::text`] and [`Self::json`].
    async fn send<F>(&self, build: &F) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max = self.policy.max_retries;
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                debug!("retry {attempt}/{max} in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            match build(&self.client).send().await {
                Err(e) => {
                    if is_transient(&e) && attempt < max {
                        warn!("transient error: {e}");
                        attempt += 1;
                        continue;
                    }
                    return Err(e).context(RequestSnafu);
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if retryable && attempt < max {
                        warn!("HTTP {status} from {}", response.url());
                        attempt += 1;
                        continue;
                    }
                    if status.is_client_error() || status.is_server_error() {
                        return StatusSnafu {
                            status: status.as_u16(),
                            url: response.url().to_string(),
                        }
                        .fail();
                    }
                    return Ok(response);
                }
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

fn preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_string();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
