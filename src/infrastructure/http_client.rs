//! Resilient HTTP fetching
//!
//! [`ResilientFetcher`] wraps a single GET in a retry loop over an
//! [`HttpTransport`]. Only transport failures (connect errors, timeouts,
//! unreadable bodies) are retried, with linear backoff and a fresh identity
//! per attempt. Any HTTP response, whatever its status, is returned as-is.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HOST, USER_AGENT};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::identity::IdentityStrategy;

/// A transport-level failure. Every variant is retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Terminal outcome of a resilient fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid address '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("giving up on {url} after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
}

impl FetchError {
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::InvalidUrl { .. } => 0,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// One fully prepared request handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A complete response with its body already read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }
}

/// Performs exactly one request, no retries.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create the transport from fetch configuration
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(redirect)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client })
    }

    fn classify(url: &str, error: &reqwest::Error) -> TransportError {
        let url = url.to_string();
        if error.is_timeout() {
            TransportError::Timeout { url }
        } else if error.is_connect() {
            TransportError::Connect {
                url,
                message: error.to_string(),
            }
        } else if error.is_body() || error.is_decode() {
            TransportError::Body {
                url,
                message: error.to_string(),
            }
        } else {
            TransportError::Request {
                url,
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::classify(&request.url, &e))?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        Ok(HttpResponse { url, status, body })
    }
}

/// Per-call request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bound on a single attempt; firing counts as a transport failure
    pub timeout: Option<Duration>,
    /// Extra headers; user-agent and host are always overridden
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Options for JSON endpoints
    #[must_use]
    pub fn json() -> Self {
        Self::default().with_header(ACCEPT.as_str(), "application/json")
    }
}

/// Retry schedule: `max_retries` extra attempts, linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::infrastructure::config::defaults;
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_delay: Duration::from_millis(defaults::RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.retry_delay.checked_mul(retry).unwrap_or(Duration::MAX)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Retrying fetcher with identity rotation.
#[derive(Clone)]
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    identity: Arc<dyn IdentityStrategy>,
    policy: RetryPolicy,
    target_host: Option<String>,
    context_label: Option<String>,
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("identity", &self.identity)
            .field("policy", &self.policy)
            .field("target_host", &self.target_host)
            .field("context_label", &self.context_label)
            .finish_non_exhaustive()
    }
}

impl ResilientFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        identity: Arc<dyn IdentityStrategy>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            identity,
            policy,
            target_host: None,
            context_label: None,
        }
    }

    /// Fixed `Host` header sent on every attempt
    #[must_use]
    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    /// Human-readable label for logging provenance
    #[must_use]
    pub fn with_context_label(mut self, label: &str) -> Self {
        self.context_label = Some(label.to_string());
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `url`, retrying transport failures according to the policy.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let label = self.context_label.as_deref().unwrap_or("fetch");

        let mut retries = 0;
        loop {
            let attempt = retries + 1;
            let request = self.prepare(&parsed, options, attempt);
            debug!(
                "🌐 [{}] GET (attempt {}/{}) : {}",
                label,
                attempt,
                self.policy.max_attempts(),
                url
            );

            match self.transport.send(request).await {
                Ok(response) => {
                    if !response.is_success() {
                        debug!("[{}] HTTP {} from {}", label, response.status, url);
                    }
                    return Ok(response);
                }
                Err(error) if retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = self.policy.backoff(retries);
                    warn!(
                        "⚠️ [{}] attempt {} failed: {}; retrying in {:?}",
                        label, attempt, error, delay
                    );
                    sleep(delay).await;
                }
                Err(error) => {
                    warn!("❌ [{}] giving up on {} after {} attempts", label, url, attempt);
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    fn prepare(&self, url: &Url, options: &FetchOptions, attempt: u32) -> HttpRequest {
        let overridden = |name: &str| {
            name.eq_ignore_ascii_case(USER_AGENT.as_str())
                || (self.target_host.is_some() && name.eq_ignore_ascii_case(HOST.as_str()))
        };

        let mut headers: Vec<(String, String)> = options
            .headers
            .iter()
            .filter(|(name, _)| !overridden(name))
            .cloned()
            .collect();
        headers.push((
            USER_AGENT.as_str().to_string(),
            self.identity.user_agent(attempt),
        ));
        if let Some(host) = &self.target_host {
            headers.push((HOST.as_str().to_string(), host.clone()));
        }

        HttpRequest {
            url: url.to_string(),
            headers,
            timeout: options.timeout,
        }
    }
}
