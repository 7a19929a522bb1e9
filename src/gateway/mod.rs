// copilot-mcp - Resilient upstream gateway
//! Outbound calls to the Copilot API with the installation token as bearer
//! credential. Responses are classified per attempt:
//!
//! | status          | attempts left | action                                   |
//! |-----------------|---------------|------------------------------------------|
//! | 2xx             | any           | return parsed body                       |
//! | 401 / 403       | yes           | force credential refresh, retry          |
//! | 429             | yes           | wait `retry-after` s (else 2^n), retry   |
//! | 5xx             | yes           | wait 2^n, retry                          |
//! | anything else   |               | `UpstreamRequestFailed { status, body }` |
//!
//! All categories draw from the same retry budget. Transport-level failures
//! (connect, timeout) and unparseable 2xx bodies are not retried.

pub mod cache;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::auth::CredentialAuthority;
use crate::config::{Config, DEFAULT_RETRIES};
use crate::error::{BridgeError, BridgeResult};
use crate::state::SERVER_NAME;

pub use cache::{fingerprint, ResponseCache};

/// Base unit for exponential backoff (2^attempt x unit).
const BACKOFF_UNIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Completions,
    Review,
    Explain,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Completions => "completions",
            Endpoint::Review => "review",
            Endpoint::Explain => "explain",
        }
    }
}

/// Per-call overrides for the completion wrapper.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub cache: bool,
    pub ttl: Option<Duration>,
    pub retries: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            cache: true,
            ttl: None,
            retries: DEFAULT_RETRIES,
        }
    }
}

pub struct CopilotGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialAuthority>,
    cache: ResponseCache,
    cache_enabled: bool,
    retries: u32,
    backoff_unit: Duration,
}

impl CopilotGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialAuthority>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            cache: ResponseCache::new(cache_ttl),
            cache_enabled: true,
            retries: DEFAULT_RETRIES,
            backoff_unit: BACKOFF_UNIT,
        }
    }

    pub fn from_config(config: &Config, client: reqwest::Client, credentials: Arc<CredentialAuthority>) -> Self {
        Self::new(client, config.copilot_api_base.clone(), credentials, config.cache_ttl)
            .with_retries(config.retries)
            .with_cache(config.cache_enabled)
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    // ── Forwarding operations ───────────────────────────────────────────

    /// Memoized completion call.
    pub async fn complete(&self, params: &Value, options: CompletionOptions) -> BridgeResult<Value> {
        let use_cache = self.cache_enabled && options.cache;
        let key = fingerprint(params);

        if use_cache {
            if let Some(hit) = self.cache.get(&key).await {
                tracing::debug!(key = %&key[..12], "gateway: completion cache hit");
                return Ok(hit);
            }
        }

        let result = self.call(Endpoint::Completions, params, options.retries).await?;
        if use_cache {
            let ttl = options.ttl.unwrap_or_else(|| self.cache.ttl());
            self.cache.insert_with_ttl(key, result.clone(), ttl).await;
        }
        Ok(result)
    }

    pub async fn review(&self, params: &Value) -> BridgeResult<Value> {
        self.call(Endpoint::Review, params, self.retries).await
    }

    pub async fn explain(&self, params: &Value) -> BridgeResult<Value> {
        self.call(Endpoint::Explain, params, self.retries).await
    }

    // ── Core retry loop ─────────────────────────────────────────────────

    pub async fn call(&self, endpoint: Endpoint, body: &Value, retries: u32) -> BridgeResult<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        let mut attempt: u32 = 0;

        loop {
            let token = self.credentials.get_token().await?;
            let resp = self
                .client
                .post(&url)
                .bearer_auth(token)
                .header("User-Agent", SERVER_NAME)
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                let text = resp.text().await?;
                return serde_json::from_str(&text).map_err(|e| {
                    tracing::error!(endpoint = endpoint.path(), "gateway: upstream returned invalid JSON: {}", e);
                    BridgeError::Internal(format!("invalid JSON from upstream {}: {}", endpoint.path(), e))
                });
            }

            if attempt < retries {
                let wait = match status {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        tracing::warn!(
                            endpoint = endpoint.path(),
                            status = status.as_u16(),
                            attempt,
                            "gateway: upstream rejected token, refreshing"
                        );
                        self.credentials.force_refresh().await?;
                        Some(Duration::ZERO)
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        let delay = retry_after(resp.headers()).unwrap_or_else(|| self.backoff(attempt));
                        tracing::warn!(
                            endpoint = endpoint.path(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "gateway: rate limited"
                        );
                        Some(delay)
                    }
                    s if s.is_server_error() => {
                        let delay = self.backoff(attempt);
                        tracing::warn!(
                            endpoint = endpoint.path(),
                            status = s.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "gateway: upstream server error"
                        );
                        Some(delay)
                    }
                    _ => None,
                };

                if let Some(delay) = wait {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                    continue;
                }
            }

            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                endpoint = endpoint.path(),
                status = status.as_u16(),
                attempt,
                "gateway: upstream call failed"
            );
            return Err(BridgeError::UpstreamRequestFailed {
                status: status.as_u16(),
                body,
            });
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt)
    }
}

/// `retry-after` as whole or fractional seconds. Zero, negative,
/// unrepresentable and HTTP-date values are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let secs: f64 = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    if secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}
