// copilot-mcp - Credential authority
//! Obtains, caches and refreshes the short-lived installation token.
//!
//! One credential lives per authority. It is replaced wholesale on refresh
//! and is never handed out within the safety margin of its expiry.
//!
//! Refresh policy: refreshes are serialized behind `refresh_lock`. A caller
//! that finds the cache stale takes the lock and re-checks the cache before
//! exchanging, so callers queued behind an in-flight refresh reuse its
//! result instead of starting their own. `force_refresh` always exchanges.

pub mod github_app;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::{BridgeError, BridgeResult};

pub use github_app::GithubAppProvider;

/// Seconds before expiry at which a credential counts as expired.
pub const SAFETY_MARGIN_SECS: i64 = 60;
/// Extra exchange attempts after an authorization failure.
pub const EXCHANGE_RETRIES: u32 = 2;
/// Delay unit for exchange retries (attempt index x unit).
const EXCHANGE_RETRY_UNIT: Duration = Duration::from_secs(1);

// ── Credential ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// `true` while `now` is before `expires_at - margin`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now < self.expires_at - margin
    }
}

// ── Identity provider seam ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("identity provider refused the app assertion ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("identity provider returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to sign app assertion: {0}")]
    Signing(String),

    #[error("identity provider request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed token response: {0}")]
    Malformed(String),
}

impl ExchangeError {
    /// 401 / 403 from the provider; the only class that is retried.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ExchangeError::Unauthorized { .. })
    }
}

/// Exchanges the application identity for an installation-scoped token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange(&self, installation_id: &str) -> Result<Credential, ExchangeError>;
}

// ── Authority ───────────────────────────────────────────────────────────────

enum CredentialSource {
    Configured {
        provider: Arc<dyn IdentityProvider>,
        installation_id: Option<String>,
    },
    /// Boot found no usable credentials; every token request fails with this reason.
    Unconfigured(String),
}

pub struct CredentialAuthority {
    source: CredentialSource,
    current: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    retry_unit: Duration,
    exchanges: AtomicU64,
}

impl CredentialAuthority {
    pub fn new(provider: Arc<dyn IdentityProvider>, installation_id: Option<String>) -> Self {
        Self::from_source(CredentialSource::Configured {
            provider,
            installation_id: installation_id.filter(|id| !id.trim().is_empty()),
        })
    }

    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self::from_source(CredentialSource::Unconfigured(reason.into()))
    }

    fn from_source(source: CredentialSource) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            retry_unit: EXCHANGE_RETRY_UNIT,
            exchanges: AtomicU64::new(0),
        }
    }

    pub fn with_retry_unit(mut self, unit: Duration) -> Self {
        self.retry_unit = unit;
        self
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.source, CredentialSource::Configured { .. })
    }

    /// Total exchange attempts made against the identity provider.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// A currently valid token, refreshing first when none is cached or the
    /// cached one is inside the safety margin.
    pub async fn get_token(&self) -> BridgeResult<String> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        tracing::debug!("credentials: cached token missing or expiring, refreshing");
        let credential = self.exchange_with_retry().await?;
        Ok(self.store(credential).await)
    }

    /// Unconditionally obtain a new credential. The previous one is discarded
    /// before the exchange, so it is never served again even if this fails.
    pub async fn force_refresh(&self) -> BridgeResult<()> {
        let _refresh = self.refresh_lock.lock().await;
        *self.current.write().await = None;

        tracing::info!("credentials: forced refresh");
        let credential = self.exchange_with_retry().await?;
        self.store(credential).await;
        Ok(())
    }

    async fn fresh_token(&self) -> Option<String> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.is_fresh(Utc::now(), chrono::Duration::seconds(SAFETY_MARGIN_SECS)))
            .map(|c| c.token.clone())
    }

    async fn store(&self, credential: Credential) -> String {
        let token = credential.token.clone();
        *self.current.write().await = Some(credential);
        token
    }

    async fn exchange_with_retry(&self) -> BridgeResult<Credential> {
        let (provider, installation_id) = match &self.source {
            CredentialSource::Unconfigured(reason) => {
                return Err(BridgeError::Configuration(reason.clone()));
            }
            CredentialSource::Configured {
                provider,
                installation_id,
            } => (provider, installation_id),
        };
        let Some(installation_id) = installation_id.as_deref() else {
            return Err(BridgeError::MissingInstallationIdentity);
        };

        let mut attempt: u32 = 0;
        loop {
            self.exchanges.fetch_add(1, Ordering::Relaxed);
            match provider.exchange(installation_id).await {
                Ok(credential) => {
                    tracing::info!(
                        expires_at = %credential.expires_at,
                        attempt,
                        "credentials: installation token obtained"
                    );
                    return Ok(credential);
                }
                Err(e) if e.is_auth_failure() && attempt < EXCHANGE_RETRIES => {
                    let delay = self.retry_unit * (attempt + 1);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "credentials: exchange unauthorized, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, "credentials: exchange failed: {}", e);
                    return Err(BridgeError::CredentialExchangeFailed {
                        attempts: attempt + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
