// copilot-mcp - GitHub App identity provider
//! Signs a short-lived RS256 app assertion and trades it for an
//! installation access token via `POST /app/installations/{id}/access_tokens`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{Credential, ExchangeError, IdentityProvider};
use crate::config::AppCredentials;
use crate::error::{BridgeError, BridgeResult};
use crate::state::SERVER_NAME;

/// Lifetime of the signed app assertion (GitHub caps it at 10 minutes).
pub const ASSERTION_TTL_SECS: i64 = 9 * 60;

#[derive(Debug, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct GithubAppProvider {
    app_id: String,
    key: EncodingKey,
    client: reqwest::Client,
    api_url: String,
}

impl GithubAppProvider {
    pub fn from_credentials(
        credentials: &AppCredentials,
        client: reqwest::Client,
        api_url: impl Into<String>,
    ) -> BridgeResult<Self> {
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes()).map_err(|e| {
            BridgeError::Configuration(format!("GitHub App private key is not a valid RSA PEM: {}", e))
        })?;

        Ok(Self {
            app_id: credentials.app_id.clone(),
            key,
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Signed assertion identifying the app itself.
    pub fn app_assertion(&self) -> Result<String, ExchangeError> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| ExchangeError::Signing(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GithubAppProvider {
    async fn exchange(&self, installation_id: &str) -> Result<Credential, ExchangeError> {
        let assertion = self.app_assertion()?;
        let url = format!("{}/app/installations/{}/access_tokens", self.api_url, installation_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(assertion)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", SERVER_NAME)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ExchangeError::Unauthorized {
                    status: status.as_u16(),
                    body,
                },
                code => ExchangeError::Rejected { status: code, body },
            });
        }

        let token: InstallationToken = resp
            .json()
            .await
            .map_err(|e| ExchangeError::Malformed(e.to_string()))?;
        if token.token.is_empty() {
            return Err(ExchangeError::Malformed("empty token".to_string()));
        }

        Ok(Credential {
            token: token.token,
            expires_at: token.expires_at,
        })
    }
}
