// copilot-mcp - Application context
//
// Owns everything that is shared between requests: the credential authority
// (one live token) and the gateway (completion cache). Built once at boot and
// handed to the method table; tests build as many independent contexts as
// they need.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use crate::auth::{CredentialAuthority, GithubAppProvider};
use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use crate::gateway::CopilotGateway;

pub const SERVER_NAME: &str = "copilot-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppContext {
    pub credentials: Arc<CredentialAuthority>,
    pub gateway: Arc<CopilotGateway>,
    pub start_time: Instant,
}

impl AppContext {
    pub fn new(credentials: Arc<CredentialAuthority>, gateway: Arc<CopilotGateway>) -> Self {
        Self {
            credentials,
            gateway,
            start_time: Instant::now(),
        }
    }

    /// Wire the production context from configuration. Missing or unusable
    /// credentials do not fail boot; the authority reports them on first use.
    pub fn from_config(config: &Config) -> BridgeResult<Self> {
        let client = http_client()?;

        let credentials = match &config.credentials {
            Ok(creds) => match GithubAppProvider::from_credentials(creds, client.clone(), &config.github_api_url) {
                Ok(provider) => {
                    tracing::info!(
                        app_id = %creds.app_id,
                        origin = ?creds.origin,
                        installation = creds.installation_id.is_some(),
                        "GitHub App credentials loaded"
                    );
                    CredentialAuthority::new(Arc::new(provider), creds.installation_id.clone())
                }
                Err(e) => {
                    tracing::error!("GitHub App credentials unusable: {}", e);
                    CredentialAuthority::unconfigured(e.to_string())
                }
            },
            Err(reason) => {
                tracing::warn!("GitHub App credentials not configured: {}", reason);
                CredentialAuthority::unconfigured(reason.clone())
            }
        };
        let credentials = Arc::new(credentials);

        let gateway = CopilotGateway::from_config(config, client, credentials.clone());
        Ok(Self::new(credentials, Arc::new(gateway)))
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Shared outbound HTTP client.
pub fn http_client() -> BridgeResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {}", e)))
}
