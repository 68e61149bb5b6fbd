//! HTTP implementation of the flag source.
//!
//! One cycle: derive fresh auth headers, GET the flag resource, decode the
//! JSON payload. The caller decides when and how often a cycle runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use flagpole_core::constants::{DEFAULT_REQUEST_TIMEOUT_SECONDS, FLAG_RESOURCE_PATH};
use flagpole_core::error::{FlagError, Result};
use flagpole_core::traits::{FlagSource, RequestAuthenticator};
use flagpole_core::types::FlagPayload;

/// HTTP flag source configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host of the compute endpoint (e.g. "dbc-1234.cloud.example.com").
    /// A plain host gets "https://" prepended; an explicit "http://" or
    /// "https://" prefix is kept as-is.
    pub host: String,
    /// Product version embedded in the resource path.
    pub product_version: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl ClientConfig {
    /// Creates a config for the given host and product version.
    pub fn new(host: impl Into<String>, product_version: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            product_version: product_version.into(),
            timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }

    /// Overrides the request timeout.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Full URL of the flag resource for this endpoint.
    pub fn flag_url(&self) -> String {
        let base = self.host.trim_end_matches('/');
        let base = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("https://{}", base)
        };
        format!("{}{}/{}", base, FLAG_RESOURCE_PATH, self.product_version)
    }
}

/// Flag source that fetches payloads over HTTP.
///
/// Authentication headers are re-derived from the injected authenticator on
/// every cycle, so rotated tokens are picked up without restarting anything.
pub struct HttpFlagSource {
    config: ClientConfig,
    authenticator: Arc<dyn RequestAuthenticator>,
    http_client: reqwest::Client,
}

impl HttpFlagSource {
    /// Creates a source with the given config and authenticator.
    pub fn with_config(config: ClientConfig, authenticator: Arc<dyn RequestAuthenticator>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            authenticator,
            http_client,
        }
    }
}

#[async_trait]
impl FlagSource for HttpFlagSource {
    #[instrument(skip(self), fields(host = %self.config.host))]
    async fn fetch(&self) -> Result<FlagPayload> {
        let url = self.config.flag_url();
        let headers = self.authenticator.headers().await?;

        let mut request = self.http_client.get(&url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FlagError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FlagError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlagError::Transport(e.to_string()))?;
        let payload: FlagPayload = serde_json::from_str(&body)?;

        debug!(flags = payload.flags.len(), ttl = ?payload.ttl_seconds, "Fetched feature flags");
        Ok(payload)
    }
}
