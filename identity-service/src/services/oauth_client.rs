//! Wire-level OAuth2 token exchange against Microsoft Entra ID.
//!
//! No retries happen here. Any transport failure, non-2xx status or body
//! that does not carry a usable access token surfaces as [`UpstreamError`].

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::EntraConfig;

/// Longest access-token lifetime accepted from the token endpoint.
pub const MAX_EXPIRES_IN_SECONDS: i64 = 86_400 * 365;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Application registration used for an exchange.
#[derive(Debug, Clone)]
pub struct OAuthClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

impl From<&EntraConfig> for OAuthClientCredentials {
    fn from(config: &EntraConfig) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[async_trait]
pub trait OAuthExchangeClient: Send + Sync {
    /// `authorization_code` grant.
    async fn exchange_code(
        &self,
        code: &str,
        credentials: &OAuthClientCredentials,
    ) -> Result<ProviderTokenResponse, UpstreamError>;

    /// `refresh_token` grant.
    async fn refresh(
        &self,
        refresh_token: &str,
        credentials: &OAuthClientCredentials,
    ) -> Result<ProviderTokenResponse, UpstreamError>;
}

#[derive(Clone)]
pub struct EntraTokenClient {
    http: reqwest::Client,
    authority: String,
    scope: String,
}

impl EntraTokenClient {
    pub fn new(authority: &str, scope: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            authority: authority.trim_end_matches('/').to_string(),
            scope: scope.to_string(),
        })
    }

    pub fn from_config(config: &EntraConfig) -> Result<Self, anyhow::Error> {
        Self::new(
            &config.authority,
            &config.scope,
            Duration::from_secs(config.http_timeout_seconds),
        )
    }

    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, tenant_id)
    }

    /// Where to send the user to grant consent. `state` comes back on the callback.
    pub fn authorize_url(&self, credentials: &OAuthClientCredentials, state: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize?client_id={}&response_type=code&redirect_uri={}&response_mode=query&scope={}&state={}",
            self.authority,
            urlencoding::encode(&credentials.tenant_id),
            urlencoding::encode(&credentials.client_id),
            urlencoding::encode(&credentials.redirect_uri),
            urlencoding::encode(&self.scope),
            urlencoding::encode(state),
        )
    }

    async fn post_form(
        &self,
        tenant_id: &str,
        form: &[(&str, &str)],
    ) -> Result<ProviderTokenResponse, UpstreamError> {
        let response = self
            .http
            .post(self.token_endpoint(tenant_id))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(%status, "Provider token endpoint rejected request");
            return Err(UpstreamError::Status { status, body });
        }

        let parsed: ProviderTokenResponse = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;

        if parsed.access_token.is_empty() {
            return Err(UpstreamError::Malformed("empty access_token".to_string()));
        }
        if parsed.expires_in <= 0 || parsed.expires_in > MAX_EXPIRES_IN_SECONDS {
            return Err(UpstreamError::Malformed(format!(
                "expires_in out of range: {}",
                parsed.expires_in
            )));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl OAuthExchangeClient for EntraTokenClient {
    #[tracing::instrument(skip_all, fields(tenant_id = %credentials.tenant_id))]
    async fn exchange_code(
        &self,
        code: &str,
        credentials: &OAuthClientCredentials,
    ) -> Result<ProviderTokenResponse, UpstreamError> {
        self.post_form(
            &credentials.tenant_id,
            &[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret().as_str()),
                ("code", code),
                ("redirect_uri", credentials.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("scope", self.scope.as_str()),
            ],
        )
        .await
    }

    #[tracing::instrument(skip_all, fields(tenant_id = %credentials.tenant_id))]
    async fn refresh(
        &self,
        refresh_token: &str,
        credentials: &OAuthClientCredentials,
    ) -> Result<ProviderTokenResponse, UpstreamError> {
        self.post_form(
            &credentials.tenant_id,
            &[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.expose_secret().as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
                ("scope", self.scope.as_str()),
            ],
        )
        .await
    }
}
